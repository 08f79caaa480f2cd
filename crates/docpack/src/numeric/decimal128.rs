//! IEEE 754-2008 decimal128 in binary integer decimal (BID) encoding.
//!
//! Layout of the 128 bits, most significant first:
//!
//! ```text
//! sign(1) | combination/exponent(14) | coefficient(113)
//! ```
//!
//! The 16 bytes are stored little-endian (low 64 bits first), which is also
//! the BSON wire layout. Only construction and formatting are provided; no
//! arithmetic is performed on decimals.

use std::fmt;
use std::str::FromStr;

use super::error::NumericError;

const EXPONENT_MAX: i64 = 6111;
const EXPONENT_MIN: i64 = -6176;
const EXPONENT_BIAS: i64 = 6176;
const MAX_DIGITS: usize = 34;
/// Inputs at or above this many characters are rejected outright.
const MAX_INPUT_LEN: usize = 7000;
/// 10^34 - 1.
const MAX_COEFFICIENT: u128 = 9_999_999_999_999_999_999_999_999_999_999_999;

const SIGN_BIT: u64 = 1 << 63;
const NAN_HIGH: u64 = 0x7c00_0000_0000_0000;
const INFINITY_HIGH: u64 = 0x7800_0000_0000_0000;
const COMBINATION_INFINITY: u64 = 0x1e;
const COMBINATION_NAN: u64 = 0x1f;

/// A 128-bit decimal floating-point value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal128 {
    bytes: [u8; 16],
}

impl Decimal128 {
    pub const NAN: Decimal128 = Decimal128::from_halves(NAN_HIGH, 0);
    pub const INFINITY: Decimal128 = Decimal128::from_halves(INFINITY_HIGH, 0);
    pub const NEG_INFINITY: Decimal128 = Decimal128::from_halves(INFINITY_HIGH | SIGN_BIT, 0);

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self { bytes }
    }

    pub const fn bytes(&self) -> [u8; 16] {
        self.bytes
    }

    const fn from_halves(high: u64, low: u64) -> Self {
        let lo = low.to_le_bytes();
        let hi = high.to_le_bytes();
        let mut bytes = [0u8; 16];
        let mut i = 0;
        while i < 8 {
            bytes[i] = lo[i];
            bytes[i + 8] = hi[i];
            i += 1;
        }
        Self { bytes }
    }

    fn high(&self) -> u64 {
        let mut hi = [0u8; 8];
        hi.copy_from_slice(&self.bytes[8..]);
        u64::from_le_bytes(hi)
    }

    fn low(&self) -> u64 {
        let mut lo = [0u8; 8];
        lo.copy_from_slice(&self.bytes[..8]);
        u64::from_le_bytes(lo)
    }

    fn combination(&self) -> u64 {
        (self.high() >> 58) & 0x1f
    }

    pub fn is_nan(&self) -> bool {
        self.combination() == COMBINATION_NAN
    }

    pub fn is_infinite(&self) -> bool {
        self.combination() == COMBINATION_INFINITY
    }

    pub fn is_negative(&self) -> bool {
        self.high() & SIGN_BIT != 0
    }

    /// Builds a finite value from a coefficient and an unbiased exponent that
    /// are already in range.
    fn from_parts(negative: bool, coefficient: u128, exponent: i64) -> Self {
        let biased = (exponent + EXPONENT_BIAS) as u64;
        let mut high = ((coefficient >> 64) as u64) | ((biased & 0x3fff) << 49);
        if negative {
            high |= SIGN_BIT;
        }
        Self::from_halves(high, coefficient as u64)
    }

    /// Parses a decimal string.
    ///
    /// Accepts an optional sign, integer and/or fraction digits, and an
    /// optional `e`/`E` exponent, or the case-insensitive literals `Inf`,
    /// `Infinity` and `NaN`. A value that cannot be represented exactly (more
    /// than 34 significant digits, or an exponent outside [-6176, 6111] that
    /// trailing zeros cannot absorb) fails with [`NumericError::Overflow`];
    /// a zero coefficient clamps its exponent instead.
    pub fn parse(text: &str) -> Result<Self, NumericError> {
        let invalid = || NumericError::InvalidDecimal(text.to_string());
        if text.len() >= MAX_INPUT_LEN {
            return Err(invalid());
        }

        let (negative, body) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        if body.eq_ignore_ascii_case("inf") || body.eq_ignore_ascii_case("infinity") {
            return Ok(if negative {
                Self::NEG_INFINITY
            } else {
                Self::INFINITY
            });
        }
        if body.eq_ignore_ascii_case("nan") {
            return Ok(Self::NAN);
        }

        let bytes = body.as_bytes();
        let mut i = 0;
        // Significant digits, leading zeros stripped.
        let mut digits: Vec<u8> = Vec::with_capacity(bytes.len());
        let mut fraction_len: i64 = 0;
        let mut saw_point = false;
        let mut saw_digit = false;
        while i < bytes.len() {
            match bytes[i] {
                c @ b'0'..=b'9' => {
                    saw_digit = true;
                    if saw_point {
                        fraction_len += 1;
                    }
                    if !(digits.is_empty() && c == b'0') {
                        digits.push(c - b'0');
                    }
                }
                b'.' if !saw_point => saw_point = true,
                b'e' | b'E' => break,
                _ => return Err(invalid()),
            }
            i += 1;
        }
        if !saw_digit {
            return Err(invalid());
        }

        let mut exponent: i64 = 0;
        if i < bytes.len() {
            i += 1;
            let exp_negative = match bytes.get(i) {
                Some(b'-') => {
                    i += 1;
                    true
                }
                Some(b'+') => {
                    i += 1;
                    false
                }
                _ => false,
            };
            if i >= bytes.len() {
                return Err(invalid());
            }
            for &c in &bytes[i..] {
                if !c.is_ascii_digit() {
                    return Err(invalid());
                }
                // The input length cap keeps any in-range value well below
                // this bound; larger values only need to stay out of range.
                exponent = (exponent * 10 + (c - b'0') as i64).min(1_000_000_000);
            }
            if exp_negative {
                exponent = -exponent;
            }
        }
        let mut exponent = exponent - fraction_len;

        if digits.is_empty() {
            let exponent = exponent.clamp(EXPONENT_MIN, EXPONENT_MAX);
            return Ok(Self::from_parts(negative, 0, exponent));
        }

        while digits.len() > MAX_DIGITS {
            if digits.last() == Some(&0) {
                digits.pop();
                exponent += 1;
            } else {
                return Err(NumericError::Overflow(format!(
                    "{text} has more than {MAX_DIGITS} significant digits"
                )));
            }
        }
        while exponent > EXPONENT_MAX {
            if digits.len() >= MAX_DIGITS {
                return Err(NumericError::Overflow(format!(
                    "exponent of {text} is above {EXPONENT_MAX}"
                )));
            }
            digits.push(0);
            exponent -= 1;
        }
        while exponent < EXPONENT_MIN {
            if digits.last() == Some(&0) {
                digits.pop();
                exponent += 1;
            } else {
                return Err(NumericError::Overflow(format!(
                    "exponent of {text} is below {EXPONENT_MIN}"
                )));
            }
        }

        let coefficient = digits.iter().fold(0u128, |acc, d| acc * 10 + *d as u128);
        Ok(Self::from_parts(negative, coefficient, exponent))
    }

    /// Coefficient and unbiased exponent of a finite value. Non-canonical
    /// coefficients read as zero.
    fn finite_parts(&self) -> (u128, i64) {
        let high = self.high();
        let (biased, coefficient) = if (self.combination() >> 3) == 0b11 {
            // Implicit `100` prefix: always above 10^34 - 1.
            ((high >> 47) & 0x3fff, 0)
        } else {
            let c = (((high & 0x1_ffff_ffff_ffff) as u128) << 64) | self.low() as u128;
            ((high >> 49) & 0x3fff, c)
        };
        let coefficient = if coefficient > MAX_COEFFICIENT {
            0
        } else {
            coefficient
        };
        (coefficient, biased as i64 - EXPONENT_BIAS)
    }
}

impl fmt::Display for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nan() {
            return f.write_str("NaN");
        }
        if self.is_negative() {
            f.write_str("-")?;
        }
        if self.is_infinite() {
            return f.write_str("Infinity");
        }

        let (coefficient, exponent) = self.finite_parts();
        let digits = coefficient.to_string();
        let n = digits.len() as i64;
        let adjusted = n - 1 + exponent;

        if adjusted >= MAX_DIGITS as i64 || adjusted <= -7 || exponent > 0 {
            f.write_str(&digits[..1])?;
            if n > 1 {
                write!(f, ".{}", &digits[1..])?;
            }
            return if adjusted > 0 {
                write!(f, "E+{adjusted}")
            } else {
                write!(f, "E{adjusted}")
            };
        }

        if exponent == 0 {
            return f.write_str(&digits);
        }
        let point = n + exponent;
        if point > 0 {
            let point = point as usize;
            write!(f, "{}.{}", &digits[..point], &digits[point..])
        } else {
            f.write_str("0.")?;
            for _ in 0..(-point) {
                f.write_str("0")?;
            }
            f.write_str(&digits)
        }
    }
}

impl fmt::Debug for Decimal128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal128(\"{self}\")")
    }
}

impl FromStr for Decimal128 {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
