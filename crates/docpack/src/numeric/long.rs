//! 64-bit integer with an explicit signedness flag.
//!
//! The value is stored as raw two's-complement bits. Construction from a
//! `(low, high)` pair of 32-bit halves is supported at the API edge because
//! the BSON `int64` and `timestamp` payloads are laid out that way.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops;
use std::str::FromStr;

use super::error::NumericError;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Number of digits folded into the accumulator per multiply-and-add step.
const CHUNK: usize = 8;

/// A 64-bit integer, signed or unsigned.
///
/// Arithmetic is two's-complement wrapping, except [`Long::divide`] and
/// [`Long::modulo`] which report division by zero and the signed
/// `MIN / -1` overflow as errors. Every operation returns a new value and
/// keeps the receiver's signedness.
#[derive(Clone, Copy)]
pub struct Long {
    bits: u64,
    unsigned: bool,
}

impl Long {
    pub const ZERO: Long = Long::from_i64(0);
    pub const ONE: Long = Long::from_i64(1);
    pub const NEG_ONE: Long = Long::from_i64(-1);
    pub const UZERO: Long = Long::from_u64(0);
    pub const UONE: Long = Long::from_u64(1);
    pub const MAX_VALUE: Long = Long::from_i64(i64::MAX);
    pub const MIN_VALUE: Long = Long::from_i64(i64::MIN);
    pub const MAX_UNSIGNED_VALUE: Long = Long::from_u64(u64::MAX);

    pub const fn from_i64(value: i64) -> Self {
        Self {
            bits: value as u64,
            unsigned: false,
        }
    }

    pub const fn from_u64(value: u64) -> Self {
        Self {
            bits: value,
            unsigned: true,
        }
    }

    pub const fn from_i32(value: i32) -> Self {
        Self::from_i64(value as i64)
    }

    /// Builds a value from its low and high 32-bit halves.
    pub const fn from_bits(low: i32, high: i32, unsigned: bool) -> Self {
        let bits = ((high as u32 as u64) << 32) | (low as u32 as u64);
        Self { bits, unsigned }
    }

    /// Converts a double, truncating toward zero. NaN becomes zero and
    /// out-of-range magnitudes saturate to the type's minimum or maximum.
    pub fn from_f64(value: f64, unsigned: bool) -> Self {
        if unsigned {
            Self::from_u64(value as u64)
        } else {
            Self::from_i64(value as i64)
        }
    }

    /// Parses `text` in the given radix (2 to 36).
    ///
    /// A leading `-` is accepted for signed values only. Digits are folded
    /// into the result eight at a time; a magnitude that does not fit the
    /// target range fails with [`NumericError::Overflow`].
    pub fn from_str_radix(text: &str, unsigned: bool, radix: u32) -> Result<Self, NumericError> {
        if !(2..=36).contains(&radix) {
            return Err(NumericError::InvalidRadix(radix));
        }
        let invalid = || NumericError::InvalidDigit {
            text: text.to_string(),
            radix,
        };
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) if !unsigned => (true, rest),
            Some(_) => return Err(invalid()),
            None => (false, text),
        };
        if digits.is_empty() {
            return Err(invalid());
        }
        let overflow = || NumericError::Overflow(format!("{text} does not fit in 64 bits"));

        let mut magnitude: u64 = 0;
        for chunk in digits.as_bytes().chunks(CHUNK) {
            let mut value: u64 = 0;
            let mut power: u64 = 1;
            for &c in chunk {
                let digit = (c as char).to_digit(radix).ok_or_else(invalid)?;
                value = value * radix as u64 + digit as u64;
                power *= radix as u64;
            }
            magnitude = magnitude
                .checked_mul(power)
                .and_then(|m| m.checked_add(value))
                .ok_or_else(overflow)?;
        }

        if unsigned {
            return Ok(Self::from_u64(magnitude));
        }
        if negative {
            if magnitude > i64::MIN.unsigned_abs() {
                return Err(overflow());
            }
            Ok(Self::from_i64((magnitude as i64).wrapping_neg()))
        } else {
            if magnitude > i64::MAX as u64 {
                return Err(overflow());
            }
            Ok(Self::from_i64(magnitude as i64))
        }
    }

    pub fn from_bytes_le(bytes: [u8; 8], unsigned: bool) -> Self {
        Self {
            bits: u64::from_le_bytes(bytes),
            unsigned,
        }
    }

    pub fn from_bytes_be(bytes: [u8; 8], unsigned: bool) -> Self {
        Self {
            bits: u64::from_be_bytes(bytes),
            unsigned,
        }
    }

    pub fn to_bytes_le(self) -> [u8; 8] {
        self.bits.to_le_bytes()
    }

    pub fn to_bytes_be(self) -> [u8; 8] {
        self.bits.to_be_bytes()
    }

    pub const fn is_unsigned(self) -> bool {
        self.unsigned
    }

    /// Low 32 bits, as a signed integer.
    pub const fn low_bits(self) -> i32 {
        self.bits as u32 as i32
    }

    /// High 32 bits, as a signed integer.
    pub const fn high_bits(self) -> i32 {
        (self.bits >> 32) as u32 as i32
    }

    pub const fn as_i64(self) -> i64 {
        self.bits as i64
    }

    pub const fn as_u64(self) -> u64 {
        self.bits
    }

    pub fn to_signed(self) -> Self {
        Self::from_i64(self.bits as i64)
    }

    pub fn to_unsigned(self) -> Self {
        Self::from_u64(self.bits)
    }

    /// Nearest double to this value.
    pub fn to_f64(self) -> f64 {
        if self.unsigned {
            self.bits as f64
        } else {
            self.bits as i64 as f64
        }
    }

    pub fn is_zero(self) -> bool {
        self.bits == 0
    }

    pub fn is_negative(self) -> bool {
        !self.unsigned && (self.bits as i64) < 0
    }

    pub fn is_odd(self) -> bool {
        self.bits & 1 == 1
    }

    fn with_bits(self, bits: u64) -> Self {
        Self {
            bits,
            unsigned: self.unsigned,
        }
    }

    /// Exact mathematical value, used for comparisons across signedness.
    fn wide(self) -> i128 {
        if self.unsigned {
            self.bits as i128
        } else {
            self.bits as i64 as i128
        }
    }

    pub fn add(self, other: Long) -> Self {
        self.with_bits(self.bits.wrapping_add(other.bits))
    }

    pub fn subtract(self, other: Long) -> Self {
        self.with_bits(self.bits.wrapping_sub(other.bits))
    }

    pub fn multiply(self, other: Long) -> Self {
        self.with_bits(self.bits.wrapping_mul(other.bits))
    }

    /// Quotient truncated toward zero.
    pub fn divide(self, divisor: Long) -> Result<Self, NumericError> {
        if divisor.is_zero() {
            return Err(NumericError::DivisionByZero);
        }
        if self.unsigned {
            return Ok(self.with_bits(self.bits / divisor.bits));
        }
        (self.bits as i64)
            .checked_div(divisor.bits as i64)
            .map(|q| self.with_bits(q as u64))
            .ok_or_else(|| NumericError::Overflow(format!("{self} / {divisor}")))
    }

    /// Remainder with the sign of the dividend.
    pub fn modulo(self, divisor: Long) -> Result<Self, NumericError> {
        if divisor.is_zero() {
            return Err(NumericError::DivisionByZero);
        }
        if self.unsigned {
            return Ok(self.with_bits(self.bits % divisor.bits));
        }
        let r = (self.bits as i64).wrapping_rem(divisor.bits as i64);
        Ok(self.with_bits(r as u64))
    }

    pub fn negate(self) -> Self {
        self.with_bits(self.bits.wrapping_neg())
    }

    pub fn not(self) -> Self {
        self.with_bits(!self.bits)
    }

    pub fn and(self, other: Long) -> Self {
        self.with_bits(self.bits & other.bits)
    }

    pub fn or(self, other: Long) -> Self {
        self.with_bits(self.bits | other.bits)
    }

    pub fn xor(self, other: Long) -> Self {
        self.with_bits(self.bits ^ other.bits)
    }

    /// Shift amounts are taken modulo 64.
    pub fn shift_left(self, num_bits: u32) -> Self {
        self.with_bits(self.bits << (num_bits & 63))
    }

    /// Arithmetic (sign-propagating) right shift.
    pub fn shift_right(self, num_bits: u32) -> Self {
        self.with_bits(((self.bits as i64) >> (num_bits & 63)) as u64)
    }

    /// Logical (zero-filling) right shift.
    pub fn shift_right_unsigned(self, num_bits: u32) -> Self {
        self.with_bits(self.bits >> (num_bits & 63))
    }

    pub fn compare(self, other: Long) -> Ordering {
        self.wide().cmp(&other.wide())
    }

    /// Formats the value in the given radix (2 to 36), lowercase digits.
    pub fn to_string_radix(self, radix: u32) -> Result<String, NumericError> {
        if !(2..=36).contains(&radix) {
            return Err(NumericError::InvalidRadix(radix));
        }
        let negative = self.is_negative();
        let mut magnitude = if negative {
            (self.bits as i64).unsigned_abs()
        } else {
            self.bits
        };
        if magnitude == 0 {
            return Ok("0".to_string());
        }
        let mut out = Vec::with_capacity(65);
        while magnitude > 0 {
            out.push(DIGITS[(magnitude % radix as u64) as usize]);
            magnitude /= radix as u64;
        }
        if negative {
            out.push(b'-');
        }
        out.reverse();
        Ok(out.into_iter().map(char::from).collect())
    }
}

impl Default for Long {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for Long {
    fn eq(&self, other: &Self) -> bool {
        self.wide() == other.wide()
    }
}

impl Eq for Long {}

impl Hash for Long {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.wide().hash(state);
    }
}

impl PartialOrd for Long {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Long {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(*other)
    }
}

impl fmt::Display for Long {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unsigned {
            write!(f, "{}", self.bits)
        } else {
            write!(f, "{}", self.bits as i64)
        }
    }
}

impl fmt::Debug for Long {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unsigned {
            write!(f, "Long({}u)", self.bits)
        } else {
            write!(f, "Long({})", self.bits as i64)
        }
    }
}

impl FromStr for Long {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_radix(s, false, 10)
    }
}

impl From<i64> for Long {
    fn from(value: i64) -> Self {
        Self::from_i64(value)
    }
}

impl From<i32> for Long {
    fn from(value: i32) -> Self {
        Self::from_i32(value)
    }
}

impl From<u64> for Long {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl ops::Add for Long {
    type Output = Long;
    fn add(self, rhs: Long) -> Long {
        Long::add(self, rhs)
    }
}

impl ops::Sub for Long {
    type Output = Long;
    fn sub(self, rhs: Long) -> Long {
        self.subtract(rhs)
    }
}

impl ops::Mul for Long {
    type Output = Long;
    fn mul(self, rhs: Long) -> Long {
        self.multiply(rhs)
    }
}

impl ops::Neg for Long {
    type Output = Long;
    fn neg(self) -> Long {
        self.negate()
    }
}

impl ops::Not for Long {
    type Output = Long;
    fn not(self) -> Long {
        Long::not(self)
    }
}

impl ops::BitAnd for Long {
    type Output = Long;
    fn bitand(self, rhs: Long) -> Long {
        self.and(rhs)
    }
}

impl ops::BitOr for Long {
    type Output = Long;
    fn bitor(self, rhs: Long) -> Long {
        self.or(rhs)
    }
}

impl ops::BitXor for Long {
    type Output = Long;
    fn bitxor(self, rhs: Long) -> Long {
        self.xor(rhs)
    }
}

impl ops::Shl<u32> for Long {
    type Output = Long;
    fn shl(self, rhs: u32) -> Long {
        self.shift_left(rhs)
    }
}

impl ops::Shr<u32> for Long {
    type Output = Long;
    fn shr(self, rhs: u32) -> Long {
        if self.unsigned {
            self.shift_right_unsigned(rhs)
        } else {
            self.shift_right(rhs)
        }
    }
}
