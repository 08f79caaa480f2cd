//! Numeric layer error type.

use thiserror::Error;

/// Error type for [`Long`](super::Long) and [`Decimal128`](super::Decimal128)
/// operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("numeric overflow: {0}")]
    Overflow(String),
    #[error("invalid digit in {text:?} for radix {radix}")]
    InvalidDigit { text: String, radix: u32 },
    #[error("radix {0} is out of range 2..=36")]
    InvalidRadix(u32),
    #[error("{0:?} is not a valid Decimal128 string")]
    InvalidDecimal(String),
}
