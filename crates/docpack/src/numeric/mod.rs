//! Exact numeric types required by the BSON format.
//!
//! - [`Long`]: a 64-bit two's-complement integer carrying a signed/unsigned
//!   flag, with wrapping arithmetic, checked division and radix parsing.
//! - [`Decimal128`]: an IEEE 754-2008 decimal128 value (BID encoding) with
//!   exact string parsing and formatting.

pub mod decimal128;
pub mod error;
pub mod long;

pub use decimal128::Decimal128;
pub use error::NumericError;
pub use long::Long;
