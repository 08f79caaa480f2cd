//! BSON binary codec with MongoDB Extended JSON projection.
//!
//! - [`numeric`]: exact 64-bit integers and IEEE 754 decimal128.
//! - [`bson`]: the value model plus the binary encoder and decoder.
//! - [`ejson`]: canonical and relaxed Extended JSON text.
//! - [`cli`]: the logic behind the `bson-pack` and `bson-unpack` binaries.

pub mod bson;
pub mod cli;
pub mod ejson;
pub mod numeric;

pub use bson::{Bson, BsonDecoder, BsonEncoder, BsonError, Document, ObjectId};
pub use ejson::{EjsonError, EjsonOptions, EjsonParseOptions};
pub use numeric::{Decimal128, Long, NumericError};
