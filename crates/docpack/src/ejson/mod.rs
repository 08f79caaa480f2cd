//! MongoDB Extended JSON (v2) projection of BSON values.
//!
//! Types without a JSON counterpart travel as `$`-prefixed wrapper objects
//! such as `{"$oid": "..."}` or `{"$numberLong": "..."}`.
//!
//! - **Canonical** output wraps every number and date, so it round-trips
//!   every type exactly.
//! - **Relaxed** output (default) uses plain JSON numbers and ISO dates
//!   where that loses nothing.

pub mod decoder;
pub mod encoder;
pub mod error;

pub use decoder::{EjsonDecoder, EjsonParseOptions};
pub use encoder::{EjsonEncoder, EjsonOptions};
pub use error::EjsonError;

use crate::bson::{Bson, Document};

pub fn to_string(value: &Bson, options: &EjsonOptions) -> Result<String, EjsonError> {
    EjsonEncoder::with_options(options.clone()).encode_to_string(value)
}

/// Like [`to_string`], re-indented through `serde_json`.
pub fn to_string_pretty(value: &Bson, options: &EjsonOptions) -> Result<String, EjsonError> {
    Ok(serde_json::to_string_pretty(&to_json_value(value, options)?)?)
}

pub fn to_json_value(value: &Bson, options: &EjsonOptions) -> Result<serde_json::Value, EjsonError> {
    let bytes = EjsonEncoder::with_options(options.clone()).encode(value)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn from_str(text: &str, options: &EjsonParseOptions) -> Result<Bson, EjsonError> {
    EjsonDecoder::with_options(options.clone()).decode_str(text)
}

pub fn from_json_value(value: &serde_json::Value) -> Result<Bson, EjsonError> {
    EjsonDecoder::new().decode_value(value)
}

/// Parses a top-level Extended JSON object into a document.
pub fn document_from_str(text: &str, options: &EjsonParseOptions) -> Result<Document, EjsonError> {
    EjsonDecoder::with_options(options.clone()).decode_document(text)
}
