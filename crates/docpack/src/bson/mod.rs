//! BSON (Binary JSON) value model, encoding and decoding.
//!
//! A top-level BSON value is always a [`Document`]: an i32 size, a run of
//! `[type tag][key C-string][payload]` elements and a 0x00 terminator.

pub mod decoder;
pub mod document;
pub mod encoder;
pub mod error;
pub mod oid;
pub mod spec;
mod utf8;
pub mod values;

pub use decoder::{BsonDecoder, DecoderOptions};
pub use document::Document;
pub use encoder::{calculate_object_size, BsonEncoder, EncoderOptions, UndefinedEncoding};
pub use error::BsonError;
pub use oid::{ObjectId, ObjectIdError};
pub use spec::{BinarySubtype, ElementType};
pub use values::{
    Binary, Bson, DateTime, DbPointer, DbRef, JavaScriptCodeWithScope, RawBson, Regex,
    SharedDocument, Timestamp,
};

/// Encodes `doc` with default options.
pub fn to_vec(doc: &Document) -> Result<Vec<u8>, BsonError> {
    BsonEncoder::new().encode(doc)
}

/// Decodes a single document with default options.
pub fn from_slice(data: &[u8]) -> Result<Document, BsonError> {
    BsonDecoder::new().decode(data)
}
