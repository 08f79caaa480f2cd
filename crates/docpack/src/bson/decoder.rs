//! BSON document decoder.
//!
//! Every length prefix is checked against the bytes actually consumed, so
//! a decode either reproduces the whole input or fails; it never truncates.

use docpack_buffers::Reader;
use tracing::{debug, trace};

use super::document::Document;
use super::error::BsonError;
use super::oid::ObjectId;
use super::spec::{BinarySubtype, ElementType};
use super::utf8;
use super::values::{
    Binary, Bson, DateTime, DbPointer, DbRef, JavaScriptCodeWithScope, RawBson, Regex, Timestamp,
};
use crate::numeric::Decimal128;

/// Largest integer magnitude an f64 holds exactly.
const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

#[derive(Debug, Clone, Default)]
pub struct DecoderOptions {
    /// Leave embedded documents and arrays undecoded as [`Bson::Raw`].
    pub raw: bool,
    /// Compile regexes with the `regex` crate, keeping only the `i`, `m`,
    /// `s` and `x` flags.
    pub native_regex: bool,
    /// Decode Int32, Double and safe-range Int64 as [`Bson::Number`].
    pub promote_values: bool,
    /// Accept input longer than the document's size prefix.
    pub allow_trailing_bytes: bool,
}

/// Decodes BSON bytes into a [`Document`].
#[derive(Debug, Clone, Default)]
pub struct BsonDecoder {
    pub options: DecoderOptions,
}

impl BsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DecoderOptions) -> Self {
        Self { options }
    }

    /// Decodes the single document in `data`.
    pub fn decode(&self, data: &[u8]) -> Result<Document, BsonError> {
        trace!(len = data.len(), "decoding document");
        self.decode_at(data, 0, self.options.allow_trailing_bytes)
            .map(|(doc, _)| doc)
            .inspect_err(|err| debug!(%err, "bson decode failed"))
    }

    /// Decodes `count` documents laid end to end, returning them together
    /// with the offset just past the last one.
    pub fn decode_sequence(&self, data: &[u8], count: usize) -> Result<(Vec<Document>, usize), BsonError> {
        trace!(len = data.len(), count, "decoding document sequence");
        let mut docs = Vec::with_capacity(count);
        let mut offset = 0;
        for _ in 0..count {
            let (doc, end) = self
                .decode_at(data, offset, true)
                .inspect_err(|err| debug!(%err, offset, "bson sequence decode failed"))?;
            docs.push(doc);
            offset = end;
        }
        Ok((docs, offset))
    }

    fn decode_at(&self, data: &[u8], offset: usize, trailing: bool) -> Result<(Document, usize), BsonError> {
        let available = data.len().saturating_sub(offset);
        let malformed = |declared: i64| BsonError::MalformedLength {
            offset,
            declared,
            actual: available,
        };
        let declared = match data.get(offset..offset + 4) {
            Some(p) => i32::from_le_bytes([p[0], p[1], p[2], p[3]]) as i64,
            None => return Err(malformed(-1)),
        };
        if declared < 5 || declared as usize > available || (!trailing && declared as usize != available) {
            return Err(malformed(declared));
        }
        let end = offset + declared as usize;
        if data[end - 1] != 0 {
            return Err(malformed(declared));
        }
        let mut reader = Reader::from_slice(data, offset, end);
        let doc = self.read_fields(&mut reader)?;
        Ok((doc, end))
    }

    /// Reads a size-prefixed document at the cursor. On return the cursor
    /// sits exactly at the declared end.
    fn read_fields(&self, reader: &mut Reader<'_>) -> Result<Document, BsonError> {
        let mut doc = Document::new();
        self.read_compound(reader, |this, reader, key, tag, tag_offset| {
            let value = this.read_value(reader, tag, &key, tag_offset)?;
            doc.insert(key, value);
            Ok(())
        })?;
        Ok(doc)
    }

    /// Array keys are not checked against their positions; values are kept
    /// in stream order.
    fn read_array(&self, reader: &mut Reader<'_>) -> Result<Vec<Bson>, BsonError> {
        let mut items = Vec::new();
        self.read_compound(reader, |this, reader, key, tag, tag_offset| {
            items.push(this.read_value(reader, tag, &key, tag_offset)?);
            Ok(())
        })?;
        Ok(items)
    }

    fn read_compound<F>(&self, reader: &mut Reader<'_>, mut on_element: F) -> Result<(), BsonError>
    where
        F: FnMut(&Self, &mut Reader<'_>, String, u8, usize) -> Result<(), BsonError>,
    {
        let start = reader.x;
        let end = self.read_size(reader, 5)?;
        let outer_end = reader.limit(end);
        loop {
            let tag_offset = reader.x;
            let tag = reader.u8()?;
            if tag == 0 {
                break;
            }
            let key = read_cstring(reader)?;
            on_element(self, reader, key, tag, tag_offset)?;
        }
        if reader.x != end {
            return Err(BsonError::MalformedLength {
                offset: start,
                declared: (end - start) as i64,
                actual: reader.x - start,
            });
        }
        reader.limit(outer_end);
        Ok(())
    }

    /// Reads an i32 size prefix counting itself and returns the absolute
    /// end of the region it covers.
    fn read_size(&self, reader: &mut Reader<'_>, min: i64) -> Result<usize, BsonError> {
        let start = reader.x;
        let declared = reader.i32_le()? as i64;
        let available = reader.end - start;
        if declared < min || declared as usize > available {
            return Err(BsonError::MalformedLength {
                offset: start,
                declared,
                actual: available,
            });
        }
        Ok(start + declared as usize)
    }

    fn read_value(
        &self,
        reader: &mut Reader<'_>,
        tag: u8,
        key: &str,
        tag_offset: usize,
    ) -> Result<Bson, BsonError> {
        let element_type = ElementType::from_u8(tag).ok_or_else(|| BsonError::UnknownTypeTag {
            tag,
            key: key.to_string(),
            offset: tag_offset,
        })?;
        let promote = self.options.promote_values;
        Ok(match element_type {
            ElementType::Double => {
                let v = reader.f64_le()?;
                if promote {
                    Bson::Number(v)
                } else {
                    Bson::Double(v)
                }
            }
            ElementType::String => Bson::String(read_string(reader)?),
            ElementType::EmbeddedDocument if self.options.raw => self.read_raw(reader, element_type)?,
            ElementType::EmbeddedDocument => {
                let doc = self.read_fields(reader)?;
                match DbRef::try_from_document(doc) {
                    Ok(r) => Bson::DbRef(r),
                    Err(doc) => Bson::Document(doc),
                }
            }
            ElementType::Array if self.options.raw => self.read_raw(reader, element_type)?,
            ElementType::Array => Bson::Array(self.read_array(reader)?),
            ElementType::Binary => Bson::Binary(read_binary(reader)?),
            ElementType::Undefined => Bson::Undefined,
            ElementType::ObjectId => Bson::ObjectId(ObjectId::from_bytes(reader.array()?)),
            ElementType::Boolean => {
                let offset = reader.x;
                match reader.u8()? {
                    0 => Bson::Boolean(false),
                    1 => Bson::Boolean(true),
                    value => return Err(BsonError::InvalidBoolean { value, offset }),
                }
            }
            ElementType::DateTime => Bson::DateTime(DateTime::from_millis(reader.i64_le()?)),
            ElementType::Null => Bson::Null,
            ElementType::RegularExpression => Bson::RegularExpression(self.read_regex(reader)?),
            ElementType::DbPointer => {
                let namespace = read_string(reader)?;
                let id = ObjectId::from_bytes(reader.array()?);
                Bson::DbPointer(DbPointer { namespace, id })
            }
            ElementType::JavaScriptCode => Bson::JavaScriptCode(read_string(reader)?),
            ElementType::Symbol => Bson::Symbol(read_string(reader)?),
            ElementType::JavaScriptCodeWithScope => {
                let start = reader.x;
                // size, then a string of at least 5 bytes, then a document
                let end = self.read_size(reader, 14)?;
                let code = read_string(reader)?;
                let scope = self.read_fields(reader)?;
                if reader.x != end {
                    return Err(BsonError::MalformedLength {
                        offset: start,
                        declared: (end - start) as i64,
                        actual: reader.x - start,
                    });
                }
                Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope { code, scope })
            }
            ElementType::Int32 => {
                let v = reader.i32_le()?;
                if promote {
                    Bson::Number(f64::from(v))
                } else {
                    Bson::Int32(v)
                }
            }
            ElementType::Timestamp => {
                let increment = reader.u32_le()?;
                let time = reader.u32_le()?;
                Bson::Timestamp(Timestamp { time, increment })
            }
            ElementType::Int64 => {
                let v = reader.i64_le()?;
                if promote && (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&v) {
                    Bson::Number(v as f64)
                } else {
                    Bson::Int64(v)
                }
            }
            ElementType::Decimal128 => Bson::Decimal128(Decimal128::from_bytes(reader.array()?)),
            ElementType::MinKey => Bson::MinKey,
            ElementType::MaxKey => Bson::MaxKey,
        })
    }

    fn read_raw(&self, reader: &mut Reader<'_>, kind: ElementType) -> Result<Bson, BsonError> {
        let start = reader.x;
        let end = self.read_size(reader, 5)?;
        reader.x = start;
        let bytes = reader.buf(end - start)?;
        if bytes[bytes.len() - 1] != 0 {
            return Err(BsonError::MalformedLength {
                offset: start,
                declared: bytes.len() as i64,
                actual: bytes.len() - 1,
            });
        }
        Ok(Bson::Raw(RawBson {
            kind,
            bytes: bytes.to_vec(),
        }))
    }

    fn read_regex(&self, reader: &mut Reader<'_>) -> Result<Regex, BsonError> {
        let pattern = read_cstring(reader)?;
        let options = read_cstring(reader)?;
        if !self.options.native_regex {
            return Ok(Regex::from_wire(pattern, options));
        }
        let options: String = options.chars().filter(|c| "imsx".contains(*c)).collect();
        let regex = Regex::new(pattern, &options)?;
        regex
            .to_native()
            .map_err(|e| BsonError::InvalidRegex(e.to_string()))?;
        Ok(regex)
    }
}

fn read_cstring(reader: &mut Reader<'_>) -> Result<String, BsonError> {
    let start = reader.x;
    let bytes = reader.cstring()?;
    decode_utf8(bytes, start)
}

/// Reads an i32 length (NUL included), the bytes and the NUL terminator.
fn read_string(reader: &mut Reader<'_>) -> Result<String, BsonError> {
    let offset = reader.x;
    let declared = reader.i32_le()?;
    if declared < 1 || declared as usize > reader.remaining() {
        return Err(BsonError::MalformedLength {
            offset,
            declared: declared as i64,
            actual: reader.remaining(),
        });
    }
    let start = reader.x;
    let bytes = reader.buf(declared as usize - 1)?;
    let terminator_offset = reader.x;
    if reader.u8()? != 0 {
        return Err(BsonError::UnterminatedString {
            offset: terminator_offset,
        });
    }
    decode_utf8(bytes, start)
}

fn decode_utf8(bytes: &[u8], start: usize) -> Result<String, BsonError> {
    utf8::decode(bytes)
        .map(str::to_string)
        .map_err(|at| BsonError::InvalidUtf8 { offset: start + at })
}

fn read_binary(reader: &mut Reader<'_>) -> Result<Binary, BsonError> {
    let offset = reader.x;
    let declared = reader.i32_le()?;
    let subtype = BinarySubtype::from(reader.u8()?);
    if declared < 0 || declared as usize > reader.remaining() {
        return Err(BsonError::MalformedLength {
            offset,
            declared: declared as i64,
            actual: reader.remaining(),
        });
    }
    let mut len = declared as usize;
    if subtype == BinarySubtype::BinaryOld {
        let inner_offset = reader.x;
        let inner = reader.i32_le()?;
        if inner as i64 != declared as i64 - 4 {
            return Err(BsonError::MalformedLength {
                offset: inner_offset,
                declared: inner as i64,
                actual: len.saturating_sub(4),
            });
        }
        len = inner as usize;
    }
    Ok(Binary::new(subtype, reader.buf(len)?))
}
