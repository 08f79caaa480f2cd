//! BSON document encoder.
//!
//! BSON is a little-endian binary format. Every document and every
//! length-prefixed payload has its size reserved up front and back-patched
//! once the body has been written.

use docpack_buffers::Writer;
use tracing::trace;

use super::document::Document;
use super::error::BsonError;
use super::spec::{BinarySubtype, ElementType};
use super::values::{number_is_int32, Binary, Bson, DbRef, RawBson};

/// How [`Bson::Undefined`] is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UndefinedEncoding {
    /// As the deprecated undefined type (0x06).
    #[default]
    Tagged,
    /// As null.
    Null,
    /// Not at all; the key is dropped.
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct EncoderOptions {
    /// Reject keys that start with `$` or contain `.`. Reference keys
    /// written for [`Bson::DbRef`] are exempt.
    pub check_keys: bool,
    pub undefined: UndefinedEncoding,
    /// Write [`Bson::Function`] as JavaScript code instead of failing.
    pub serialize_functions: bool,
}

/// Encodes a [`Document`] to bytes.
///
/// The encoder owns its scratch [`Writer`] and reuses it across calls.
pub struct BsonEncoder {
    writer: Writer,
    pub options: EncoderOptions,
}

impl Default for BsonEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BsonEncoder {
    pub fn new() -> Self {
        Self::with_options(EncoderOptions::default())
    }

    pub fn with_options(options: EncoderOptions) -> Self {
        Self {
            writer: Writer::new(),
            options,
        }
    }

    /// Encodes a document to bytes.
    pub fn encode(&mut self, doc: &Document) -> Result<Vec<u8>, BsonError> {
        self.write_root(doc)?;
        Ok(self.writer.flush())
    }

    /// Appends the encoded document to `out`, returning its size.
    pub fn encode_into(&mut self, doc: &Document, out: &mut Vec<u8>) -> Result<usize, BsonError> {
        self.write_root(doc)?;
        let size = self.writer.len();
        self.writer.flush_into(out);
        Ok(size)
    }

    fn write_root(&mut self, doc: &Document) -> Result<(), BsonError> {
        trace!(fields = doc.len(), "encoding document");
        self.writer.reset();
        let mut stack = Vec::new();
        let check_keys = self.options.check_keys;
        self.write_document(doc, check_keys, &mut stack)
            .inspect_err(|_| self.writer.reset())
    }

    /// `stack` holds the shared nodes currently open, by address.
    fn write_document(
        &mut self,
        doc: &Document,
        check_keys: bool,
        stack: &mut Vec<usize>,
    ) -> Result<(), BsonError> {
        let at = self.writer.reserve(4);
        for (key, value) in doc {
            self.write_element(key, value, check_keys, stack)
                .map_err(|e| e.at(key))?;
        }
        self.writer.u8(0);
        self.patch_size(at)
    }

    /// Index keys are always safe; `check_keys` applies to nested documents.
    fn write_array(
        &mut self,
        items: &[Bson],
        check_keys: bool,
        stack: &mut Vec<usize>,
    ) -> Result<(), BsonError> {
        let at = self.writer.reserve(4);
        for (i, value) in items.iter().enumerate() {
            let key = i.to_string();
            let value = array_slot(value, &self.options);
            self.write_entry(&key, value, check_keys, stack)
                .map_err(|e| e.at(&key))?;
        }
        self.writer.u8(0);
        self.patch_size(at)
    }

    /// The reference keys themselves are exempt from key checks.
    fn write_db_ref(
        &mut self,
        r: &DbRef,
        check_keys: bool,
        stack: &mut Vec<usize>,
    ) -> Result<(), BsonError> {
        let at = self.writer.reserve(4);
        self.header(ElementType::String, "$ref");
        self.write_string(&r.collection)?;
        self.write_entry("$id", &r.id, check_keys, stack)
            .map_err(|e| e.at("$id"))?;
        if let Some(db) = &r.db {
            self.header(ElementType::String, "$db");
            self.write_string(db)?;
        }
        for (key, value) in &r.fields {
            self.write_element(key, value, check_keys, stack)
                .map_err(|e| e.at(key))?;
        }
        self.writer.u8(0);
        self.patch_size(at)
    }

    fn write_element(
        &mut self,
        key: &str,
        value: &Bson,
        check_keys: bool,
        stack: &mut Vec<usize>,
    ) -> Result<(), BsonError> {
        check_key(key, check_keys)?;
        self.write_entry(key, value, check_keys, stack)
    }

    /// Writes `[tag][key][payload]` without checking `key`.
    fn write_entry(
        &mut self,
        key: &str,
        value: &Bson,
        check_keys: bool,
        stack: &mut Vec<usize>,
    ) -> Result<(), BsonError> {
        match value {
            Bson::Double(v) => {
                self.header(ElementType::Double, key);
                self.writer.f64_le(*v);
            }
            Bson::Number(n) if number_is_int32(*n) => {
                self.header(ElementType::Int32, key);
                self.writer.i32_le(*n as i32);
            }
            Bson::Number(n) => {
                self.header(ElementType::Double, key);
                self.writer.f64_le(*n);
            }
            Bson::String(s) => {
                self.header(ElementType::String, key);
                self.write_string(s)?;
            }
            Bson::Document(doc) => {
                self.header(ElementType::EmbeddedDocument, key);
                self.write_document(doc, check_keys, stack)?;
            }
            Bson::Array(items) => {
                self.header(ElementType::Array, key);
                self.write_array(items, check_keys, stack)?;
            }
            Bson::Binary(bin) => {
                self.header(ElementType::Binary, key);
                self.write_binary(bin)?;
            }
            Bson::Undefined => match self.options.undefined {
                UndefinedEncoding::Tagged => self.header(ElementType::Undefined, key),
                UndefinedEncoding::Null => self.header(ElementType::Null, key),
                UndefinedEncoding::Skip => {}
            },
            Bson::ObjectId(id) => {
                self.header(ElementType::ObjectId, key);
                self.writer.buf(&id.bytes());
            }
            Bson::Boolean(b) => {
                self.header(ElementType::Boolean, key);
                self.writer.u8(u8::from(*b));
            }
            Bson::DateTime(dt) => {
                self.header(ElementType::DateTime, key);
                self.writer.i64_le(dt.timestamp_millis());
            }
            Bson::Null => self.header(ElementType::Null, key),
            Bson::RegularExpression(re) => {
                self.header(ElementType::RegularExpression, key);
                self.write_cstr(re.pattern(), "regex pattern")?;
                self.write_cstr(re.options(), "regex options")?;
            }
            Bson::DbPointer(ptr) => {
                self.header(ElementType::DbPointer, key);
                self.write_string(&ptr.namespace)?;
                self.writer.buf(&ptr.id.bytes());
            }
            Bson::JavaScriptCode(code) => {
                self.header(ElementType::JavaScriptCode, key);
                self.write_string(code)?;
            }
            Bson::Function(source) => {
                if !self.options.serialize_functions {
                    return Err(BsonError::UnsupportedValueType {
                        key: String::new(),
                        kind: "function",
                    });
                }
                self.header(ElementType::JavaScriptCode, key);
                self.write_string(source)?;
            }
            Bson::Symbol(symbol) => {
                self.header(ElementType::Symbol, key);
                self.write_string(symbol)?;
            }
            Bson::JavaScriptCodeWithScope(cws) => {
                self.header(ElementType::JavaScriptCodeWithScope, key);
                let at = self.writer.reserve(4);
                self.write_string(&cws.code)?;
                self.write_document(&cws.scope, check_keys, stack)?;
                self.patch_size(at)?;
            }
            Bson::Int32(v) => {
                self.header(ElementType::Int32, key);
                self.writer.i32_le(*v);
            }
            Bson::Timestamp(ts) => {
                self.header(ElementType::Timestamp, key);
                self.writer.u32_le(ts.increment);
                self.writer.u32_le(ts.time);
            }
            Bson::Int64(v) => {
                self.header(ElementType::Int64, key);
                self.writer.i64_le(*v);
            }
            Bson::Decimal128(d) => {
                self.header(ElementType::Decimal128, key);
                self.writer.buf(&d.bytes());
            }
            Bson::MinKey => self.header(ElementType::MinKey, key),
            Bson::MaxKey => self.header(ElementType::MaxKey, key),
            Bson::DbRef(r) => {
                self.header(ElementType::EmbeddedDocument, key);
                self.write_db_ref(r, check_keys, stack)?;
            }
            Bson::Shared(shared) => {
                let addr = shared.addr();
                if stack.contains(&addr) {
                    return Err(BsonError::CyclicStructure {
                        path: String::new(),
                    });
                }
                self.header(ElementType::EmbeddedDocument, key);
                stack.push(addr);
                let result = self.write_document(&shared.read(), check_keys, stack);
                stack.pop();
                result?;
            }
            Bson::Raw(raw) => {
                check_raw(raw)?;
                self.header(raw.kind, key);
                self.writer.buf(&raw.bytes);
            }
        }
        Ok(())
    }

    #[inline]
    fn header(&mut self, element_type: ElementType, key: &str) {
        self.writer.u8(element_type as u8);
        self.writer.cstring(key.as_bytes());
    }

    fn write_string(&mut self, s: &str) -> Result<(), BsonError> {
        self.writer.i32_le(length_prefix(s.len() + 1)?);
        self.writer.cstring(s.as_bytes());
        Ok(())
    }

    fn write_cstr(&mut self, s: &str, what: &'static str) -> Result<(), BsonError> {
        if s.as_bytes().contains(&0) {
            return Err(BsonError::InvalidCString {
                key: String::new(),
                what,
            });
        }
        self.writer.cstring(s.as_bytes());
        Ok(())
    }

    fn write_binary(&mut self, bin: &Binary) -> Result<(), BsonError> {
        let len = bin.bytes.len();
        if bin.subtype == BinarySubtype::BinaryOld {
            self.writer.i32_le(length_prefix(len + 4)?);
            self.writer.u8(bin.subtype.into());
            self.writer.i32_le(length_prefix(len)?);
        } else {
            self.writer.i32_le(length_prefix(len)?);
            self.writer.u8(bin.subtype.into());
        }
        self.writer.buf(&bin.bytes);
        Ok(())
    }

    /// Back-patches the size prefix reserved at `at`, counting up to the
    /// current position.
    fn patch_size(&mut self, at: usize) -> Result<(), BsonError> {
        let size = length_prefix(self.writer.len() - at)?;
        self.writer.patch_i32_le(at, size);
        Ok(())
    }
}

fn length_prefix(size: usize) -> Result<i32, BsonError> {
    i32::try_from(size).map_err(|_| BsonError::DocumentTooLarge(size))
}

fn check_key(key: &str, check_keys: bool) -> Result<(), BsonError> {
    let reason = if key.as_bytes().contains(&0) {
        "must not contain a null byte"
    } else if check_keys && key.starts_with('$') {
        "must not start with '$'"
    } else if check_keys && key.contains('.') {
        "must not contain '.'"
    } else {
        return Ok(());
    };
    Err(BsonError::InvalidKey {
        key: String::new(),
        reason,
    })
}

fn check_raw(raw: &RawBson) -> Result<(), BsonError> {
    if !matches!(raw.kind, ElementType::EmbeddedDocument | ElementType::Array) {
        return Err(BsonError::UnsupportedValueType {
            key: String::new(),
            kind: raw.kind.name(),
        });
    }
    let bytes = &raw.bytes;
    let declared = match bytes.get(..4) {
        Some(prefix) => i32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]),
        None => -1,
    };
    if bytes.len() < 5 || declared as i64 != bytes.len() as i64 || bytes[bytes.len() - 1] != 0 {
        return Err(BsonError::MalformedLength {
            offset: 0,
            declared: declared as i64,
            actual: bytes.len(),
        });
    }
    Ok(())
}

static NULL: Bson = Bson::Null;

/// Array slots are never dropped, so an undefined element under
/// [`UndefinedEncoding::Skip`] is written as null to keep the indices dense.
fn array_slot<'v>(value: &'v Bson, options: &EncoderOptions) -> &'v Bson {
    match value {
        Bson::Undefined if options.undefined == UndefinedEncoding::Skip => &NULL,
        other => other,
    }
}

/// Exact number of bytes [`BsonEncoder::encode`] would produce for `doc`
/// under `options`, without encoding it.
///
/// Fails where encoding would fail on structure: cycles, functions when
/// they are disabled, and malformed raw values. Key and C-string checks are
/// not repeated.
pub fn calculate_object_size(doc: &Document, options: &EncoderOptions) -> Result<usize, BsonError> {
    Sizer {
        options,
        stack: Vec::new(),
    }
    .document(doc)
}

struct Sizer<'a> {
    options: &'a EncoderOptions,
    stack: Vec<usize>,
}

impl Sizer<'_> {
    fn document(&mut self, doc: &Document) -> Result<usize, BsonError> {
        let mut size = 5;
        for (key, value) in doc {
            size += self.element(key, value).map_err(|e| e.at(key))?;
        }
        Ok(size)
    }

    fn element(&mut self, key: &str, value: &Bson) -> Result<usize, BsonError> {
        if matches!(value, Bson::Undefined) && self.options.undefined == UndefinedEncoding::Skip {
            return Ok(0);
        }
        Ok(key.len() + 2 + self.payload(value)?)
    }

    fn payload(&mut self, value: &Bson) -> Result<usize, BsonError> {
        let string = |s: &str| s.len() + 5;
        Ok(match value {
            Bson::Undefined | Bson::Null | Bson::MinKey | Bson::MaxKey => 0,
            Bson::Boolean(_) => 1,
            Bson::Int32(_) => 4,
            Bson::Number(n) if number_is_int32(*n) => 4,
            Bson::Double(_) | Bson::Number(_) | Bson::DateTime(_) | Bson::Int64(_) | Bson::Timestamp(_) => 8,
            Bson::ObjectId(_) => 12,
            Bson::Decimal128(_) => 16,
            Bson::String(s) | Bson::JavaScriptCode(s) | Bson::Symbol(s) => string(s),
            Bson::Function(s) => {
                if !self.options.serialize_functions {
                    return Err(BsonError::UnsupportedValueType {
                        key: String::new(),
                        kind: "function",
                    });
                }
                string(s)
            }
            Bson::Document(doc) => self.document(doc)?,
            Bson::Array(items) => {
                let mut size = 5;
                for (i, item) in items.iter().enumerate() {
                    let key = i.to_string();
                    let item = array_slot(item, self.options);
                    size += self.element(&key, item).map_err(|e| e.at(&key))?;
                }
                size
            }
            Bson::Binary(bin) if bin.subtype == BinarySubtype::BinaryOld => bin.bytes.len() + 9,
            Bson::Binary(bin) => bin.bytes.len() + 5,
            Bson::RegularExpression(re) => re.pattern().len() + re.options().len() + 2,
            Bson::DbPointer(ptr) => string(&ptr.namespace) + 12,
            Bson::JavaScriptCodeWithScope(cws) => 4 + string(&cws.code) + self.document(&cws.scope)?,
            Bson::DbRef(r) => {
                let mut size = 5 + 6 + string(&r.collection);
                size += self.element("$id", &r.id).map_err(|e| e.at("$id"))?;
                if let Some(db) = &r.db {
                    size += 5 + string(db);
                }
                for (key, value) in &r.fields {
                    size += self.element(key, value).map_err(|e| e.at(key))?;
                }
                size
            }
            Bson::Shared(shared) => {
                let addr = shared.addr();
                if self.stack.contains(&addr) {
                    return Err(BsonError::CyclicStructure {
                        path: String::new(),
                    });
                }
                self.stack.push(addr);
                let result = self.document(&shared.read());
                self.stack.pop();
                result?
            }
            Bson::Raw(raw) => {
                check_raw(raw)?;
                raw.bytes.len()
            }
        })
    }
}
