//! Extended JSON encoder.
//!
//! Writes UTF-8 JSON where BSON types without a JSON counterpart are
//! `$`-prefixed wrapper objects (e.g. `{"$oid":"..."}`), in canonical or
//! relaxed mode.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use docpack_buffers::Writer;
use tracing::trace;

use crate::bson::values::number_is_int32;
use crate::bson::{
    Binary, Bson, BsonDecoder, DateTime, DbRef, Document, ElementType, ObjectId, RawBson,
};

use super::error::EjsonError;

/// Largest integer magnitude an f64 holds exactly.
pub(crate) const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

#[derive(Debug, Clone, Default)]
pub struct EjsonOptions {
    /// When `true`, every number and date is wrapped (canonical mode).
    /// When `false` (default), plain JSON is used where it is lossless
    /// (relaxed mode).
    pub canonical: bool,
}

impl EjsonOptions {
    pub fn canonical() -> Self {
        Self { canonical: true }
    }

    pub fn relaxed() -> Self {
        Self { canonical: false }
    }
}

/// Writes Extended JSON into an owned [`Writer`].
pub struct EjsonEncoder {
    pub writer: Writer,
    pub options: EjsonOptions,
}

impl Default for EjsonEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EjsonEncoder {
    pub fn new() -> Self {
        Self::with_options(EjsonOptions::default())
    }

    pub fn canonical() -> Self {
        Self::with_options(EjsonOptions::canonical())
    }

    pub fn with_options(options: EjsonOptions) -> Self {
        Self {
            writer: Writer::new(),
            options,
        }
    }

    /// Encodes a value to UTF-8 JSON bytes.
    pub fn encode(&mut self, value: &Bson) -> Result<Vec<u8>, EjsonError> {
        trace!(canonical = self.options.canonical, "encoding extended JSON");
        self.writer.reset();
        let mut stack = Vec::new();
        self.write_any(value, &mut stack)
            .inspect_err(|_| self.writer.reset())?;
        Ok(self.writer.flush())
    }

    pub fn encode_document(&mut self, doc: &Document) -> Result<Vec<u8>, EjsonError> {
        self.writer.reset();
        let mut stack = Vec::new();
        self.write_obj(doc, &mut stack)
            .inspect_err(|_| self.writer.reset())?;
        Ok(self.writer.flush())
    }

    pub fn encode_to_string(&mut self, value: &Bson) -> Result<String, EjsonError> {
        let bytes = self.encode(value)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// `stack` holds the shared nodes currently open, by address.
    fn write_any(&mut self, value: &Bson, stack: &mut Vec<usize>) -> Result<(), EjsonError> {
        match value {
            Bson::Null => self.writer.buf(b"null"),
            Bson::Undefined => self.writer.buf(b"{\"$undefined\":true}"),
            Bson::Boolean(true) => self.writer.buf(b"true"),
            Bson::Boolean(false) => self.writer.buf(b"false"),
            Bson::String(s) => self.write_str(s),
            Bson::Number(n) => self.write_number_as_ejson(*n),
            Bson::Double(v) => self.write_double_as_ejson(*v),
            Bson::Int32(v) => self.write_int32_as_ejson(*v),
            Bson::Int64(v) => self.write_int64_as_ejson(*v),
            Bson::Decimal128(d) => self.write_wrapped_str("$numberDecimal", &d.to_string()),
            Bson::Document(doc) => self.write_obj(doc, stack)?,
            Bson::Array(items) => self.write_arr(items, stack)?,
            Bson::Binary(bin) => self.write_binary_as_ejson(bin),
            Bson::ObjectId(id) => self.write_object_id_as_ejson(id),
            Bson::DateTime(dt) => self.write_date_as_ejson(*dt),
            Bson::RegularExpression(re) => {
                self.writer.buf(b"{\"$regularExpression\":{\"pattern\":");
                self.write_str(re.pattern());
                self.writer.buf(b",\"options\":");
                self.write_str(re.options());
                self.writer.buf(b"}}");
            }
            Bson::DbPointer(ptr) => {
                self.writer.buf(b"{\"$dbPointer\":{\"$ref\":");
                self.write_str(&ptr.namespace);
                self.writer.buf(b",\"$id\":");
                self.write_object_id_as_ejson(&ptr.id);
                self.writer.buf(b"}}");
            }
            Bson::JavaScriptCode(code) => {
                self.writer.buf(b"{\"$code\":");
                self.write_str(code);
                self.writer.u8(b'}');
            }
            Bson::Function(_) => {
                return Err(EjsonError::UnsupportedValueType {
                    path: String::new(),
                    kind: "function",
                })
            }
            Bson::Symbol(symbol) => self.write_wrapped_str("$symbol", symbol),
            Bson::JavaScriptCodeWithScope(cws) => {
                self.writer.buf(b"{\"$code\":");
                self.write_str(&cws.code);
                self.writer.buf(b",\"$scope\":");
                self.write_obj(&cws.scope, stack)
                    .map_err(|e| e.at("$scope"))?;
                self.writer.u8(b'}');
            }
            Bson::Timestamp(ts) => {
                self.writer.buf(b"{\"$timestamp\":{\"t\":");
                self.writer.ascii(&ts.time.to_string());
                self.writer.buf(b",\"i\":");
                self.writer.ascii(&ts.increment.to_string());
                self.writer.buf(b"}}");
            }
            Bson::MinKey => self.writer.buf(b"{\"$minKey\":1}"),
            Bson::MaxKey => self.writer.buf(b"{\"$maxKey\":1}"),
            Bson::DbRef(r) => self.write_db_ref(r, stack)?,
            Bson::Shared(shared) => {
                let addr = shared.addr();
                if stack.contains(&addr) {
                    return Err(EjsonError::CyclicStructure {
                        path: String::new(),
                    });
                }
                stack.push(addr);
                let result = self.write_obj(&shared.read(), stack);
                stack.pop();
                result?;
            }
            Bson::Raw(raw) => self.write_raw(raw, stack)?,
        }
        Ok(())
    }

    /// Writes a JSON string with escaping.
    pub fn write_str(&mut self, s: &str) {
        match serde_json::to_string(s) {
            Ok(json) => self.writer.ascii(&json),
            Err(_) => self.writer.buf(b"\"\""),
        }
    }

    fn write_wrapped_str(&mut self, key: &str, value: &str) {
        self.writer.u8(b'{');
        self.write_str(key);
        self.writer.u8(b':');
        self.write_str(value);
        self.writer.u8(b'}');
    }

    fn write_arr(&mut self, items: &[Bson], stack: &mut Vec<usize>) -> Result<(), EjsonError> {
        self.writer.u8(b'[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.writer.u8(b',');
            }
            self.write_any(item, stack)
                .map_err(|e| e.at(&i.to_string()))?;
        }
        self.writer.u8(b']');
        Ok(())
    }

    fn write_obj(&mut self, doc: &Document, stack: &mut Vec<usize>) -> Result<(), EjsonError> {
        self.writer.u8(b'{');
        for (i, (key, value)) in doc.iter().enumerate() {
            if i > 0 {
                self.writer.u8(b',');
            }
            self.write_str(key);
            self.writer.u8(b':');
            self.write_any(value, stack).map_err(|e| e.at(key))?;
        }
        self.writer.u8(b'}');
        Ok(())
    }

    fn write_db_ref(&mut self, r: &DbRef, stack: &mut Vec<usize>) -> Result<(), EjsonError> {
        self.writer.buf(b"{\"$ref\":");
        self.write_str(&r.collection);
        self.writer.buf(b",\"$id\":");
        self.write_any(&r.id, stack).map_err(|e| e.at("$id"))?;
        if let Some(db) = &r.db {
            self.writer.buf(b",\"$db\":");
            self.write_str(db);
        }
        for (key, value) in &r.fields {
            self.writer.u8(b',');
            self.write_str(key);
            self.writer.u8(b':');
            self.write_any(value, stack).map_err(|e| e.at(key))?;
        }
        self.writer.u8(b'}');
        Ok(())
    }

    fn write_raw(&mut self, raw: &RawBson, stack: &mut Vec<usize>) -> Result<(), EjsonError> {
        let doc = BsonDecoder::new().decode(&raw.bytes)?;
        if raw.kind == ElementType::Array {
            let items: Vec<Bson> = doc.into_iter().map(|(_, v)| v).collect();
            self.write_arr(&items, stack)
        } else {
            self.write_obj(&doc, stack)
        }
    }

    // ----------------------------------------------------------------
    // Numbers

    /// Host numbers: Int32-range integers as `$numberInt`, other integers
    /// as `$numberLong`, everything else as `$numberDouble`.
    fn write_number_as_ejson(&mut self, value: f64) {
        if !self.options.canonical {
            if value.is_finite() {
                self.writer.ascii(&js_number(value));
            } else {
                self.write_wrapped_str("$numberDouble", &js_number(value));
            }
        } else if number_is_int32(value) {
            self.write_wrapped_str("$numberInt", &(value as i32).to_string());
        } else if value.fract() == 0.0 && value.abs() < 9.223_372_036_854_775_807e18 && value != 0.0 {
            self.write_wrapped_str("$numberLong", &(value as i64).to_string());
        } else {
            self.write_wrapped_str("$numberDouble", &double_text(value));
        }
    }

    fn write_double_as_ejson(&mut self, value: f64) {
        if self.options.canonical || !value.is_finite() {
            self.write_wrapped_str("$numberDouble", &double_text(value));
        } else {
            self.writer.ascii(&double_text(value));
        }
    }

    fn write_int32_as_ejson(&mut self, value: i32) {
        if self.options.canonical {
            self.write_wrapped_str("$numberInt", &value.to_string());
        } else {
            self.writer.ascii(&value.to_string());
        }
    }

    fn write_int64_as_ejson(&mut self, value: i64) {
        if self.options.canonical || !(-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
            self.write_wrapped_str("$numberLong", &value.to_string());
        } else {
            self.writer.ascii(&value.to_string());
        }
    }

    // ----------------------------------------------------------------
    // Other wrappers

    fn write_binary_as_ejson(&mut self, bin: &Binary) {
        // {"$binary":{"base64":"...","subType":"XX"}}
        self.writer.buf(b"{\"$binary\":{\"base64\":\"");
        self.writer.ascii(&STANDARD.encode(&bin.bytes));
        self.writer.buf(b"\",\"subType\":\"");
        self.writer.ascii(&format!("{:02x}", u8::from(bin.subtype)));
        self.writer.buf(b"\"}}");
    }

    fn write_object_id_as_ejson(&mut self, id: &ObjectId) {
        self.writer.buf(b"{\"$oid\":\"");
        self.writer.ascii(&id.to_hex());
        self.writer.buf(b"\"}");
    }

    /// Relaxed mode writes an ISO-8601 string for years 1970 to 9999.
    fn write_date_as_ejson(&mut self, dt: DateTime) {
        self.writer.buf(b"{\"$date\":");
        let iso = if self.options.canonical {
            None
        } else {
            dt.try_to_rfc3339()
                .filter(|_| (0..=253_402_300_799_999).contains(&dt.timestamp_millis()))
        };
        match iso {
            Some(iso) => self.write_str(&iso),
            None => self.write_wrapped_str("$numberLong", &dt.timestamp_millis().to_string()),
        }
        self.writer.u8(b'}');
    }
}

/// Number-to-text in the JavaScript style: positional notation for
/// magnitudes in [1e-6, 1e21), exponent notation with an explicit sign
/// otherwise.
pub(crate) fn js_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.into();
    }
    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-6..1e21).contains(&magnitude) {
        return format!("{value}");
    }
    let text = format!("{value:e}");
    match text.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{mantissa}e+{exponent}"),
        _ => text,
    }
}

/// Text of a `$numberDouble`: integral values keep one fractional digit
/// (`1.0`, `-0.0`).
pub(crate) fn double_text(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{value:.1}")
    } else {
        js_number(value)
    }
}
