//! Extended JSON decoder.
//!
//! Text is parsed by `serde_json` into an order-preserving tree, which is
//! then walked and `$`-wrapper objects are turned back into typed values.
//! Canonical, relaxed and legacy wrapper forms are all accepted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Number, Value};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::bson::{
    Binary, BinarySubtype, Bson, DateTime, DbPointer, DbRef, Document, JavaScriptCodeWithScope,
    ObjectId, Regex, Timestamp,
};
use crate::numeric::{Decimal128, Long};

use super::encoder::MAX_SAFE_INTEGER;
use super::error::EjsonError;

/// Keys that select a wrapper, in the order they are looked for.
const WRAPPER_KEYS: &[&str] = &[
    "$oid",
    "$numberInt",
    "$numberLong",
    "$numberDouble",
    "$numberDecimal",
    "$binary",
    "$uuid",
    "$date",
    "$regularExpression",
    "$regex",
    "$timestamp",
    "$minKey",
    "$maxKey",
    "$undefined",
    "$code",
    "$symbol",
    "$dbPointer",
];

const REFERENCE_KEYS: &[&str] = &["$ref", "$id", "$db"];

#[derive(Debug, Clone, Default)]
pub struct EjsonParseOptions {
    /// Plain JSON numbers, and the number wrappers, become
    /// [`Bson::Number`] instead of Int32/Int64/Double. Integers outside the
    /// exactly representable range stay Int64.
    pub relaxed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EjsonDecoder {
    pub options: EjsonParseOptions,
}

impl EjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EjsonParseOptions) -> Self {
        Self { options }
    }

    pub fn decode(&self, input: &[u8]) -> Result<Bson, EjsonError> {
        trace!(len = input.len(), "decoding extended JSON");
        let value: Value = serde_json::from_slice(input)?;
        self.decode_value(&value)
            .inspect_err(|err| debug!(%err, "extended JSON decode failed"))
    }

    pub fn decode_str(&self, input: &str) -> Result<Bson, EjsonError> {
        self.decode(input.as_bytes())
    }

    /// Decodes a top-level object into a document. A top-level reference is
    /// returned in its document form.
    pub fn decode_document(&self, input: &str) -> Result<Document, EjsonError> {
        match self.decode_str(input)? {
            Bson::Document(doc) => Ok(doc),
            Bson::DbRef(r) => Ok(r.into_document()),
            _ => Err(EjsonError::NotADocument),
        }
    }

    /// Converts an already parsed JSON tree.
    pub fn decode_value(&self, value: &Value) -> Result<Bson, EjsonError> {
        match value {
            Value::Null => Ok(Bson::Null),
            Value::Bool(b) => Ok(Bson::Boolean(*b)),
            Value::String(s) => Ok(Bson::String(s.clone())),
            Value::Number(n) => Ok(self.read_number(n)),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.decode_value(item).map_err(|e| e.at(&i.to_string())))
                .collect::<Result<Vec<_>, _>>()
                .map(Bson::Array),
            Value::Object(map) => self.read_object(map),
        }
    }

    fn read_number(&self, n: &Number) -> Bson {
        if let Some(i) = n.as_i64() {
            if self.options.relaxed && (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i) {
                return Bson::Number(i as f64);
            }
            return match i32::try_from(i) {
                Ok(small) if !self.options.relaxed => Bson::Int32(small),
                _ => Bson::Int64(i),
            };
        }
        let f = n.as_f64().unwrap_or(f64::NAN);
        if self.options.relaxed {
            Bson::Number(f)
        } else {
            Bson::Double(f)
        }
    }

    fn read_members(&self, map: &Map<String, Value>) -> Result<Document, EjsonError> {
        let mut doc = Document::with_capacity(map.len());
        for (key, value) in map {
            let value = self.decode_value(value).map_err(|e| e.at(key))?;
            doc.insert(key.as_str(), value);
        }
        Ok(doc)
    }

    fn read_object(&self, map: &Map<String, Value>) -> Result<Bson, EjsonError> {
        let wrapper = map.iter().find_map(|(key, value)| {
            let kind = WRAPPER_KEYS.iter().copied().find(|w| *w == key)?;
            // {"$regex": {...}} is a query operator, not a legacy regex
            (kind != "$regex" || value.is_string()).then_some(kind)
        });
        if let Some(kind) = wrapper {
            return self.read_wrapper(kind, map);
        }
        if map.keys().any(|k| REFERENCE_KEYS.contains(&k.as_str())) {
            let doc = self.read_members(map)?;
            return DbRef::try_from_document(doc)
                .map(Bson::DbRef)
                .map_err(|_| EjsonError::AmbiguousExtendedJson {
                    path: String::new(),
                });
        }
        self.read_members(map).map(Bson::Document)
    }

    fn read_wrapper(&self, kind: &'static str, map: &Map<String, Value>) -> Result<Bson, EjsonError> {
        let w = Wrapper { kind, map };
        let relaxed = self.options.relaxed;
        let value = w.field(kind)?;
        Ok(match kind {
            "$oid" => {
                w.only(&[])?;
                Bson::ObjectId(w.object_id(value)?)
            }
            "$numberInt" => {
                w.only(&[])?;
                let text = w.str(value)?;
                let v: i32 = text
                    .parse()
                    .map_err(|_| w.invalid(format!("{text:?} is not a 32-bit integer")))?;
                if relaxed {
                    Bson::Number(f64::from(v))
                } else {
                    Bson::Int32(v)
                }
            }
            "$numberLong" => {
                w.only(&[])?;
                let v = w.long(value)?;
                if relaxed && (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&v) {
                    Bson::Number(v as f64)
                } else {
                    Bson::Int64(v)
                }
            }
            "$numberDouble" => {
                w.only(&[])?;
                let text = w.str(value)?;
                let v = parse_double(text)
                    .ok_or_else(|| w.invalid(format!("{text:?} is not a double")))?;
                if relaxed {
                    Bson::Number(v)
                } else {
                    Bson::Double(v)
                }
            }
            "$numberDecimal" => {
                w.only(&[])?;
                Bson::Decimal128(Decimal128::parse(w.str(value)?).map_err(|source| {
                    EjsonError::Numeric {
                        path: String::new(),
                        source,
                    }
                })?)
            }
            "$binary" => Bson::Binary(w.binary(value)?),
            "$uuid" => {
                w.only(&[])?;
                let uuid = Uuid::parse_str(w.str(value)?).map_err(|e| w.invalid(e.to_string()))?;
                Bson::Binary(Binary::from_uuid(uuid))
            }
            "$date" => {
                w.only(&[])?;
                Bson::DateTime(w.date(value)?)
            }
            "$regularExpression" => {
                w.only(&[])?;
                let inner = w.object(value)?;
                let pattern = w.str(w.member(inner, "pattern")?)?;
                let options = w.str(w.member(inner, "options")?)?;
                w.members_only(inner, &["pattern", "options"])?;
                Bson::RegularExpression(w.regex(pattern, options)?)
            }
            "$regex" => {
                w.only(&["$options"])?;
                let options = match map.get("$options") {
                    Some(v) => w.str(v)?,
                    None => "",
                };
                Bson::RegularExpression(w.regex(w.str(value)?, options)?)
            }
            "$timestamp" => {
                w.only(&[])?;
                let inner = w.object(value)?;
                w.members_only(inner, &["t", "i"])?;
                Bson::Timestamp(Timestamp {
                    time: w.u32(w.member(inner, "t")?)?,
                    increment: w.u32(w.member(inner, "i")?)?,
                })
            }
            "$minKey" | "$maxKey" => {
                w.only(&[])?;
                if value.as_i64() != Some(1) {
                    return Err(w.invalid("expected 1".into()));
                }
                if kind == "$minKey" {
                    Bson::MinKey
                } else {
                    Bson::MaxKey
                }
            }
            "$undefined" => {
                w.only(&[])?;
                if value != &Value::Bool(true) {
                    return Err(w.invalid("expected true".into()));
                }
                Bson::Undefined
            }
            "$code" => {
                w.only(&["$scope"])?;
                let code = w.str(value)?.to_string();
                match map.get("$scope") {
                    Some(scope) => {
                        let scope = self
                            .read_members(w.object(scope)?)
                            .map_err(|e| e.at("$scope"))?;
                        Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope { code, scope })
                    }
                    None => Bson::JavaScriptCode(code),
                }
            }
            "$symbol" => {
                w.only(&[])?;
                Bson::Symbol(w.str(value)?.to_string())
            }
            "$dbPointer" => {
                w.only(&[])?;
                let inner = w.object(value)?;
                w.members_only(inner, &["$ref", "$id"])?;
                let namespace = w.str(w.member(inner, "$ref")?)?.to_string();
                let id = match w.object(w.member(inner, "$id")?)?.get("$oid") {
                    Some(oid) => w.object_id(oid)?,
                    None => return Err(w.invalid("$id must be an $oid wrapper".into())),
                };
                Bson::DbPointer(DbPointer { namespace, id })
            }
            _ => return Err(w.invalid("unknown wrapper".into())),
        })
    }
}

/// Shape checks for one wrapper object. Failures are `InvalidWrapper`
/// errors naming `kind`.
struct Wrapper<'a> {
    kind: &'static str,
    map: &'a Map<String, Value>,
}

impl<'a> Wrapper<'a> {
    fn invalid(&self, reason: String) -> EjsonError {
        EjsonError::InvalidWrapper {
            kind: self.kind,
            path: String::new(),
            reason,
        }
    }

    fn field(&self, key: &str) -> Result<&'a Value, EjsonError> {
        self.member(self.map, key)
    }

    fn member<'m>(&self, map: &'m Map<String, Value>, key: &str) -> Result<&'m Value, EjsonError> {
        map.get(key)
            .ok_or_else(|| self.invalid(format!("missing {key:?}")))
    }

    /// Allows only the wrapper key plus `companions` at the top level.
    fn only(&self, companions: &[&str]) -> Result<(), EjsonError> {
        match self
            .map
            .keys()
            .find(|k| k.as_str() != self.kind && !companions.contains(&k.as_str()))
        {
            Some(extra) => Err(self.invalid(format!("unexpected key {extra:?}"))),
            None => Ok(()),
        }
    }

    fn members_only(&self, map: &Map<String, Value>, allowed: &[&str]) -> Result<(), EjsonError> {
        match map.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(extra) => Err(self.invalid(format!("unexpected key {extra:?}"))),
            None => Ok(()),
        }
    }

    fn str<'v>(&self, value: &'v Value) -> Result<&'v str, EjsonError> {
        value
            .as_str()
            .ok_or_else(|| self.invalid(format!("expected a string, got {value}")))
    }

    fn object<'v>(&self, value: &'v Value) -> Result<&'v Map<String, Value>, EjsonError> {
        value
            .as_object()
            .ok_or_else(|| self.invalid(format!("expected an object, got {value}")))
    }

    fn u32(&self, value: &Value) -> Result<u32, EjsonError> {
        value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| self.invalid(format!("expected an unsigned 32-bit integer, got {value}")))
    }

    fn long(&self, value: &Value) -> Result<i64, EjsonError> {
        let text = self.str(value)?;
        Long::from_str_radix(text, false, 10)
            .map(Long::as_i64)
            .map_err(|source| EjsonError::Numeric {
                path: String::new(),
                source,
            })
    }

    fn object_id(&self, value: &Value) -> Result<ObjectId, EjsonError> {
        ObjectId::parse_str(self.str(value)?).map_err(|e| self.invalid(e.to_string()))
    }

    fn regex(&self, pattern: &str, options: &str) -> Result<Regex, EjsonError> {
        Regex::new(pattern, options).map_err(|e| self.invalid(e.to_string()))
    }

    fn subtype(&self, value: &Value) -> Result<BinarySubtype, EjsonError> {
        let text = self.str(value)?;
        if text.is_empty() || text.len() > 2 {
            return Err(self.invalid(format!("{text:?} is not a one-byte hex subtype")));
        }
        u8::from_str_radix(text, 16)
            .map(BinarySubtype::from)
            .map_err(|_| self.invalid(format!("{text:?} is not a one-byte hex subtype")))
    }

    /// Canonical `{"$binary": {"base64", "subType"}}` or legacy
    /// `{"$binary": "...", "$type": "XX"}`.
    fn binary(&self, value: &Value) -> Result<Binary, EjsonError> {
        let (payload, subtype) = match value {
            Value::Object(inner) => {
                self.only(&[])?;
                self.members_only(inner, &["base64", "subType"])?;
                (
                    self.member(inner, "base64")?,
                    self.subtype(self.member(inner, "subType")?)?,
                )
            }
            _ => {
                self.only(&["$type"])?;
                (value, self.subtype(self.field("$type")?)?)
            }
        };
        let bytes = STANDARD
            .decode(self.str(payload)?)
            .map_err(|e| self.invalid(e.to_string()))?;
        Ok(Binary::new(subtype, bytes))
    }

    /// ISO-8601 string, `{"$numberLong": "..."}`, or a plain number of
    /// milliseconds.
    fn date(&self, value: &Value) -> Result<DateTime, EjsonError> {
        match value {
            Value::String(text) => {
                DateTime::parse_rfc3339(text).map_err(|e| self.invalid(e.to_string()))
            }
            Value::Object(inner) => {
                self.members_only(inner, &["$numberLong"])?;
                Ok(DateTime::from_millis(self.long(self.member(inner, "$numberLong")?)?))
            }
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(ms), _) => Ok(DateTime::from_millis(ms)),
                (None, Some(ms)) if ms.is_finite() && ms.abs() < 9.2e18 => {
                    Ok(DateTime::from_millis(ms as i64))
                }
                _ => Err(self.invalid(format!("{n} is out of range"))),
            },
            other => Err(self.invalid(format!("unexpected value {other}"))),
        }
    }
}

/// `Infinity`, `-Infinity`, `NaN`, or decimal text.
fn parse_double(text: &str) -> Option<f64> {
    match text {
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ if !text.is_empty()
            && text
                .bytes()
                .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E')) =>
        {
            text.parse().ok()
        }
        _ => None,
    }
}
