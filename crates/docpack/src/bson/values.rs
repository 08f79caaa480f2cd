//! The BSON value model.

use std::fmt;
use std::sync::Arc;

use chrono::SecondsFormat;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::document::Document;
use super::error::BsonError;
use super::oid::ObjectId;
use super::spec::{BinarySubtype, ElementType};
use crate::numeric::{Decimal128, Long};

/// Regex flags accepted on the wire, in canonical (alphabetical) order.
const REGEX_FLAGS: &str = "ilmsux";

/// Any value that can appear in a document.
///
/// The first block of variants maps one-to-one onto wire types. `Number`,
/// `Function`, `Shared` and `Raw` are host-side conveniences that encode
/// onto one of those types.
#[derive(Debug, Clone, PartialEq)]
pub enum Bson {
    Double(f64),
    String(String),
    Document(Document),
    Array(Vec<Bson>),
    Binary(Binary),
    Undefined,
    ObjectId(ObjectId),
    Boolean(bool),
    DateTime(DateTime),
    Null,
    RegularExpression(Regex),
    DbPointer(DbPointer),
    JavaScriptCode(String),
    Symbol(String),
    JavaScriptCodeWithScope(JavaScriptCodeWithScope),
    Int32(i32),
    Timestamp(Timestamp),
    Int64(i64),
    Decimal128(Decimal128),
    MinKey,
    MaxKey,
    /// Encodes as an embedded document with `$ref`, `$id` and optional
    /// `$db` first.
    DbRef(DbRef),
    /// Untyped host number: Int32 when integral, non-negative-zero and in
    /// range, Double otherwise. It comes back from BSON and canonical
    /// Extended JSON as the typed variant, not as `Number`.
    Number(f64),
    /// Function source text; only encodable when functions are enabled.
    Function(String),
    /// A document that may be referenced from several places, including
    /// from inside itself.
    Shared(SharedDocument),
    /// An undecoded embedded document or array.
    Raw(RawBson),
}

/// Whether `n` encodes as Int32 when carried by [`Bson::Number`].
pub(crate) fn number_is_int32(n: f64) -> bool {
    n.fract() == 0.0
        && n >= i32::MIN as f64
        && n <= i32::MAX as f64
        && !(n == 0.0 && n.is_sign_negative())
}

impl Bson {
    /// The wire type this value encodes as.
    pub fn element_type(&self) -> ElementType {
        match self {
            Bson::Double(_) => ElementType::Double,
            Bson::String(_) => ElementType::String,
            Bson::Document(_) | Bson::DbRef(_) | Bson::Shared(_) => ElementType::EmbeddedDocument,
            Bson::Array(_) => ElementType::Array,
            Bson::Binary(_) => ElementType::Binary,
            Bson::Undefined => ElementType::Undefined,
            Bson::ObjectId(_) => ElementType::ObjectId,
            Bson::Boolean(_) => ElementType::Boolean,
            Bson::DateTime(_) => ElementType::DateTime,
            Bson::Null => ElementType::Null,
            Bson::RegularExpression(_) => ElementType::RegularExpression,
            Bson::DbPointer(_) => ElementType::DbPointer,
            Bson::JavaScriptCode(_) | Bson::Function(_) => ElementType::JavaScriptCode,
            Bson::Symbol(_) => ElementType::Symbol,
            Bson::JavaScriptCodeWithScope(_) => ElementType::JavaScriptCodeWithScope,
            Bson::Int32(_) => ElementType::Int32,
            Bson::Timestamp(_) => ElementType::Timestamp,
            Bson::Int64(_) => ElementType::Int64,
            Bson::Decimal128(_) => ElementType::Decimal128,
            Bson::MinKey => ElementType::MinKey,
            Bson::MaxKey => ElementType::MaxKey,
            Bson::Number(n) if number_is_int32(*n) => ElementType::Int32,
            Bson::Number(_) => ElementType::Double,
            Bson::Raw(raw) => raw.kind,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Bson::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Bson::Int32(v) => Some(*v),
            Bson::Number(n) if number_is_int32(*n) => Some(*n as i32),
            _ => None,
        }
    }

    /// Int64, or any narrower integer widened.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Bson::Int64(v) => Some(*v),
            Bson::Int32(v) => Some(i64::from(*v)),
            Bson::Number(n) if number_is_int32(*n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Bson::Double(v) | Bson::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Bson::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Bson::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Bson>> {
        match self {
            Bson::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Bson::Null)
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Bson {
            fn from(value: $ty) -> Self {
                Bson::$variant(value.into())
            }
        })*
    };
}

impl_from! {
    f64 => Double,
    i32 => Int32,
    i64 => Int64,
    bool => Boolean,
    String => String,
    &str => String,
    Document => Document,
    Vec<Bson> => Array,
    Binary => Binary,
    ObjectId => ObjectId,
    DateTime => DateTime,
    Regex => RegularExpression,
    Timestamp => Timestamp,
    Decimal128 => Decimal128,
    DbRef => DbRef,
    DbPointer => DbPointer,
    JavaScriptCodeWithScope => JavaScriptCodeWithScope,
    SharedDocument => Shared,
    RawBson => Raw,
}

impl From<Long> for Bson {
    fn from(value: Long) -> Self {
        Bson::Int64(value.as_i64())
    }
}

impl<T: Into<Bson>> From<Option<T>> for Bson {
    fn from(value: Option<T>) -> Self {
        value.map_or(Bson::Null, Into::into)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn new(subtype: BinarySubtype, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            subtype,
            bytes: bytes.into(),
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self::new(BinarySubtype::Uuid, uuid.as_bytes().to_vec())
    }

    /// The UUID carried by a subtype-4 value of exactly 16 bytes.
    pub fn to_uuid(&self) -> Option<Uuid> {
        if self.subtype != BinarySubtype::Uuid {
            return None;
        }
        Uuid::from_slice(&self.bytes).ok()
    }
}

/// Milliseconds since the Unix epoch, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateTime(i64);

impl DateTime {
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn timestamp_millis(self) -> i64 {
        self.0
    }

    pub fn to_chrono(self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.0)
    }

    /// `YYYY-MM-DDTHH:MM:SS.mmmZ`, or `None` outside chrono's range.
    pub fn try_to_rfc3339(self) -> Option<String> {
        self.to_chrono()
            .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn parse_rfc3339(text: &str) -> Result<Self, chrono::ParseError> {
        chrono::DateTime::parse_from_rfc3339(text).map(|d| Self(d.timestamp_millis()))
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DateTime {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        Self(value.timestamp_millis())
    }
}

/// A regular expression as stored on the wire: pattern plus flag letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regex {
    pattern: String,
    options: String,
}

impl Regex {
    /// Builds a regex, sorting the flags alphabetically. Flags outside
    /// `ilmsux` are rejected.
    pub fn new(pattern: impl Into<String>, options: &str) -> Result<Self, BsonError> {
        if let Some(bad) = options.chars().find(|c| !REGEX_FLAGS.contains(*c)) {
            return Err(BsonError::InvalidRegex(format!(
                "unsupported regex option {bad:?}"
            )));
        }
        let mut flags: Vec<char> = options.chars().collect();
        flags.sort_unstable();
        Ok(Self {
            pattern: pattern.into(),
            options: flags.into_iter().collect(),
        })
    }

    /// Keeps the flags exactly as read, foreign ones included, so a
    /// decoded regex re-encodes byte for byte.
    pub(crate) fn from_wire(pattern: String, options: String) -> Self {
        Self { pattern, options }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    /// Compiles the pattern with the `regex` crate. Flags without a
    /// counterpart there (`l`, `u`) are ignored.
    pub fn to_native(&self) -> Result<regex::Regex, regex::Error> {
        regex::RegexBuilder::new(&self.pattern)
            .case_insensitive(self.options.contains('i'))
            .multi_line(self.options.contains('m'))
            .dot_matches_new_line(self.options.contains('s'))
            .ignore_whitespace(self.options.contains('x'))
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbPointer {
    pub namespace: String,
    pub id: ObjectId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JavaScriptCodeWithScope {
    pub code: String,
    pub scope: Document,
}

/// Replication timestamp. Written increment first, then seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    pub time: u32,
    pub increment: u32,
}

impl Timestamp {
    /// Seconds in the high half, increment in the low half.
    pub fn to_long(self) -> Long {
        Long::from_bits(self.increment as i32, self.time as i32, true)
    }

    pub fn from_long(value: Long) -> Self {
        Self {
            time: value.high_bits() as u32,
            increment: value.low_bits() as u32,
        }
    }
}

/// A reference to a document in another collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DbRef {
    pub collection: String,
    pub id: Box<Bson>,
    pub db: Option<String>,
    /// Extra non-`$` fields, kept in order after the reference keys.
    pub fields: Document,
}

impl DbRef {
    pub fn new(collection: impl Into<String>, id: impl Into<Bson>) -> Self {
        Self {
            collection: collection.into(),
            id: Box::new(id.into()),
            db: None,
            fields: Document::new(),
        }
    }

    /// Whether `doc` has the reference shape: every `$` key is one of
    /// `$ref`, `$id`, `$db`; `$ref` is a string; `$id` is present and not
    /// null; `$db`, if present, is a string.
    pub fn is_reference_shaped(doc: &Document) -> bool {
        doc.keys()
            .filter(|k| k.starts_with('$'))
            .all(|k| matches!(k.as_str(), "$ref" | "$id" | "$db"))
            && matches!(doc.get("$ref"), Some(Bson::String(_)))
            && matches!(doc.get("$id"), Some(v) if !matches!(v, Bson::Null | Bson::Undefined))
            && matches!(doc.get("$db"), None | Some(Bson::String(_)))
    }

    /// Converts a reference-shaped document, handing it back unchanged
    /// otherwise.
    pub fn try_from_document(doc: Document) -> Result<Self, Document> {
        if !Self::is_reference_shaped(&doc) {
            return Err(doc);
        }
        let mut collection = String::new();
        let mut id = Bson::Null;
        let mut db = None;
        let mut fields = Document::new();
        for (key, value) in doc {
            match (key.as_str(), value) {
                ("$ref", Bson::String(s)) => collection = s,
                ("$id", v) => id = v,
                ("$db", Bson::String(s)) => db = Some(s),
                (_, v) => {
                    fields.insert(key.clone(), v);
                }
            }
        }
        Ok(Self {
            collection,
            id: Box::new(id),
            db,
            fields,
        })
    }

    /// The document form: `$ref`, `$id`, optional `$db`, then the extra
    /// fields.
    pub fn into_document(self) -> Document {
        let mut doc = Document::with_capacity(self.fields.len() + 3);
        doc.insert("$ref", self.collection);
        doc.insert("$id", *self.id);
        if let Some(db) = self.db {
            doc.insert("$db", db);
        }
        doc.extend(self.fields);
        doc
    }
}

/// A document behind a shared, lockable handle.
///
/// Clones share the same document, so a handle inserted into its own
/// document forms a cycle. Encoders detect such cycles and fail.
#[derive(Clone, Default)]
pub struct SharedDocument(Arc<RwLock<Document>>);

impl SharedDocument {
    pub fn new(doc: Document) -> Self {
        Self(Arc::new(RwLock::new(doc)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Document> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Document> {
        self.0.write()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of the shared allocation, for cycle tracking.
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

/// Handles are equal when they share a document or hold equal documents.
/// Comparing two distinct cyclic graphs does not terminate.
impl PartialEq for SharedDocument {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.read() == *other.read()
    }
}

impl fmt::Debug for SharedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedDocument({:#x})", self.addr())
    }
}

/// Undecoded bytes of an embedded document or array, size prefix and
/// terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBson {
    pub kind: ElementType,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_inference() {
        assert_eq!(Bson::Number(1.0).element_type(), ElementType::Int32);
        assert_eq!(Bson::Number(-0.0).element_type(), ElementType::Double);
        assert_eq!(Bson::Number(1.5).element_type(), ElementType::Double);
        assert_eq!(Bson::Number(2147483648.0).element_type(), ElementType::Double);
        assert_eq!(Bson::Number(-2147483648.0).element_type(), ElementType::Int32);
        assert_eq!(Bson::Number(f64::NAN).element_type(), ElementType::Double);
    }

    #[test]
    fn regex_options_are_sorted_and_checked() {
        let re = Regex::new("a.c", "smi").unwrap();
        assert_eq!(re.options(), "ims");
        assert!(Regex::new("a", "g").is_err());
        let native = Regex::new("^A.C$", "is").unwrap().to_native().unwrap();
        assert!(native.is_match("a\nc"));
    }

    #[test]
    fn timestamp_long_halves() {
        let ts = Timestamp {
            time: 0xffff_fffe,
            increment: 7,
        };
        let long = ts.to_long();
        assert!(long.is_unsigned());
        assert_eq!(long.as_u64(), 0xffff_fffe_0000_0007);
        assert_eq!(Timestamp::from_long(long), ts);
    }

    #[test]
    fn date_time_iso() {
        let dt = DateTime::from_millis(1_500);
        assert_eq!(dt.try_to_rfc3339().unwrap(), "1970-01-01T00:00:01.500Z");
        assert_eq!(DateTime::parse_rfc3339("1970-01-01T00:00:01.500Z").unwrap(), dt);
        assert_eq!(
            DateTime::parse_rfc3339("2020-01-01T01:00:00+01:00").unwrap(),
            DateTime::from_millis(1_577_836_800_000)
        );
    }

    #[test]
    fn uuid_binary() {
        let uuid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let bin = Binary::from_uuid(uuid);
        assert_eq!(bin.subtype, BinarySubtype::Uuid);
        assert_eq!(bin.to_uuid(), Some(uuid));
        assert_eq!(Binary::new(BinarySubtype::Generic, bin.bytes).to_uuid(), None);
    }

    #[test]
    fn reference_shape() {
        let good: Document = [("$ref", Bson::from("users")), ("$id", Bson::Int32(5)), ("x", Bson::Null)]
            .into_iter()
            .collect();
        let r = DbRef::try_from_document(good).unwrap();
        assert_eq!(r.collection, "users");
        assert_eq!(*r.id, Bson::Int32(5));
        assert_eq!(r.fields.len(), 1);

        let null_id: Document = [("$ref", Bson::from("users")), ("$id", Bson::Null)]
            .into_iter()
            .collect();
        assert!(DbRef::try_from_document(null_id).is_err());

        let extra: Document = [("$ref", Bson::from("u")), ("$id", Bson::Int32(1)), ("$x", Bson::Null)]
            .into_iter()
            .collect();
        assert!(!DbRef::is_reference_shaped(&extra));
    }

    #[test]
    fn shared_handles_compare_by_identity_first() {
        let shared = SharedDocument::new(Document::new());
        shared.write().insert("me", shared.clone());
        assert_eq!(shared, shared.clone());
        assert!(format!("{shared:?}").starts_with("SharedDocument(0x"));
    }
}
