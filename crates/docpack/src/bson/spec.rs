//! BSON type registry: element type tags and binary subtypes.

/// One-byte discriminator preceding every element in a BSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElementType {
    Double = 0x01,
    String = 0x02,
    EmbeddedDocument = 0x03,
    Array = 0x04,
    Binary = 0x05,
    /// Deprecated.
    Undefined = 0x06,
    ObjectId = 0x07,
    Boolean = 0x08,
    DateTime = 0x09,
    Null = 0x0a,
    RegularExpression = 0x0b,
    /// Deprecated.
    DbPointer = 0x0c,
    JavaScriptCode = 0x0d,
    /// Deprecated.
    Symbol = 0x0e,
    /// Deprecated.
    JavaScriptCodeWithScope = 0x0f,
    Int32 = 0x10,
    Timestamp = 0x11,
    Int64 = 0x12,
    Decimal128 = 0x13,
    MaxKey = 0x7f,
    MinKey = 0xff,
}

impl ElementType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        use ElementType::*;
        Some(match tag {
            0x01 => Double,
            0x02 => String,
            0x03 => EmbeddedDocument,
            0x04 => Array,
            0x05 => Binary,
            0x06 => Undefined,
            0x07 => ObjectId,
            0x08 => Boolean,
            0x09 => DateTime,
            0x0a => Null,
            0x0b => RegularExpression,
            0x0c => DbPointer,
            0x0d => JavaScriptCode,
            0x0e => Symbol,
            0x0f => JavaScriptCodeWithScope,
            0x10 => Int32,
            0x11 => Timestamp,
            0x12 => Int64,
            0x13 => Decimal128,
            0x7f => MaxKey,
            0xff => MinKey,
            _ => return None,
        })
    }

    /// Human-readable name, used in encoder error messages.
    pub fn name(self) -> &'static str {
        use ElementType::*;
        match self {
            Double => "double",
            String => "string",
            EmbeddedDocument => "document",
            Array => "array",
            Binary => "binary",
            Undefined => "undefined",
            ObjectId => "objectId",
            Boolean => "bool",
            DateTime => "date",
            Null => "null",
            RegularExpression => "regex",
            DbPointer => "dbPointer",
            JavaScriptCode => "javascript",
            Symbol => "symbol",
            JavaScriptCodeWithScope => "javascriptWithScope",
            Int32 => "int",
            Timestamp => "timestamp",
            Int64 => "long",
            Decimal128 => "decimal",
            MaxKey => "maxKey",
            MinKey => "minKey",
        }
    }
}

impl From<ElementType> for u8 {
    fn from(t: ElementType) -> u8 {
        t as u8
    }
}

/// Subtype byte of a BSON binary value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinarySubtype {
    Generic,
    Function,
    /// Legacy generic binary; its payload nests a second length prefix.
    BinaryOld,
    UuidOld,
    Uuid,
    Md5,
    Encrypted,
    Column,
    Sensitive,
    Vector,
    /// 0x80 to 0xff.
    UserDefined(u8),
    Reserved(u8),
}

impl From<u8> for BinarySubtype {
    fn from(byte: u8) -> Self {
        match byte {
            0x00 => BinarySubtype::Generic,
            0x01 => BinarySubtype::Function,
            0x02 => BinarySubtype::BinaryOld,
            0x03 => BinarySubtype::UuidOld,
            0x04 => BinarySubtype::Uuid,
            0x05 => BinarySubtype::Md5,
            0x06 => BinarySubtype::Encrypted,
            0x07 => BinarySubtype::Column,
            0x08 => BinarySubtype::Sensitive,
            0x09 => BinarySubtype::Vector,
            0x80..=0xff => BinarySubtype::UserDefined(byte),
            _ => BinarySubtype::Reserved(byte),
        }
    }
}

impl From<BinarySubtype> for u8 {
    fn from(subtype: BinarySubtype) -> u8 {
        match subtype {
            BinarySubtype::Generic => 0x00,
            BinarySubtype::Function => 0x01,
            BinarySubtype::BinaryOld => 0x02,
            BinarySubtype::UuidOld => 0x03,
            BinarySubtype::Uuid => 0x04,
            BinarySubtype::Md5 => 0x05,
            BinarySubtype::Encrypted => 0x06,
            BinarySubtype::Column => 0x07,
            BinarySubtype::Sensitive => 0x08,
            BinarySubtype::Vector => 0x09,
            BinarySubtype::UserDefined(b) | BinarySubtype::Reserved(b) => b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tag_maps_back_to_itself() {
        for tag in 0u8..=0xff {
            if let Some(t) = ElementType::from_u8(tag) {
                assert_eq!(u8::from(t), tag);
            }
        }
        assert_eq!(ElementType::from_u8(0x00), None);
        assert_eq!(ElementType::from_u8(0x14), None);
    }

    #[test]
    fn subtype_bytes_round_trip() {
        for byte in 0u8..=0xff {
            assert_eq!(u8::from(BinarySubtype::from(byte)), byte);
        }
        assert_eq!(BinarySubtype::from(0x80), BinarySubtype::UserDefined(0x80));
        assert_eq!(BinarySubtype::from(0x20), BinarySubtype::Reserved(0x20));
    }
}
