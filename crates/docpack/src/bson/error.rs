//! BSON codec error type.

use docpack_buffers::BufferError;
use thiserror::Error;

/// Error type for BSON encoding and decoding.
///
/// `path` and `key` fields of encoder errors name the offending element as
/// dot-separated keys from the top-level document, array indices included.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BsonError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },
    #[error("malformed length at offset {offset}: declared {declared}, actual {actual}")]
    MalformedLength {
        offset: usize,
        declared: i64,
        actual: usize,
    },
    #[error("unterminated string at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("unknown element type 0x{tag:02x} for key {key:?} at offset {offset}")]
    UnknownTypeTag { tag: u8, key: String, offset: usize },
    #[error("invalid boolean byte 0x{value:02x} at offset {offset}")]
    InvalidBoolean { value: u8, offset: usize },
    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),
    #[error("cyclic structure at {path}")]
    CyclicStructure { path: String },
    #[error("cannot encode {kind} at {key}")]
    UnsupportedValueType { key: String, kind: &'static str },
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("{what} at {key} contains a null byte")]
    InvalidCString { key: String, what: &'static str },
    #[error("document of {0} bytes exceeds the 2 GiB limit")]
    DocumentTooLarge(usize),
}

impl BsonError {
    /// Prefixes the path of path-carrying variants with `segment`, as the
    /// error unwinds out of a nested element.
    pub(crate) fn at(mut self, segment: &str) -> Self {
        match &mut self {
            BsonError::CyclicStructure { path }
            | BsonError::UnsupportedValueType { key: path, .. }
            | BsonError::InvalidKey { key: path, .. }
            | BsonError::InvalidCString { key: path, .. } => {
                *path = if path.is_empty() {
                    segment.to_string()
                } else {
                    format!("{segment}.{path}")
                };
            }
            _ => {}
        }
        self
    }
}

impl From<BufferError> for BsonError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::EndOfBuffer { offset, .. } => BsonError::UnexpectedEof { offset },
            BufferError::Unterminated { offset } => BsonError::UnterminatedString { offset },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_accumulate_outermost_first() {
        let err = BsonError::CyclicStructure {
            path: String::new(),
        }
        .at("b")
        .at("a");
        assert_eq!(
            err,
            BsonError::CyclicStructure {
                path: "a.b".into()
            }
        );
        assert_eq!(err.to_string(), "cyclic structure at a.b");
    }

    #[test]
    fn buffer_errors_map_to_offsets() {
        let err: BsonError = BufferError::EndOfBuffer {
            offset: 3,
            wanted: 4,
        }
        .into();
        assert_eq!(err, BsonError::UnexpectedEof { offset: 3 });
    }
}
