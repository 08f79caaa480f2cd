//! Error type for Extended JSON projection and parsing.

use thiserror::Error;

use crate::bson::BsonError;
use crate::numeric::NumericError;

fn show(path: &str) -> &str {
    if path.is_empty() {
        "(root)"
    } else {
        path
    }
}

/// `path` fields hold dot-separated keys from the top-level value, array
/// indices included.
#[derive(Debug, Error)]
pub enum EjsonError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {kind} wrapper at {}: {reason}", show(.path))]
    InvalidWrapper {
        kind: &'static str,
        path: String,
        reason: String,
    },
    #[error("ambiguous extended JSON at {}: reference keys without a well-formed reference", show(.path))]
    AmbiguousExtendedJson { path: String },
    #[error("cyclic structure at {}", show(.path))]
    CyclicStructure { path: String },
    #[error("cannot represent {kind} at {}", show(.path))]
    UnsupportedValueType { path: String, kind: &'static str },
    #[error("invalid number at {}: {source}", show(.path))]
    Numeric {
        path: String,
        #[source]
        source: NumericError,
    },
    #[error("top-level value is not a document")]
    NotADocument,
    #[error(transparent)]
    Bson(#[from] BsonError),
}

impl EjsonError {
    /// Prefixes the path with `segment` as the error unwinds out of a
    /// nested value.
    pub(crate) fn at(mut self, segment: &str) -> Self {
        match &mut self {
            EjsonError::InvalidWrapper { path, .. }
            | EjsonError::AmbiguousExtendedJson { path }
            | EjsonError::CyclicStructure { path }
            | EjsonError::UnsupportedValueType { path, .. }
            | EjsonError::Numeric { path, .. } => {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_path_is_named() {
        let err = EjsonError::CyclicStructure {
            path: String::new(),
        };
        assert_eq!(err.to_string(), "cyclic structure at (root)");
        assert_eq!(err.at("1").at("a").to_string(), "cyclic structure at a.1");
    }
}
