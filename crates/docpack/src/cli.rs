//! Core logic for the command-line tools:
//! - `bson-pack`: Extended JSON on stdin to BSON on stdout
//! - `bson-unpack`: BSON on stdin to Extended JSON on stdout

use thiserror::Error;

use crate::bson::{Bson, BsonDecoder, BsonEncoder, BsonError};
use crate::ejson::{self, EjsonError, EjsonOptions, EjsonParseOptions};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Bson(#[from] BsonError),
    #[error(transparent)]
    Ejson(#[from] EjsonError),
    #[error("unknown flag: {0}")]
    UnknownFlag(String),
}

/// Output switches for `bson-unpack`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnpackFlags {
    pub canonical: bool,
    pub pretty: bool,
}

impl UnpackFlags {
    /// Reads `--canonical`, `--relaxed` and `--pretty`. The last of
    /// `--canonical` / `--relaxed` wins.
    pub fn from_args<I, S>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = Self::default();
        for arg in args {
            match arg.as_ref() {
                "--canonical" => flags.canonical = true,
                "--relaxed" => flags.canonical = false,
                "--pretty" => flags.pretty = true,
                other => return Err(CliError::UnknownFlag(other.to_string())),
            }
        }
        Ok(flags)
    }
}

/// Parses one Extended JSON object and encodes it as a BSON document.
pub fn pack(text: &str) -> Result<Vec<u8>, CliError> {
    let doc = ejson::document_from_str(text.trim(), &EjsonParseOptions::default())?;
    Ok(BsonEncoder::new().encode(&doc)?)
}

/// Decodes one BSON document and renders it as Extended JSON.
pub fn unpack(bytes: &[u8], flags: UnpackFlags) -> Result<String, CliError> {
    let doc = BsonDecoder::new().decode(bytes)?;
    let options = EjsonOptions {
        canonical: flags.canonical,
    };
    let value = Bson::Document(doc);
    let text = if flags.pretty {
        ejson::to_string_pretty(&value, &options)?
    } else {
        ejson::to_string(&value, &options)?
    };
    Ok(text)
}

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack() {
        let bytes = pack(r#"{"a": {"$numberLong": "5"}, "b": [true]}"#).unwrap();
        assert_eq!(bytes[4], 0x12);
        let text = unpack(&bytes, UnpackFlags::default()).unwrap();
        assert_eq!(text, r#"{"a":5,"b":[true]}"#);
        let canonical = unpack(
            &bytes,
            UnpackFlags {
                canonical: true,
                pretty: false,
            },
        )
        .unwrap();
        assert_eq!(canonical, r#"{"a":{"$numberLong":"5"},"b":[true]}"#);
    }

    #[test]
    fn pretty_output_is_indented() {
        let bytes = pack(r#"{"a": 1}"#).unwrap();
        let flags = UnpackFlags::from_args(["--pretty"]).unwrap();
        assert_eq!(unpack(&bytes, flags).unwrap(), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn flags() {
        let flags = UnpackFlags::from_args(["--canonical", "--relaxed"]).unwrap();
        assert!(!flags.canonical);
        assert!(matches!(
            UnpackFlags::from_args(["--yaml"]),
            Err(CliError::UnknownFlag(f)) if f == "--yaml"
        ));
    }

    #[test]
    fn errors_surface() {
        assert!(matches!(pack("[1, 2]"), Err(CliError::Ejson(EjsonError::NotADocument))));
        assert!(matches!(unpack(&[5, 0, 0], UnpackFlags::default()), Err(CliError::Bson(_))));
    }
}
