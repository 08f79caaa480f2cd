//! Byte buffers shared by the docpack codecs.
//!
//! - [`Writer`] is an auto-growing, little-endian byte sink with support for
//!   reserving a length prefix and back-patching it later.
//! - [`Reader`] is a cursor over a borrowed byte slice whose every read is
//!   bounds-checked against a movable end mark.
//!
//! # Example
//!
//! ```
//! use docpack_buffers::{Reader, Writer};
//!
//! let mut writer = Writer::new();
//! let at = writer.reserve(4);
//! writer.cstring(b"hi");
//! writer.patch_i32_le(at, writer.len() as i32);
//! let data = writer.flush();
//!
//! let mut reader = Reader::new(&data);
//! assert_eq!(reader.i32_le().unwrap(), 7);
//! assert_eq!(reader.cstring().unwrap(), b"hi");
//! ```

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

use thiserror::Error;

/// Error produced by bounds-checked reads.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// A read of `wanted` bytes at `offset` would pass the end mark.
    #[error("unexpected end of buffer at offset {offset} (wanted {wanted} bytes)")]
    EndOfBuffer { offset: usize, wanted: usize },
    /// No NUL terminator between `offset` and the end mark.
    #[error("unterminated C string starting at offset {offset}")]
    Unterminated { offset: usize },
}
