//! Binary buffer reader with cursor tracking.

use crate::BufferError;

/// A little-endian binary reader over a borrowed byte slice.
///
/// Every read is checked against `end`, which callers may narrow to the
/// extent of a length-prefixed region (see [`Reader::limit`]).
///
/// # Example
///
/// ```
/// use docpack_buffers::Reader;
///
/// let data = [0x01, 0x02, 0x00, 0x00, 0x00];
/// let mut reader = Reader::new(&data);
///
/// assert_eq!(reader.u8().unwrap(), 0x01);
/// assert_eq!(reader.i32_le().unwrap(), 2);
/// assert!(reader.u8().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    /// The underlying byte slice.
    pub uint8: &'a [u8],
    /// Current cursor position.
    pub x: usize,
    /// End position (exclusive).
    pub end: usize,
}

impl<'a> Reader<'a> {
    /// Creates a new reader for the given byte slice.
    pub fn new(uint8: &'a [u8]) -> Self {
        let end = uint8.len();
        Self { uint8, x: 0, end }
    }

    /// Creates a reader from a slice with custom start and end positions.
    pub fn from_slice(uint8: &'a [u8], x: usize, end: usize) -> Self {
        let end = end.min(uint8.len());
        Self { uint8, x, end }
    }

    /// Returns the number of remaining bytes before the end mark.
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.x)
    }

    /// Moves the end mark to `end` and returns the previous one, so a caller
    /// can confine reads to a sub-region and restore afterwards.
    pub fn limit(&mut self, end: usize) -> usize {
        let previous = self.end;
        self.end = end.min(self.uint8.len());
        previous
    }

    #[inline]
    fn check(&self, n: usize) -> Result<(), BufferError> {
        if self.x > self.end || self.end - self.x < n {
            Err(BufferError::EndOfBuffer {
                offset: self.x,
                wanted: n,
            })
        } else {
            Ok(())
        }
    }

    /// Peeks at the current byte without advancing the cursor.
    pub fn peek(&self) -> Result<u8, BufferError> {
        self.check(1)?;
        Ok(self.uint8[self.x])
    }

    /// Advances the cursor by the given number of bytes.
    pub fn skip(&mut self, length: usize) -> Result<(), BufferError> {
        self.check(length)?;
        self.x += length;
        Ok(())
    }

    /// Returns a subslice of the given size and advances the cursor.
    pub fn buf(&mut self, size: usize) -> Result<&'a [u8], BufferError> {
        self.check(size)?;
        let x = self.x;
        self.x += size;
        Ok(&self.uint8[x..x + size])
    }

    /// Reads a fixed-size byte array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.buf(N)?);
        Ok(out)
    }

    /// Reads an unsigned 8-bit integer.
    #[inline]
    pub fn u8(&mut self) -> Result<u8, BufferError> {
        self.check(1)?;
        let val = self.uint8[self.x];
        self.x += 1;
        Ok(val)
    }

    /// Reads a signed 32-bit integer (little-endian).
    #[inline]
    pub fn i32_le(&mut self) -> Result<i32, BufferError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    /// Reads an unsigned 32-bit integer (little-endian).
    #[inline]
    pub fn u32_le(&mut self) -> Result<u32, BufferError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Reads a signed 64-bit integer (little-endian).
    #[inline]
    pub fn i64_le(&mut self) -> Result<i64, BufferError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// Reads a 64-bit floating point number (little-endian).
    #[inline]
    pub fn f64_le(&mut self) -> Result<f64, BufferError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// Reads bytes up to the next NUL, consuming the NUL. The returned slice
    /// excludes the terminator.
    pub fn cstring(&mut self) -> Result<&'a [u8], BufferError> {
        let start = self.x;
        let window = self.uint8.get(start..self.end).unwrap_or(&[]);
        match window.iter().position(|b| *b == 0) {
            Some(n) => {
                self.x = start + n + 1;
                Ok(&window[..n])
            }
            None => Err(BufferError::Unterminated { offset: start }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_end_of_buffer() {
        let data = [0x01];
        let mut reader = Reader::new(&data);
        assert_eq!(reader.u8(), Ok(0x01));
        assert_eq!(
            reader.u8(),
            Err(BufferError::EndOfBuffer {
                offset: 1,
                wanted: 1
            })
        );
    }

    #[test]
    fn test_i32_le_negative() {
        let data = (-5i32).to_le_bytes();
        let mut reader = Reader::new(&data);
        assert_eq!(reader.i32_le(), Ok(-5));
    }

    #[test]
    fn test_i32_le_partial() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = Reader::new(&data);
        assert!(reader.i32_le().is_err());
        assert_eq!(reader.x, 0);
    }

    #[test]
    fn test_i64_and_f64_le() {
        let mut data = Vec::new();
        data.extend_from_slice(&(-9_999_999_999i64).to_le_bytes());
        data.extend_from_slice(&2.25f64.to_le_bytes());
        let mut reader = Reader::new(&data);
        assert_eq!(reader.i64_le(), Ok(-9_999_999_999));
        assert_eq!(reader.f64_le(), Ok(2.25));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_cstring() {
        let data = b"abc\0def\0";
        let mut reader = Reader::new(data);
        assert_eq!(reader.cstring(), Ok(&b"abc"[..]));
        assert_eq!(reader.cstring(), Ok(&b"def"[..]));
        assert_eq!(
            reader.cstring(),
            Err(BufferError::Unterminated { offset: 8 })
        );
    }

    #[test]
    fn test_cstring_respects_limit() {
        let data = b"abc\0";
        let mut reader = Reader::new(data);
        reader.limit(3);
        assert_eq!(
            reader.cstring(),
            Err(BufferError::Unterminated { offset: 0 })
        );
    }

    #[test]
    fn test_limit_and_restore() {
        let data = [1, 2, 3, 4];
        let mut reader = Reader::new(&data);
        let previous = reader.limit(2);
        assert_eq!(reader.buf(2), Ok(&[1u8, 2][..]));
        assert!(reader.u8().is_err());
        reader.limit(previous);
        assert_eq!(reader.u8(), Ok(3));
    }

    #[test]
    fn test_skip_past_end() {
        let data = [0u8; 3];
        let mut reader = Reader::new(&data);
        assert!(reader.skip(4).is_err());
        assert_eq!(reader.skip(3), Ok(()));
        assert!(reader.peek().is_err());
    }
}
