//! Binary buffer writer with auto-growing capacity.

/// A little-endian binary writer that grows automatically as needed.
///
/// The writer is an explicit arena: an encoder owns one and reuses its
/// allocation across calls, so nothing is shared between encoders.
///
/// # Example
///
/// ```
/// use docpack_buffers::Writer;
///
/// let mut writer = Writer::new();
/// writer.u8(0x01);
/// writer.i32_le(2);
/// let data = writer.flush();
/// assert_eq!(data, [0x01, 0x02, 0x00, 0x00, 0x00]);
/// ```
pub struct Writer {
    /// The underlying byte buffer.
    pub uint8: Vec<u8>,
    /// Position where last flush happened.
    pub x0: usize,
    /// Current cursor position.
    pub x: usize,
    /// Allocation size when buffer needs to grow.
    alloc_size: usize,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    /// Creates a new writer with default allocation size (16KB).
    pub fn new() -> Self {
        Self::with_alloc_size(16 * 1024)
    }

    /// Creates a new writer with custom allocation size.
    pub fn with_alloc_size(alloc_size: usize) -> Self {
        let alloc_size = alloc_size.max(16);
        Self {
            uint8: vec![0u8; alloc_size],
            x0: 0,
            x: 0,
            alloc_size,
        }
    }

    /// Ensures the buffer has at least `capacity` bytes available.
    pub fn ensure_capacity(&mut self, capacity: usize) {
        let remaining = self.uint8.len() - self.x;
        if remaining < capacity {
            let total = self.uint8.len() - self.x0;
            let required = capacity - remaining;
            let total_required = total + required;
            let new_size = if total_required <= self.alloc_size {
                self.alloc_size
            } else {
                total_required * 2
            };
            self.grow(new_size);
        }
    }

    fn grow(&mut self, new_size: usize) {
        let x0 = self.x0;
        let x = self.x;
        let mut new_buf = vec![0u8; new_size];
        new_buf[..x - x0].copy_from_slice(&self.uint8[x0..x]);
        self.uint8 = new_buf;
        self.x = x - x0;
        self.x0 = 0;
    }

    /// Number of bytes written since the last flush.
    pub fn len(&self) -> usize {
        self.x - self.x0
    }

    /// Whether nothing has been written since the last flush.
    pub fn is_empty(&self) -> bool {
        self.x == self.x0
    }

    /// Discards everything written since the last flush.
    pub fn reset(&mut self) {
        self.x = self.x0;
    }

    /// Returns the written data and advances the flush position.
    pub fn flush(&mut self) -> Vec<u8> {
        let result = self.uint8[self.x0..self.x].to_vec();
        self.x0 = self.x;
        result
    }

    /// Appends the written data to `out` and advances the flush position.
    pub fn flush_into(&mut self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.uint8[self.x0..self.x]);
        self.x0 = self.x;
    }

    /// Skips `size` zeroed bytes and returns their position relative to the
    /// last flush, for a later `patch_*` call.
    pub fn reserve(&mut self, size: usize) -> usize {
        self.ensure_capacity(size);
        let at = self.x - self.x0;
        self.uint8[self.x..self.x + size].fill(0);
        self.x += size;
        at
    }

    /// Overwrites four bytes at `at` (as returned by [`Writer::reserve`]).
    pub fn patch_i32_le(&mut self, at: usize, val: i32) {
        let start = self.x0 + at;
        self.uint8[start..start + 4].copy_from_slice(&val.to_le_bytes());
    }

    /// Writes an unsigned 8-bit integer.
    #[inline]
    pub fn u8(&mut self, val: u8) {
        self.ensure_capacity(1);
        self.uint8[self.x] = val;
        self.x += 1;
    }

    /// Writes a signed 32-bit integer (little-endian).
    #[inline]
    pub fn i32_le(&mut self, val: i32) {
        self.buf(&val.to_le_bytes());
    }

    /// Writes an unsigned 32-bit integer (little-endian).
    #[inline]
    pub fn u32_le(&mut self, val: u32) {
        self.buf(&val.to_le_bytes());
    }

    /// Writes a signed 64-bit integer (little-endian).
    #[inline]
    pub fn i64_le(&mut self, val: i64) {
        self.buf(&val.to_le_bytes());
    }

    /// Writes a 64-bit floating point number (little-endian).
    #[inline]
    pub fn f64_le(&mut self, val: f64) {
        self.buf(&val.to_le_bytes());
    }

    /// Writes a byte slice.
    pub fn buf(&mut self, buf: &[u8]) {
        let length = buf.len();
        self.ensure_capacity(length);
        self.uint8[self.x..self.x + length].copy_from_slice(buf);
        self.x += length;
    }

    /// Writes the UTF-8 bytes of `s` with no length prefix or terminator.
    #[inline]
    pub fn ascii(&mut self, s: &str) {
        self.buf(s.as_bytes());
    }

    /// Writes bytes followed by a NUL terminator. The caller guarantees that
    /// `bytes` holds no NUL.
    pub fn cstring(&mut self, bytes: &[u8]) {
        self.buf(bytes);
        self.u8(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8() {
        let mut writer = Writer::new();
        writer.u8(0x01);
        writer.u8(0x02);
        assert_eq!(writer.flush(), [0x01, 0x02]);
    }

    #[test]
    fn test_i32_le() {
        let mut writer = Writer::new();
        writer.i32_le(-2);
        assert_eq!(writer.flush(), [0xfe, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_f64_le() {
        let mut writer = Writer::new();
        writer.f64_le(1.5);
        assert_eq!(writer.flush(), 1.5f64.to_le_bytes());
    }

    #[test]
    fn test_reserve_and_patch() {
        let mut writer = Writer::new();
        writer.u8(0xaa);
        writer.flush();
        let at = writer.reserve(4);
        writer.cstring(b"ab");
        writer.patch_i32_le(at, 7);
        assert_eq!(writer.flush(), [7, 0, 0, 0, b'a', b'b', 0]);
    }

    #[test]
    fn test_grow_keeps_unflushed_bytes() {
        let mut writer = Writer::with_alloc_size(16);
        let at = writer.reserve(4);
        let payload = vec![0x5a; 100];
        writer.buf(&payload);
        writer.patch_i32_le(at, 104);
        let data = writer.flush();
        assert_eq!(data.len(), 104);
        assert_eq!(&data[..4], &104i32.to_le_bytes());
        assert!(data[4..].iter().all(|b| *b == 0x5a));
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut writer = Writer::new();
        writer.u8(1);
        writer.reset();
        assert!(writer.is_empty());
        writer.u8(2);
        assert_eq!(writer.flush(), [2]);
    }

    #[test]
    fn test_flush_into() {
        let mut writer = Writer::new();
        writer.buf(b"xy");
        let mut out = vec![b'>'];
        writer.flush_into(&mut out);
        assert_eq!(out, b">xy");
        assert_eq!(writer.len(), 0);
    }
}
