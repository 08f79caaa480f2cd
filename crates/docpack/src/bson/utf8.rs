//! Strict UTF-8 checking for decoded strings and keys.

/// Decodes `bytes` as UTF-8, returning the offset of the first bad byte on
/// failure. Lead bytes are checked against their continuation count before
/// the standard library rejects overlong forms and surrogates.
pub(crate) fn decode(bytes: &[u8]) -> Result<&str, usize> {
    let mut pending = 0u8;
    for (i, &b) in bytes.iter().enumerate() {
        if pending > 0 {
            if b & 0xc0 != 0x80 {
                return Err(i);
            }
            pending -= 1;
        } else if b < 0x80 {
            continue;
        } else if b & 0xe0 == 0xc0 {
            pending = 1;
        } else if b & 0xf0 == 0xe0 {
            pending = 2;
        } else if b & 0xf8 == 0xf0 {
            pending = 3;
        } else {
            return Err(i);
        }
    }
    if pending > 0 {
        return Err(bytes.len());
    }
    std::str::from_utf8(bytes).map_err(|e| e.valid_up_to())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_multibyte_text() {
        assert_eq!(decode("añ€😀".as_bytes()), Ok("añ€😀"));
        assert_eq!(decode(b""), Ok(""));
    }

    #[test]
    fn reports_offsets() {
        assert_eq!(decode(&[0x61, 0x80]), Err(1));
        assert_eq!(decode(&[0xe2, 0x82]), Err(2));
        assert_eq!(decode(&[0xc3, 0x41]), Err(1));
        assert_eq!(decode(&[0xf8, 0x80]), Err(0));
        // overlong encoding of '/'
        assert_eq!(decode(&[0x61, 0xc0, 0xaf]), Err(1));
        // UTF-16 surrogate
        assert_eq!(decode(&[0xed, 0xa0, 0x80]), Err(0));
    }
}
