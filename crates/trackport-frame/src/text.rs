use std::borrow::Cow;

/// Shortest buffer worth trying to classify.
pub const MIN_FRAME_LEN: usize = 10;

/// Extract the leading NUL-terminated record from `buf`.
///
/// Reads up to the first `0x00` or the end of the buffer, decoding each byte
/// as one Latin-1 character. Pure ASCII records are borrowed. Returns `None`
/// when the record is empty.
pub fn leading_text(buf: &[u8]) -> Option<Cow<'_, str>> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let record = &buf[..end];
    if record.is_empty() {
        return None;
    }
    Some(match std::str::from_utf8(record) {
        Ok(text) if record.is_ascii() => Cow::Borrowed(text),
        _ => Cow::Owned(record.iter().map(|&b| char::from(b)).collect()),
    })
}

/// Split a record into its comma-separated fields.
pub fn split_fields(record: &str) -> Vec<&str> {
    record.split(',').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_first_nul() {
        let buf = b"A,B,V210,C\0\x01\x02\x03";
        assert_eq!(leading_text(buf).as_deref(), Some("A,B,V210,C"));
        assert!(matches!(leading_text(buf), Some(Cow::Borrowed(_))));
    }

    #[test]
    fn whole_buffer_without_nul() {
        assert_eq!(leading_text(b"A,B,V100,C").as_deref(), Some("A,B,V100,C"));
    }

    #[test]
    fn empty_record_is_none() {
        assert_eq!(leading_text(b"\0A,B,C,D"), None);
        assert_eq!(leading_text(b""), None);
    }

    #[test]
    fn high_bytes_decode_as_latin1() {
        assert_eq!(
            leading_text(&[b'2', b'5', 0xB0, b'C', b',', 0xFF, 0]).as_deref(),
            Some("25\u{b0}C,\u{ff}")
        );
        // UTF-8 sequences are not reassembled.
        assert_eq!(leading_text("é".as_bytes()).as_deref(), Some("\u{c3}\u{a9}"));
    }

    #[test]
    fn split_keeps_empty_fields() {
        assert_eq!(split_fields("a,,c"), vec!["a", "", "c"]);
    }
}
