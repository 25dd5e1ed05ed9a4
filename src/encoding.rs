//! Text decoding for manifest and item entries.
//!
//! Packages are authored on machines with very different locales. Valid
//! UTF-8 is used as-is; otherwise Shift_JIS and then GBK are tried as strict
//! decoders, and as a last resort invalid sequences are replaced with `?`.

use std::borrow::Cow;

use encoding_rs::{GBK, SHIFT_JIS};

/// Decode raw entry bytes into text.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Cow::Borrowed(text);
    }

    for encoding in [SHIFT_JIS, GBK] {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return Cow::Owned(text.into_owned());
        }
    }

    Cow::Owned(sanitize_utf8(bytes))
}

fn sanitize_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\u{FFFD}', "?")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_is_borrowed() {
        let decoded = decode_text("{\"creator\":\"アクメ\"}".as_bytes());
        assert!(matches!(decoded, Cow::Borrowed(_)));
        assert_eq!(decoded, "{\"creator\":\"アクメ\"}");
    }

    #[test]
    fn test_bom_is_stripped() {
        assert_eq!(decode_text(b"\xEF\xBB\xBF{}"), "{}");
    }

    #[test]
    fn test_shift_jis_fallback() {
        let (encoded, _, had_errors) = SHIFT_JIS.encode("髪型セット");
        assert!(!had_errors);
        assert_eq!(decode_text(&encoded), "髪型セット");
    }

    #[test]
    fn test_gbk_fallback() {
        // C6 EB: a katakana byte followed by a dangling Shift_JIS lead byte.
        let (encoded, _, had_errors) = GBK.encode("齐");
        assert!(!had_errors);
        assert_eq!(decode_text(&encoded), "齐");
    }

    #[test]
    fn test_undecodable_bytes_are_sanitized() {
        let decoded = decode_text(&[b'a', 0xFF, 0xFF, b'b']);
        assert!(decoded.starts_with('a'));
        assert!(decoded.ends_with('b'));
        assert!(decoded.contains('?'));
    }
}
