//! Text armor for envelopes and sealed files.
//!
//! Standard base64, broken into 64-character lines joined with CRLF. The
//! armored form always ends in a CRLF. Decoding ignores all ASCII whitespace,
//! so LF-only or unwrapped input is accepted too.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Column width of armored output.
pub const LINE_WIDTH: usize = 64;

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Break `encoded` into [`LINE_WIDTH`] lines separated by CRLF. No trailing
/// line break is added.
pub fn wrap64(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH * 2);
    let mut rest = encoded;
    while rest.len() > LINE_WIDTH {
        // base64 output is ASCII, so any index is a char boundary
        let (line, tail) = rest.split_at(LINE_WIDTH);
        out.push_str(line);
        out.push_str("\r\n");
        rest = tail;
    }
    out.push_str(rest);
    out
}

/// Base64, wrapped at 64 columns, terminated by CRLF.
pub fn armor(bytes: &[u8]) -> String {
    let mut out = wrap64(&encode(bytes));
    out.push_str("\r\n");
    out
}

/// Decode armored text. Every ASCII whitespace byte is dropped first.
pub fn decode(text: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_at_64_columns() {
        let data = vec![0xABu8; 100];
        let text = armor(&data);
        assert!(text.ends_with("\r\n"));

        let lines: Vec<&str> = text.trim_end_matches("\r\n").split("\r\n").collect();
        // 100 bytes -> 136 base64 chars -> 64 + 64 + 8
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 64);
        assert_eq!(lines[1].len(), 64);
        assert_eq!(lines[2].len(), 8);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_line() {
        // 48 bytes -> exactly 64 chars
        let text = armor(&[1u8; 48]);
        assert_eq!(text.len(), 66);
        assert!(!text.contains("\r\n\r\n"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(armor(&[]), "\r\n");
        assert_eq!(decode(b"\r\n").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_ignores_whitespace() {
        let data: Vec<u8> = (0u8..=200).collect();
        let crlf = armor(&data);
        let lf = crlf.replace("\r\n", "\n");
        let messy = format!("  \t{}\n\n", lf.replace('\n', " \n "));

        assert_eq!(decode(crlf.as_bytes()).unwrap(), data);
        assert_eq!(decode(lf.as_bytes()).unwrap(), data);
        assert_eq!(decode(messy.as_bytes()).unwrap(), data);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"not*base64!").is_err());
    }
}
