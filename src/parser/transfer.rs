//! Content-Transfer-Encoding decoding for part bodies.
//!
//! Used for text parts, whose decoded bytes `mail-parser` only exposes after
//! converting them to UTF-8. Attachments must reach the disk byte for byte.

use base64::Engine;

use crate::parser::header::LENIENT_BASE64;

/// Undo the transfer encoding of a raw part body.
///
/// `None` means the body could not be decoded. Unknown encodings and the
/// identity encodings (`7bit`, `8bit`, `binary`) return the body unchanged.
pub fn decode(encoding: Option<&str>, body: &[u8]) -> Option<Vec<u8>> {
    let encoding = encoding.map(str::trim).unwrap_or("7bit");
    if encoding.eq_ignore_ascii_case("base64") {
        decode_base64(body)
    } else if encoding.eq_ignore_ascii_case("quoted-printable") {
        Some(decode_quoted_printable(body))
    } else {
        Some(body.to_vec())
    }
}

/// Base64 with line breaks and stray whitespace removed.
pub fn decode_base64(body: &[u8]) -> Option<Vec<u8>> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    LENIENT_BASE64.decode(compact).ok()
}

/// Quoted-printable (RFC 2045 §6.7).
///
/// Soft line breaks are removed, `=XX` becomes the byte `XX`, and a `=`
/// that starts neither is kept literally.
pub fn decode_quoted_printable(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if body[i] != b'=' {
            out.push(body[i]);
            i += 1;
            continue;
        }

        // Soft break: "=", optional trailing blanks, then CRLF or LF
        let mut j = i + 1;
        while j < body.len() && matches!(body[j], b' ' | b'\t') {
            j += 1;
        }
        if body[j..].starts_with(b"\r\n") {
            i = j + 2;
            continue;
        }
        if body[j..].starts_with(b"\n") {
            i = j + 1;
            continue;
        }
        if j == body.len() {
            // "=" at the very end of the body
            i = j;
            continue;
        }

        match body.get(i + 1..i + 3).and_then(hex_byte) {
            Some(byte) => {
                out.push(byte);
                i += 3;
            }
            None => {
                out.push(b'=');
                i += 1;
            }
        }
    }
    out
}

fn hex_byte(pair: &[u8]) -> Option<u8> {
    let hex = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_across_lines() {
        assert_eq!(
            decode(Some("base64"), b"Y2Fm6Tsx\r\nCg==\r\n").unwrap(),
            b"caf\xe9;1\n"
        );
    }

    #[test]
    fn test_base64_binary_bytes() {
        assert_eq!(decode(Some("BASE64"), b"//4AAQ==").unwrap(), [255, 254, 0, 1]);
    }

    #[test]
    fn test_base64_garbage_is_none() {
        assert!(decode(Some("base64"), b"not*base64!").is_none());
    }

    #[test]
    fn test_quoted_printable_keeps_raw_bytes() {
        assert_eq!(
            decode(Some("quoted-printable"), b"caf=E9 =\r\nlatte\r\nx=3Dy").unwrap(),
            b"caf\xe9 latte\r\nx=y"
        );
    }

    #[test]
    fn test_quoted_printable_soft_break_variants() {
        assert_eq!(decode_quoted_printable(b"a= \t\nb=\nc="), b"abc");
    }

    #[test]
    fn test_quoted_printable_stray_equals() {
        assert_eq!(decode_quoted_printable(b"1 =G 2 =4"), b"1 =G 2 =4");
    }

    #[test]
    fn test_identity_encodings() {
        let body = b"\xff\xfe raw";
        assert_eq!(decode(None, body).unwrap(), body);
        assert_eq!(decode(Some("8bit"), body).unwrap(), body);
        assert_eq!(decode(Some("x-unknown"), body).unwrap(), body);
    }
}
