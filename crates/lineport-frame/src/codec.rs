use bytes::{BufMut, BytesMut};
use tracing::debug;

/// Inbound message delimiter: bare carriage return.
pub const DELIMITER: char = '\r';

/// Outbound line terminator.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Placeholder for bytes outside the ASCII range.
const ASCII_SUBSTITUTE: u8 = b'?';

/// Encode a message as an ASCII line into `dst`.
///
/// Characters outside the ASCII range are replaced with `?` and the line is
/// terminated with CR LF.
pub fn encode_line(msg: &str, dst: &mut BytesMut) {
    dst.reserve(msg.len() + LINE_TERMINATOR.len());
    let mut substituted = 0usize;
    for byte in msg.bytes() {
        if byte.is_ascii() {
            dst.put_u8(byte);
        } else {
            dst.put_u8(ASCII_SUBSTITUTE);
            substituted += 1;
        }
    }
    if substituted > 0 {
        debug!(substituted, "replaced non-ascii bytes in outbound line");
    }
    dst.put_slice(LINE_TERMINATOR);
}

/// Split a received buffer into message fragments.
///
/// The buffer is ASCII-decoded (non-ASCII bytes become `?`) and split on
/// bare CR. Every fragment is returned, including empty ones — the trailing
/// delimiter of a complete line always produces one empty fragment, and the
/// consumer discards noise via [`is_noise`]. Buffers are split independently;
/// a line straddling two reads arrives as two fragments.
pub fn split_fragments(buf: &[u8]) -> Vec<String> {
    let mut substituted = 0usize;
    let decoded: String = buf
        .iter()
        .map(|&b| {
            if b.is_ascii() {
                b as char
            } else {
                substituted += 1;
                ASCII_SUBSTITUTE as char
            }
        })
        .collect();
    if substituted > 0 {
        debug!(substituted, "replaced non-ascii bytes in received buffer");
    }

    decoded.split(DELIMITER).map(str::to_string).collect()
}

/// Returns true for framing artifacts the consumer must discard: the empty
/// fragment produced by a trailing delimiter, and a lone carriage return.
pub fn is_noise(fragment: &str) -> bool {
    fragment.is_empty() || fragment == "\r"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_appends_crlf() {
        let mut buf = BytesMut::new();
        encode_line("HELLO", &mut buf);
        assert_eq!(buf.as_ref(), b"HELLO\r\n");
    }

    #[test]
    fn encode_empty_message_is_bare_terminator() {
        let mut buf = BytesMut::new();
        encode_line("", &mut buf);
        assert_eq!(buf.as_ref(), b"\r\n");
    }

    #[test]
    fn encode_replaces_non_ascii() {
        let mut buf = BytesMut::new();
        encode_line("caf\u{e9}", &mut buf);
        // 'é' is two UTF-8 bytes, each substituted.
        assert_eq!(buf.as_ref(), b"caf??\r\n");
    }

    #[test]
    fn split_two_complete_lines() {
        let fragments = split_fragments(b"A\rB\r");
        assert_eq!(fragments, vec!["A", "B", ""]);
    }

    #[test]
    fn split_bare_delimiter_is_all_noise() {
        let fragments = split_fragments(b"\r");
        assert_eq!(fragments, vec!["", ""]);
        assert!(fragments.iter().all(|f| is_noise(f)));
    }

    #[test]
    fn split_without_delimiter_is_single_fragment() {
        let fragments = split_fragments(b"PARTIAL");
        assert_eq!(fragments, vec!["PARTIAL"]);
    }

    #[test]
    fn split_decodes_non_ascii_as_substitute() {
        let fragments = split_fragments(&[b'O', b'K', 0xFF, b'\r']);
        assert_eq!(fragments, vec!["OK?", ""]);
    }

    #[test]
    fn crlf_terminated_input_keeps_lf_on_next_fragment() {
        // CR LF framed input split on CR leaves the LF prefixed to the
        // following fragment; the protocol delimiter is bare CR.
        let fragments = split_fragments(b"A\r\nB\r");
        assert_eq!(fragments, vec!["A", "\nB", ""]);
    }

    #[test]
    fn noise_classification() {
        assert!(is_noise(""));
        assert!(is_noise("\r"));
        assert!(!is_noise("A"));
        assert!(!is_noise(" "));
    }
}
