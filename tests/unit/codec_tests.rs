//! Unit tests for `KernelCodec` framing.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use agentic_coder::kernel::codec::{KernelCodec, MAX_LINE_BYTES};

#[test]
fn decodes_complete_lines_only() {
    let mut codec = KernelCodec::new();
    let mut buf = BytesMut::from("first\nsec");

    assert_eq!(codec.decode(&mut buf).expect("decode"), Some("first".into()));
    assert_eq!(codec.decode(&mut buf).expect("decode"), None);

    buf.extend_from_slice(b"ond\n");
    assert_eq!(codec.decode(&mut buf).expect("decode"), Some("second".into()));
}

#[test]
fn strips_carriage_return() {
    let mut codec = KernelCodec::new();
    let mut buf = BytesMut::from("line\r\n");

    assert_eq!(codec.decode(&mut buf).expect("decode"), Some("line".into()));
}

#[test]
fn decode_eof_flushes_trailing_partial_line() {
    let mut codec = KernelCodec::new();
    let mut buf = BytesMut::from("tail");

    assert_eq!(codec.decode_eof(&mut buf).expect("decode"), Some("tail".into()));
}

/// An oversized line is a protocol error and the next line still decodes.
#[test]
fn oversized_line_is_protocol_error_then_recovers() {
    let mut codec = KernelCodec::with_max_length(8);
    let mut buf = BytesMut::from("0123456789abcdef\nok\n");

    let err = codec.decode(&mut buf).expect_err("line too long");
    assert!(err.to_string().starts_with("protocol: line too long"));

    let mut recovered = None;
    for _ in 0..4 {
        match codec.decode(&mut buf) {
            Ok(Some(line)) => {
                recovered = Some(line);
                break;
            }
            Ok(None) | Err(_) => {}
        }
    }
    assert_eq!(recovered.as_deref(), Some("ok"));
}

#[test]
fn encode_appends_newline() {
    let mut codec = KernelCodec::default();
    let mut buf = BytesMut::new();

    codec
        .encode(r#"{"kind":"ping","id":"1"}"#.to_owned(), &mut buf)
        .expect("encode");

    assert_eq!(&buf[..], b"{\"kind\":\"ping\",\"id\":\"1\"}\n");
}

#[test]
fn default_limit_is_sixteen_mebibytes() {
    assert_eq!(MAX_LINE_BYTES, 16 * 1024 * 1024);
}
