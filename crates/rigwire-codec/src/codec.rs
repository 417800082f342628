use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Message header: body length as a big-endian `u32`.
pub const HEADER_SIZE: usize = 4;

/// Default maximum body size: 10 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 10 * 1024 * 1024;

/// Encode a body length in network byte order.
pub fn encode_frame_header(length: u32) -> [u8; HEADER_SIZE] {
    length.to_be_bytes()
}

/// Decode a network-byte-order body length into a host integer.
pub fn decode_frame_header(header: [u8; HEADER_SIZE]) -> u32 {
    u32::from_be_bytes(header)
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────┬──────────────────────┐
/// │ Length (4B BE)   │ Body (Length bytes)  │
/// │ network order    │ UTF-8 JSON text      │
/// └──────────────────┴──────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let length = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&encode_frame_header(length));
    dst.put_slice(payload);
    Ok(())
}

/// Decode one message body from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// The size check runs as soon as the header is buffered, so an oversized
/// declaration fails before any of its body has to arrive.
/// On success, consumes the message bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = decode_frame_header(header) as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 10 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHUTDOWN: &[u8] = br#"{"type":"cmd","command":"shutdown","args":{}}"#;

    #[test]
    fn test_header_is_network_byte_order() {
        assert_eq!(encode_frame_header(0x0102_0304), [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(decode_frame_header([0x00, 0x00, 0x01, 0x00]), 256);
        assert_eq!(decode_frame_header(encode_frame_header(u32::MAX)), u32::MAX);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        encode_frame(SHUTDOWN, &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + SHUTDOWN.len());
        assert_eq!(&buf[..HEADER_SIZE], &(SHUTDOWN.len() as u32).to_be_bytes());

        let body = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();

        assert_eq!(body.as_ref(), SHUTDOWN);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_oversized_declaration_fails_on_header_alone() {
        let mut buf = BytesMut::new();
        buf.put_u32(11 * 1024 * 1024);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size, max })
                if size == 11 * 1024 * 1024 && max == DEFAULT_MAX_PAYLOAD
        ));
    }

    #[test]
    fn test_body_at_limit_is_accepted() {
        let mut buf = BytesMut::new();
        encode_frame(&[b'x'; 16], &mut buf).unwrap();

        let body = decode_frame(&mut buf, 16).unwrap().unwrap();
        assert_eq!(body.len(), 16);
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f1.as_ref(), b"first");

        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f2.as_ref(), b"second");

        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(b"", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0, 0, 0, 0]);

        let body = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert!(body.is_empty());
    }
}
