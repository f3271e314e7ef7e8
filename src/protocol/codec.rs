//! Frame codec for the cast channel
//!
//! Frames the protobuf envelope with a 4-byte big-endian length prefix.

use bytes::{BufMut, BytesMut};
use prost::Message as _;
use thiserror::Error;

use super::CastMessage;

/// Length prefix size in bytes
pub const HEADER_SIZE: usize = 4;

/// Maximum envelope size the cast channel allows (64 KiB).
///
/// The length prefix itself is unbounded, so this is checked before any
/// receive buffer is allocated from an untrusted length.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {1})")]
    MessageTooLarge(usize, usize),

    #[error("Encode error: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Encode an envelope into its framed wire form.
pub fn encode_frame(message: &CastMessage, buf: &mut BytesMut) -> Result<(), CodecError> {
    let len = message.encoded_len();
    if len > MAX_MESSAGE_SIZE {
        return Err(CodecError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
    }

    buf.reserve(HEADER_SIZE + len);
    buf.put_u32(len as u32);
    message.encode(buf)?;
    Ok(())
}

/// Parse the 4-byte length prefix. Pure parse; bounds are the caller's job.
pub fn decode_header(header: [u8; HEADER_SIZE]) -> u32 {
    u32::from_be_bytes(header)
}

/// Decode an envelope from the body bytes of one frame.
pub fn decode_body(body: &[u8]) -> Result<CastMessage, CodecError> {
    Ok(CastMessage::decode(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DEFAULT_RECEIVER, NAMESPACE_HEARTBEAT};

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = CastMessage::utf8(
            NAMESPACE_HEARTBEAT,
            DEFAULT_RECEIVER,
            "{\"type\":\"PING\"}".to_string(),
        );

        let mut buf = BytesMut::new();
        encode_frame(&original, &mut buf).unwrap();

        let header: [u8; HEADER_SIZE] = buf[..HEADER_SIZE].try_into().unwrap();
        let len = decode_header(header) as usize;
        assert_eq!(len, buf.len() - HEADER_SIZE);

        let decoded = decode_body(&buf[HEADER_SIZE..]).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_header_is_big_endian_body_length() {
        let msg = CastMessage::utf8(NAMESPACE_HEARTBEAT, DEFAULT_RECEIVER, "{}".to_string());

        let mut buf = BytesMut::new();
        encode_frame(&msg, &mut buf).unwrap();

        let body_len = (buf.len() - HEADER_SIZE) as u32;
        assert_eq!(&buf[..HEADER_SIZE], body_len.to_be_bytes());
    }

    #[test]
    fn test_decode_header_pure_parse() {
        // No bound is applied at parse time, even for absurd lengths
        assert_eq!(decode_header([0xFF, 0xFF, 0xFF, 0xFF]), u32::MAX);
        assert_eq!(decode_header([0, 0, 0, 16]), 16);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let msg = CastMessage::utf8(
            NAMESPACE_HEARTBEAT,
            DEFAULT_RECEIVER,
            "x".repeat(MAX_MESSAGE_SIZE + 1),
        );

        let mut buf = BytesMut::new();
        let result = encode_frame(&msg, &mut buf);
        assert!(matches!(result, Err(CodecError::MessageTooLarge(_, _))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_binary_payload_roundtrip() {
        let original = crate::protocol::auth_challenge_message(DEFAULT_RECEIVER);

        let mut buf = BytesMut::new();
        encode_frame(&original, &mut buf).unwrap();

        let decoded = decode_body(&buf[HEADER_SIZE..]).unwrap();
        assert_eq!(decoded.namespace, original.namespace);
        assert_eq!(decoded.payload_binary, original.payload_binary);
    }
}
