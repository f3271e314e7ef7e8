//! Cast channel envelope types
//!
//! Hand-defined to match the `cast_channel.proto` schema used by cast
//! receivers; field tags must not change.

use prost::Message as _;

use super::{NAMESPACE_DEVICEAUTH, SENDER_ID};

/// Cast channel protocol revision. `CASTV2_1_0` is the only revision
/// deployed receivers speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum ProtocolVersion {
    Castv210 = 0,
}

/// How the envelope payload is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum PayloadType {
    /// UTF-8 JSON in `payload_utf8`
    String = 0,
    /// Opaque bytes in `payload_binary` (device auth only)
    Binary = 1,
}

/// One envelope on the cast channel.
///
/// Exactly one of `payload_utf8` / `payload_binary` is populated,
/// matching `payload_type`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CastMessage {
    #[prost(enumeration = "ProtocolVersion", required, tag = "1")]
    pub protocol_version: i32,
    #[prost(string, required, tag = "2")]
    pub source_id: String,
    #[prost(string, required, tag = "3")]
    pub destination_id: String,
    #[prost(string, required, tag = "4")]
    pub namespace: String,
    #[prost(enumeration = "PayloadType", required, tag = "5")]
    pub payload_type: i32,
    #[prost(string, optional, tag = "6")]
    pub payload_utf8: Option<String>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub payload_binary: Option<Vec<u8>>,
}

impl CastMessage {
    /// Build an envelope carrying a UTF-8 JSON payload.
    pub fn utf8(namespace: &str, destination_id: &str, payload: String) -> Self {
        Self {
            protocol_version: ProtocolVersion::Castv210 as i32,
            source_id: SENDER_ID.to_string(),
            destination_id: destination_id.to_string(),
            namespace: namespace.to_string(),
            payload_type: PayloadType::String as i32,
            payload_utf8: Some(payload),
            payload_binary: None,
        }
    }

    /// Build an envelope carrying an opaque binary payload.
    pub fn binary(namespace: &str, destination_id: &str, payload: Vec<u8>) -> Self {
        Self {
            protocol_version: ProtocolVersion::Castv210 as i32,
            source_id: SENDER_ID.to_string(),
            destination_id: destination_id.to_string(),
            namespace: namespace.to_string(),
            payload_type: PayloadType::Binary as i32,
            payload_utf8: None,
            payload_binary: Some(payload),
        }
    }
}

/// Empty challenge inside the auth handshake.
#[derive(Clone, PartialEq, prost::Message)]
pub struct AuthChallenge {}

/// Device authentication handshake message. A sender only ever fills in
/// the challenge; the response and error arms belong to the receiver.
#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceAuthMessage {
    #[prost(message, optional, tag = "1")]
    pub challenge: Option<AuthChallenge>,
}

/// Build the auth-challenge envelope sent once at connection start.
pub fn auth_challenge_message(destination_id: &str) -> CastMessage {
    let auth = DeviceAuthMessage {
        challenge: Some(AuthChallenge {}),
    };
    CastMessage::binary(NAMESPACE_DEVICEAUTH, destination_id, auth.encode_to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DEFAULT_RECEIVER;

    #[test]
    fn test_utf8_envelope_fields() {
        let msg = CastMessage::utf8("urn:x-cast:test", "receiver-0", "{}".to_string());
        assert_eq!(msg.protocol_version, ProtocolVersion::Castv210 as i32);
        assert_eq!(msg.source_id, SENDER_ID);
        assert_eq!(msg.payload_type, PayloadType::String as i32);
        assert_eq!(msg.payload_utf8.as_deref(), Some("{}"));
        assert!(msg.payload_binary.is_none());
    }

    #[test]
    fn test_binary_envelope_fields() {
        let msg = CastMessage::binary("urn:x-cast:test", "receiver-0", vec![1, 2, 3]);
        assert_eq!(msg.payload_type, PayloadType::Binary as i32);
        assert!(msg.payload_utf8.is_none());
        assert_eq!(msg.payload_binary.as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_auth_challenge_roundtrip() {
        let msg = auth_challenge_message(DEFAULT_RECEIVER);
        assert_eq!(msg.namespace, NAMESPACE_DEVICEAUTH);
        assert_eq!(msg.destination_id, DEFAULT_RECEIVER);

        let bytes = msg.payload_binary.expect("binary payload");
        let auth = DeviceAuthMessage::decode(&bytes[..]).unwrap();
        assert!(auth.challenge.is_some());
    }
}
