//! Protocol module - Defines the Cast V2 wire protocol
//!
//! A cast channel carries length-prefixed protobuf envelopes:
//! - 4 bytes payload length (big-endian)
//! - Variable length `CastMessage` protobuf
//!
//! Envelope payloads are UTF-8 JSON for every namespace except device
//! authentication, which uses a nested protobuf carried as bytes.

mod codec;
mod message;
mod payload;

pub use codec::*;
pub use message::*;
pub use payload::*;

/// Default port a cast receiver listens on for the control channel
pub const DEFAULT_PORT: u16 = 8009;

/// Well-known destination for receiver-level messages
pub const DEFAULT_RECEIVER: &str = "receiver-0";

/// Source id stamped on every outbound envelope
pub const SENDER_ID: &str = "sender-castlink";

/// Application id of the Default Media Receiver
pub const APP_ID: &str = "CC1AD845";

/// Device authentication namespace (binary payloads)
pub const NAMESPACE_DEVICEAUTH: &str = "urn:x-cast:com.google.cast.tp.deviceauth";

/// Heartbeat namespace (PING/PONG)
pub const NAMESPACE_HEARTBEAT: &str = "urn:x-cast:com.google.cast.tp.heartbeat";

/// Virtual connection namespace (CONNECT/CLOSE)
pub const NAMESPACE_CONNECTION: &str = "urn:x-cast:com.google.cast.tp.connection";

/// Receiver control namespace (GET_STATUS/LAUNCH)
pub const NAMESPACE_RECEIVER: &str = "urn:x-cast:com.google.cast.receiver";

/// Media player namespace (LOAD/PLAY/PAUSE/...)
pub const NAMESPACE_MEDIA: &str = "urn:x-cast:com.google.cast.media";
