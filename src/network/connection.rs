//! Cast channel connection
//!
//! Composes the TLS transport, the frame codec, and the command payload
//! builders into one connection object. Sends are fire-and-forget;
//! request/response correlation by request id and the ping/pong liveness
//! policy are the caller's job.

use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;

use super::transport::{TlsTransport, Transport, TransportError};
use crate::media::MediaInformation;
use crate::protocol::{
    self, auth_challenge_message, CastMessage, CodecError, RequestIds,
    DEFAULT_RECEIVER, HEADER_SIZE, MAX_MESSAGE_SIZE, NAMESPACE_CONNECTION, NAMESPACE_HEARTBEAT,
    NAMESPACE_MEDIA, NAMESPACE_RECEIVER,
};

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Media messages require a destination id")]
    EmptyDestination,

    #[error("Media session id 0 is not a valid session")]
    InvalidMediaSession,
}

pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// One cast channel to a receiver.
///
/// Owns the session and the two request-id counters, so separate
/// connections never share a sequence. Generic over the stream; the
/// default is the production TLS session.
pub struct Connection<S = TlsStream<TcpStream>> {
    transport: Transport<S>,
    request_ids: RequestIds,
}

impl Connection {
    /// Open a channel to `host:port`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> ConnectionResult<Self> {
        let transport = TlsTransport::connect(host, port, timeout).await?;
        Ok(Self {
            transport,
            request_ids: RequestIds::new(),
        })
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// The local address the receiver can fetch media back from.
    pub fn local_ip(&self) -> std::net::IpAddr {
        self.transport.local_ip()
    }

    /// Build an envelope and write its frame. Any failure here leaves the
    /// channel in an unknown state; callers should tear it down.
    async fn send(&mut self, message: CastMessage) -> ConnectionResult<()> {
        tracing::debug!(
            namespace = %message.namespace,
            destination = %message.destination_id,
            payload = message.payload_utf8.as_deref().unwrap_or("<binary>"),
            "send"
        );

        let mut buf = BytesMut::new();
        protocol::encode_frame(&message, &mut buf)?;
        self.transport.write_all(&buf).await?;
        Ok(())
    }

    async fn push_media_message(
        &mut self,
        destination_id: &str,
        body: String,
    ) -> ConnectionResult<()> {
        self.send(CastMessage::utf8(NAMESPACE_MEDIA, destination_id, body))
            .await
    }

    /// Receive one frame within `deadline`.
    ///
    /// Returns `Ok(None)` when nothing arrived in time; that is the
    /// expected idle outcome the caller's liveness logic keys off. Header
    /// and body are two independent bounded waits, each given the full
    /// deadline. A timeout that strands partial bytes discards them; the
    /// caller should treat the channel as desynchronized.
    pub async fn receive(&mut self, deadline: Duration) -> ConnectionResult<Option<CastMessage>> {
        let mut header = [0u8; HEADER_SIZE];
        let outcome = self.transport.read_exact_deadline(&mut header, deadline).await?;
        if outcome.timed_out {
            if outcome.bytes_read > 0 {
                tracing::warn!(
                    bytes = outcome.bytes_read,
                    "discarding truncated frame header after timeout"
                );
            }
            return Ok(None);
        }

        let len = protocol::decode_header(header) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge(len, MAX_MESSAGE_SIZE).into());
        }

        let mut body = vec![0u8; len];
        let outcome = self.transport.read_exact_deadline(&mut body, deadline).await?;
        if outcome.timed_out {
            tracing::warn!(
                bytes = outcome.bytes_read,
                expected = len,
                "discarding truncated frame body after timeout"
            );
            return Ok(None);
        }

        let message = protocol::decode_body(&body)?;
        tracing::debug!(
            namespace = %message.namespace,
            source = %message.source_id,
            payload = message.payload_utf8.as_deref().unwrap_or("<binary>"),
            "recv"
        );
        Ok(Some(message))
    }

    /// Close the channel. Idempotent.
    pub async fn close(&mut self) {
        self.transport.close().await;
    }

    // ------------------------------------------------------------------
    // Command builders
    // ------------------------------------------------------------------

    /// Send the device-auth challenge. First message on a fresh channel.
    pub async fn auth(&mut self) -> ConnectionResult<()> {
        self.send(auth_challenge_message(DEFAULT_RECEIVER)).await
    }

    pub async fn ping(&mut self) -> ConnectionResult<()> {
        self.send(CastMessage::utf8(
            NAMESPACE_HEARTBEAT,
            DEFAULT_RECEIVER,
            protocol::PING.to_string(),
        ))
        .await
    }

    pub async fn pong(&mut self) -> ConnectionResult<()> {
        self.send(CastMessage::utf8(
            NAMESPACE_HEARTBEAT,
            DEFAULT_RECEIVER,
            protocol::PONG.to_string(),
        ))
        .await
    }

    /// Open a virtual connection to a destination (the receiver itself or
    /// a running app's transport id).
    pub async fn connect_destination(&mut self, destination_id: &str) -> ConnectionResult<()> {
        self.send(CastMessage::utf8(
            NAMESPACE_CONNECTION,
            destination_id,
            protocol::CONNECT.to_string(),
        ))
        .await
    }

    /// Close a virtual connection.
    pub async fn close_destination(&mut self, destination_id: &str) -> ConnectionResult<()> {
        self.send(CastMessage::utf8(
            NAMESPACE_CONNECTION,
            destination_id,
            protocol::CLOSE.to_string(),
        ))
        .await
    }

    pub async fn receiver_get_status(&mut self) -> ConnectionResult<()> {
        let body = protocol::receiver_get_status(&mut self.request_ids);
        self.send(CastMessage::utf8(NAMESPACE_RECEIVER, DEFAULT_RECEIVER, body))
            .await
    }

    pub async fn launch(&mut self, app_id: &str) -> ConnectionResult<()> {
        let body = protocol::launch(app_id, &mut self.request_ids);
        self.send(CastMessage::utf8(NAMESPACE_RECEIVER, DEFAULT_RECEIVER, body))
            .await
    }

    pub async fn player_get_status(&mut self, destination_id: &str) -> ConnectionResult<()> {
        validate_destination(destination_id)?;
        let body = protocol::player_get_status(&mut self.request_ids);
        self.push_media_message(destination_id, body).await
    }

    pub async fn load(
        &mut self,
        destination_id: &str,
        media: &MediaInformation,
    ) -> ConnectionResult<()> {
        validate_destination(destination_id)?;
        let body = protocol::load(media, &mut self.request_ids);
        self.push_media_message(destination_id, body).await
    }

    pub async fn play(
        &mut self,
        destination_id: &str,
        media_session_id: i64,
    ) -> ConnectionResult<()> {
        validate_media_target(destination_id, media_session_id)?;
        let body = protocol::play(media_session_id, &mut self.request_ids);
        self.push_media_message(destination_id, body).await
    }

    pub async fn stop(
        &mut self,
        destination_id: &str,
        media_session_id: i64,
    ) -> ConnectionResult<()> {
        validate_media_target(destination_id, media_session_id)?;
        let body = protocol::stop(media_session_id, &mut self.request_ids);
        self.push_media_message(destination_id, body).await
    }

    pub async fn pause(
        &mut self,
        destination_id: &str,
        media_session_id: i64,
    ) -> ConnectionResult<()> {
        validate_media_target(destination_id, media_session_id)?;
        let body = protocol::pause(media_session_id, &mut self.request_ids);
        self.push_media_message(destination_id, body).await
    }

    /// Set the stream volume. Levels outside `[0.0, 1.0]` are dropped
    /// without sending anything.
    pub async fn set_volume(
        &mut self,
        destination_id: &str,
        media_session_id: i64,
        level: f64,
        muted: bool,
    ) -> ConnectionResult<()> {
        validate_media_target(destination_id, media_session_id)?;

        let Some(body) = protocol::set_volume(level, muted, media_session_id, &mut self.request_ids)
        else {
            tracing::debug!(level, "volume out of range, dropping SET_VOLUME");
            return Ok(());
        };
        self.push_media_message(destination_id, body).await
    }

    /// Seek the stream. Non-finite positions are dropped without sending
    /// anything.
    pub async fn seek(
        &mut self,
        destination_id: &str,
        media_session_id: i64,
        current_time: f64,
    ) -> ConnectionResult<()> {
        validate_media_target(destination_id, media_session_id)?;

        let Some(body) = protocol::seek(current_time, media_session_id, &mut self.request_ids)
        else {
            tracing::debug!(current_time, "non-finite seek position, dropping SEEK");
            return Ok(());
        };
        self.push_media_message(destination_id, body).await
    }
}

fn validate_destination(destination_id: &str) -> ConnectionResult<()> {
    if destination_id.is_empty() {
        return Err(ConnectionError::EmptyDestination);
    }
    Ok(())
}

fn validate_media_target(destination_id: &str, media_session_id: i64) -> ConnectionResult<()> {
    validate_destination(destination_id)?;
    if media_session_id == 0 {
        return Err(ConnectionError::InvalidMediaSession);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PayloadType, PING};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn over_duplex() -> (Connection<DuplexStream>, DuplexStream) {
        let (near, far) = tokio::io::duplex(MAX_MESSAGE_SIZE + 64);
        let conn = Connection {
            transport: Transport::new(near, "127.0.0.1".parse().unwrap()),
            request_ids: RequestIds::new(),
        };
        (conn, far)
    }

    async fn read_frame(far: &mut DuplexStream) -> CastMessage {
        let mut header = [0u8; HEADER_SIZE];
        far.read_exact(&mut header).await.unwrap();

        let mut body = vec![0u8; protocol::decode_header(header) as usize];
        far.read_exact(&mut body).await.unwrap();
        protocol::decode_body(&body).unwrap()
    }

    #[tokio::test]
    async fn test_idle_receive_yields_none() {
        let (mut conn, _far) = over_duplex();
        let frame = conn.receive(Duration::from_millis(20)).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_truncated_header_timeout_yields_none() {
        let (mut conn, mut far) = over_duplex();
        far.write_all(&[0, 0]).await.unwrap();

        let frame = conn.receive(Duration::from_millis(20)).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_is_rejected() {
        let (mut conn, mut far) = over_duplex();
        let len = (MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes();
        far.write_all(&len).await.unwrap();

        let result = conn.receive(Duration::from_millis(50)).await;
        assert!(matches!(
            result,
            Err(ConnectionError::Codec(CodecError::MessageTooLarge(_, _)))
        ));
    }

    #[tokio::test]
    async fn test_receive_decodes_full_frame() {
        let (mut conn, mut far) = over_duplex();

        let msg = CastMessage::utf8(NAMESPACE_HEARTBEAT, DEFAULT_RECEIVER, PING.to_string());
        let mut buf = BytesMut::new();
        protocol::encode_frame(&msg, &mut buf).unwrap();
        far.write_all(&buf).await.unwrap();

        let frame = conn
            .receive(Duration::from_millis(100))
            .await
            .unwrap()
            .expect("frame");
        assert_eq!(frame.namespace, NAMESPACE_HEARTBEAT);
        assert_eq!(frame.payload_utf8.as_deref(), Some(PING));
    }

    #[tokio::test]
    async fn test_media_commands_target_the_app_session() {
        let (mut conn, mut far) = over_duplex();

        let media = MediaInformation::new("192.168.1.10", 8010, "video/mp4", None);
        conn.load("app-session-1", &media).await.unwrap();
        conn.play("app-session-1", 42).await.unwrap();
        conn.pause("app-session-1", 42).await.unwrap();
        conn.stop("app-session-1", 42).await.unwrap();
        conn.seek("app-session-1", 42, 12.5).await.unwrap();
        conn.player_get_status("app-session-1").await.unwrap();

        for expected in ["LOAD", "PLAY", "PAUSE", "STOP", "SEEK", "GET_STATUS"] {
            let frame = read_frame(&mut far).await;
            assert_eq!(frame.namespace, NAMESPACE_MEDIA);
            assert_eq!(frame.destination_id, "app-session-1");

            let payload = frame.payload_utf8.expect("json payload");
            assert!(
                payload.contains(&format!("\"type\":\"{expected}\"")),
                "payload: {payload}"
            );
        }
    }

    #[tokio::test]
    async fn test_out_of_range_volume_sends_nothing() {
        let (mut conn, mut far) = over_duplex();

        conn.set_volume("app-session-1", 42, 1.5, false).await.unwrap();
        conn.set_volume("app-session-1", 42, 0.5, false).await.unwrap();

        // Only the in-range SET_VOLUME hits the wire, and it holds the
        // first media request id.
        let frame = read_frame(&mut far).await;
        let payload = frame.payload_utf8.expect("json payload");
        assert!(payload.contains("\"level\":0.5"), "payload: {payload}");
        assert!(payload.contains("\"requestId\":0"), "payload: {payload}");
    }

    #[tokio::test]
    async fn test_non_finite_seek_sends_nothing() {
        let (mut conn, mut far) = over_duplex();

        conn.seek("app-session-1", 42, f64::NAN).await.unwrap();
        conn.seek("app-session-1", 42, 7.0).await.unwrap();

        let frame = read_frame(&mut far).await;
        let payload = frame.payload_utf8.expect("json payload");
        assert!(payload.contains("\"currentTime\":7.0"), "payload: {payload}");
        assert!(payload.contains("\"requestId\":0"), "payload: {payload}");
    }

    #[test]
    fn test_media_target_validation() {
        assert!(validate_media_target("app-session-1", 42).is_ok());

        assert!(matches!(
            validate_media_target("", 42),
            Err(ConnectionError::EmptyDestination)
        ));
        assert!(matches!(
            validate_media_target("app-session-1", 0),
            Err(ConnectionError::InvalidMediaSession)
        ));
    }

    #[test]
    fn test_destination_validation() {
        assert!(validate_destination("receiver-0").is_ok());
        assert!(matches!(
            validate_destination(""),
            Err(ConnectionError::EmptyDestination)
        ));
    }

    #[test]
    fn test_payload_type_matches_representation() {
        let text = CastMessage::utf8(NAMESPACE_HEARTBEAT, DEFAULT_RECEIVER, "{}".into());
        assert_eq!(text.payload_type, PayloadType::String as i32);
        assert!(text.payload_utf8.is_some() && text.payload_binary.is_none());

        let auth = auth_challenge_message(DEFAULT_RECEIVER);
        assert_eq!(auth.payload_type, PayloadType::Binary as i32);
        assert!(auth.payload_binary.is_some() && auth.payload_utf8.is_none());
    }
}
