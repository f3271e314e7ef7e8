//! TLS transport adapter
//!
//! Owns the secure session to the receiver. Cast devices present
//! self-signed certificates, so certificate and hostname verification are
//! disabled; trust policy belongs to the surrounding deployment, not this
//! channel.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_native_tls::TlsStream;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("Connection to {host}:{port} timed out")]
    ConnectTimeout { host: String, port: u16 },

    #[error("Cannot get local address: {0}")]
    LocalAddr(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream closed after {received} bytes of an incomplete read")]
    ClosedMidRead { received: usize },

    #[error("Transport is closed")]
    NotConnected,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Outcome of a deadline-bounded exact read.
///
/// `timed_out` with `bytes_read == 0` is the normal idle outcome used for
/// liveness checks. `timed_out` with a non-zero count means a frame
/// stalled mid-flight; the stranded bytes are not resumable.
#[derive(Debug, Clone, Copy)]
pub struct ReadOutcome {
    pub bytes_read: usize,
    pub timed_out: bool,
}

/// A connected session to a cast receiver, generic over the stream so
/// frame-level logic can be exercised without a live socket.
///
/// The session is held in an `Option` so `close` is idempotent and safe
/// after a failed or finished connection.
pub struct Transport<S> {
    stream: Option<S>,
    local_ip: IpAddr,
}

/// The production transport: TLS over TCP.
pub type TlsTransport = Transport<TlsStream<TcpStream>>;

impl TlsTransport {
    /// Connect to `host:port` and complete the TLS handshake.
    ///
    /// Each failure point surfaces its own error variant: TLS context
    /// creation, TCP connect (or its timeout), local-address query, and
    /// the handshake itself.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> TransportResult<Self> {
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()?;
        let connector = tokio_native_tls::TlsConnector::from(connector);

        let tcp = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(TransportError::Connect {
                    host: host.to_string(),
                    port,
                    source,
                });
            }
            Err(_) => {
                return Err(TransportError::ConnectTimeout {
                    host: host.to_string(),
                    port,
                });
            }
        };

        // The receiver fetches media back over HTTP, so the content URL
        // must name the address this socket is bound to.
        let local_ip = tcp.local_addr().map_err(TransportError::LocalAddr)?.ip();

        let stream = connector.connect(host, tcp).await?;

        tracing::debug!(host, port, %local_ip, "TLS session established");

        Ok(Transport::new(stream, local_ip))
    }
}

impl<S> Transport<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an established stream.
    pub fn new(stream: S, local_ip: IpAddr) -> Self {
        Self {
            stream: Some(stream),
            local_ip,
        }
    }

    /// The local address of the connected socket.
    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    /// Write the whole buffer. A short write surfaces as an error; the
    /// caller should treat the connection as unusable afterwards.
    pub async fn write_all(&mut self, buf: &[u8]) -> TransportResult<()> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream.write_all(buf).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Try to fill `buf` completely, waiting at most `deadline` in total.
    ///
    /// - Buffer filled: `timed_out = false`.
    /// - Deadline elapsed: `timed_out = true` with however many bytes
    ///   arrived (zero in the normal idle case).
    /// - Peer closed or I/O failed before the buffer filled: hard error.
    pub async fn read_exact_deadline(
        &mut self,
        buf: &mut [u8],
        deadline: Duration,
    ) -> TransportResult<ReadOutcome> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        read_exact_deadline_on(stream, buf, deadline).await
    }

    /// Shut the session down and release it. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::debug!("TLS shutdown: {e}");
            }
        }
    }

    /// Whether the session is still held.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Deadline-bounded exact read over any duplex stream.
///
/// Each wait is bounded by whatever is left of `deadline`; partial reads
/// accumulate until the buffer fills, the deadline elapses, or the stream
/// dies. A read of zero bytes means the peer closed, which is always a
/// hard error here: mid-frame it indicates the peer died, and even while
/// idle the channel is unusable afterwards.
async fn read_exact_deadline_on<S>(
    stream: &mut S,
    buf: &mut [u8],
    deadline: Duration,
) -> TransportResult<ReadOutcome>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let start = Instant::now();
    let mut received = 0;

    while received < buf.len() {
        let Some(remaining) = deadline.checked_sub(start.elapsed()) else {
            return Ok(ReadOutcome {
                bytes_read: received,
                timed_out: true,
            });
        };

        match tokio::time::timeout(remaining, stream.read(&mut buf[received..])).await {
            Ok(Ok(0)) => return Err(TransportError::ClosedMidRead { received }),
            Ok(Ok(n)) => received += n,
            Ok(Err(e)) => return Err(TransportError::Io(e)),
            Err(_) => {
                return Ok(ReadOutcome {
                    bytes_read: received,
                    timed_out: true,
                });
            }
        }
    }

    Ok(ReadOutcome {
        bytes_read: received,
        timed_out: false,
    })
}

impl<S> std::fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("open", &self.stream.is_some())
            .field("local_ip", &self.local_ip)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_deadline_times_out_with_zero_bytes() {
        let (mut near, _far) = tokio::io::duplex(64);

        let mut buf = [0u8; 4];
        let outcome = read_exact_deadline_on(&mut near, &mut buf, Duration::from_millis(20))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.bytes_read, 0);
    }

    #[tokio::test]
    async fn test_partial_then_stall_reports_partial_timeout() {
        let (mut near, mut far) = tokio::io::duplex(64);
        far.write_all(&[1, 2]).await.unwrap();

        let mut buf = [0u8; 4];
        let outcome = read_exact_deadline_on(&mut near, &mut buf, Duration::from_millis(20))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.bytes_read, 2);
        assert_eq!(&buf[..2], &[1, 2]);
    }

    #[tokio::test]
    async fn test_close_mid_read_is_hard_error() {
        let (mut near, mut far) = tokio::io::duplex(64);
        far.write_all(&[1, 2]).await.unwrap();
        drop(far);

        let mut buf = [0u8; 4];
        let result = read_exact_deadline_on(&mut near, &mut buf, Duration::from_secs(1)).await;

        assert!(matches!(
            result,
            Err(TransportError::ClosedMidRead { received: 2 })
        ));
    }

    #[tokio::test]
    async fn test_split_arrival_completes_within_deadline() {
        let (mut near, mut far) = tokio::io::duplex(64);

        let writer = tokio::spawn(async move {
            far.write_all(&[1, 2]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            far.write_all(&[3, 4]).await.unwrap();
            far
        });

        let mut buf = [0u8; 4];
        let outcome = read_exact_deadline_on(&mut near, &mut buf, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(!outcome.timed_out);
        assert_eq!(outcome.bytes_read, 4);
        assert_eq!(buf, [1, 2, 3, 4]);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_refused_is_distinct() {
        // Port 1 on localhost refuses immediately
        let result = TlsTransport::connect("127.0.0.1", 1, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_io() {
        let mut transport = Transport::<tokio::io::DuplexStream> {
            stream: None,
            local_ip: "127.0.0.1".parse().unwrap(),
        };

        assert!(!transport.is_open());
        assert!(matches!(
            transport.write_all(b"x").await,
            Err(TransportError::NotConnected)
        ));

        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.read_exact_deadline(&mut buf, Duration::from_millis(1)).await,
            Err(TransportError::NotConnected)
        ));

        // close is safe on a never-opened transport, repeatedly
        transport.close().await;
        transport.close().await;
    }
}
