//! Standard I/O transport.
//!
//! Frames are newline-delimited JSON on a paired stdin/stdout. Supports the
//! current process's stdio (servers), a spawned child's piped stdio
//! (clients), and raw stream pairs (tests). The reader tolerates and
//! discards diagnostic lines that fail to parse as frames, so subprocesses
//! that print startup banners do not break the connection; strict framing
//! can be requested via [`StdioConfig`].

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;
use weftmcp_protocol::Message;

use crate::error::{TransportError, TransportResult};
use crate::line::LineFramed;
use crate::traits::Transport;

/// Configuration for the stdio transport.
#[derive(Debug, Clone)]
pub struct StdioConfig {
    /// When true, a line that fails to decode as a frame terminates the
    /// inbound stream instead of being logged and skipped.
    pub strict_framing: bool,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            strict_framing: false,
        }
    }
}

/// Newline-delimited JSON transport over stdin/stdout.
#[derive(Debug)]
pub struct StdioTransport {
    inner: LineFramed,
}

impl StdioTransport {
    /// Create a transport over the current process's stdin/stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StdioConfig::default())
    }

    /// Create a transport over the current process's stdio with explicit
    /// configuration.
    #[must_use]
    pub fn with_config(config: StdioConfig) -> Self {
        Self {
            inner: LineFramed::start(tokio::io::stdin(), tokio::io::stdout(), config.strict_framing),
        }
    }

    /// Create a transport over a spawned child process's piped stdio.
    ///
    /// The child must have been spawned with `stdin(Stdio::piped())` and
    /// `stdout(Stdio::piped())`.
    ///
    /// # Errors
    ///
    /// Returns an error if the child's stdin or stdout was not piped.
    pub fn from_child(child: &mut Child) -> TransportResult<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Configuration(
                "child process stdin was not piped; spawn with Stdio::piped()".to_string(),
            )
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Configuration(
                "child process stdout was not piped; spawn with Stdio::piped()".to_string(),
            )
        })?;
        Ok(Self::from_raw(stdout, stdin, StdioConfig::default()))
    }

    /// Create a transport over raw async streams.
    ///
    /// `reader` is what we read frames from (a child's stdout); `writer` is
    /// what we write frames to (a child's stdin).
    pub fn from_raw<R, W>(reader: R, writer: W, config: StdioConfig) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        Self {
            inner: LineFramed::start(reader, writer, config.strict_framing),
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, message: Message) -> TransportResult<()> {
        self.inner.send(&message).await
    }

    async fn recv(&self) -> TransportResult<Option<Message>> {
        self.inner.recv().await
    }

    async fn close(&self) -> TransportResult<()> {
        self.inner.close().await
    }

    fn endpoint(&self) -> Option<String> {
        Some("stdio://".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weftmcp_protocol::RequestId;

    #[tokio::test]
    async fn frames_round_trip_over_duplex() {
        let (near_write, far_read) = tokio::io::duplex(4096);
        let (far_write, near_read) = tokio::io::duplex(4096);

        let near = StdioTransport::from_raw(near_read, near_write, StdioConfig::default());
        let far = StdioTransport::from_raw(far_read, far_write, StdioConfig::default());

        near.send(Message::request(RequestId::Num(1), "ping", None))
            .await
            .unwrap();
        let received = far.recv().await.unwrap().unwrap();
        assert_eq!(received.method(), Some("ping"));
        assert_eq!(received.request_id(), Some(&RequestId::Num(1)));
    }

    #[tokio::test]
    async fn banner_lines_are_skipped() {
        let (mut tx, read_half) = tokio::io::duplex(4096);
        let (write_half, _keep) = tokio::io::duplex(4096);
        let transport = StdioTransport::from_raw(read_half, write_half, StdioConfig::default());

        use tokio::io::AsyncWriteExt;
        tx.write_all(b"server v1.2 starting up...\n").await.unwrap();
        tx.write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .await
            .unwrap();

        let received = transport.recv().await.unwrap().unwrap();
        assert_eq!(received.method(), Some("notifications/initialized"));
    }

    #[tokio::test]
    async fn strict_framing_treats_banner_as_eof() {
        let (mut tx, read_half) = tokio::io::duplex(4096);
        let (write_half, _keep) = tokio::io::duplex(4096);
        let transport = StdioTransport::from_raw(
            read_half,
            write_half,
            StdioConfig {
                strict_framing: true,
            },
        );

        use tokio::io::AsyncWriteExt;
        tx.write_all(b"not json\n").await.unwrap();
        drop(tx);

        assert!(transport.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn peer_close_yields_eof() {
        let (tx, read_half) = tokio::io::duplex(4096);
        let (write_half, _keep) = tokio::io::duplex(4096);
        let transport = StdioTransport::from_raw(read_half, write_half, StdioConfig::default());

        drop(tx);
        assert!(transport.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (near_write, _far_read) = tokio::io::duplex(4096);
        let (_far_write, near_read) = tokio::io::duplex(4096);
        let transport = StdioTransport::from_raw(near_read, near_write, StdioConfig::default());

        transport.close().await.unwrap();
        transport.close().await.unwrap(); // idempotent
        let err = transport
            .send(Message::notification("ping", None))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }
}
