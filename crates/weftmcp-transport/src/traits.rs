//! The core transport contract.

use async_trait::async_trait;
use weftmcp_protocol::Message;

use crate::error::TransportResult;

/// A bidirectional frame mover beneath a session.
///
/// Implementations apply the wire framing (newline-delimited JSON, SSE
/// events, HTTP bodies) internally; frames cross this trait already decoded.
/// All methods take `&self`: transports use interior mutability so that a
/// session's reader and writer tasks can share one instance.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send one frame. May suspend under backpressure. Fails with
    /// [`crate::TransportError::ConnectionClosed`] once the transport is
    /// closed.
    async fn send(&self, message: Message) -> TransportResult<()>;

    /// Receive the next inbound frame.
    ///
    /// Returns `Ok(None)` exactly when the peer has closed the connection
    /// in an orderly fashion and all buffered frames have been drained.
    async fn recv(&self) -> TransportResult<Option<Message>>;

    /// Close the transport, releasing underlying OS resources.
    ///
    /// Idempotent: closing an already-closed transport is a no-op.
    async fn close(&self) -> TransportResult<()>;

    /// Endpoint address or identifier, for diagnostics.
    fn endpoint(&self) -> Option<String> {
        None
    }
}
