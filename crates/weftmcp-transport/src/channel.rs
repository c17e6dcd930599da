//! In-process channel transport.
//!
//! Moves frames over a pair of `mpsc` channels with no serialization at
//! all. The HTTP server multiplexer uses one side of a pair to bind each
//! accepted connection to its session; tests use both sides to wire two
//! sessions directly together.

use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as TokioMutex};
use weftmcp_protocol::Message;

use crate::error::{TransportError, TransportResult};
use crate::traits::Transport;

/// Default channel capacity for [`ChannelTransport::pair`].
const DEFAULT_CAPACITY: usize = 64;

/// A frame transport over in-process channels.
pub struct ChannelTransport {
    incoming: TokioMutex<mpsc::Receiver<Message>>,
    outgoing: StdMutex<Option<mpsc::Sender<Message>>>,
}

impl ChannelTransport {
    /// Build a transport from an inbound receiver and an outbound sender.
    pub fn new(incoming: mpsc::Receiver<Message>, outgoing: mpsc::Sender<Message>) -> Self {
        Self {
            incoming: TokioMutex::new(incoming),
            outgoing: StdMutex::new(Some(outgoing)),
        }
    }

    /// Build a cross-connected transport pair.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::channel(DEFAULT_CAPACITY);
        let (b_tx, b_rx) = mpsc::channel(DEFAULT_CAPACITY);
        (Self::new(a_rx, b_tx), Self::new(b_rx, a_tx))
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: Message) -> TransportResult<()> {
        let sender = self
            .outgoing
            .lock()
            .expect("outgoing mutex poisoned")
            .clone()
            .ok_or(TransportError::ConnectionClosed)?;
        sender
            .send(message)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> TransportResult<Option<Message>> {
        let mut incoming = self.incoming.lock().await;
        Ok(incoming.recv().await)
    }

    async fn close(&self) -> TransportResult<()> {
        // Dropping our sender lets the peer's recv observe EOF.
        self.outgoing
            .lock()
            .expect("outgoing mutex poisoned")
            .take();
        Ok(())
    }

    fn endpoint(&self) -> Option<String> {
        Some("channel://".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weftmcp_protocol::RequestId;

    #[tokio::test]
    async fn pair_is_cross_connected() {
        let (a, b) = ChannelTransport::pair();
        a.send(Message::request(RequestId::Num(1), "ping", None))
            .await
            .unwrap();
        assert_eq!(b.recv().await.unwrap().unwrap().method(), Some("ping"));

        b.send(Message::notification("notifications/initialized", None))
            .await
            .unwrap();
        assert!(a.recv().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn close_propagates_eof_to_peer() {
        let (a, b) = ChannelTransport::pair();
        a.close().await.unwrap();
        a.close().await.unwrap(); // idempotent
        assert!(b.recv().await.unwrap().is_none());
        assert!(matches!(
            a.send(Message::notification("ping", None)).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
