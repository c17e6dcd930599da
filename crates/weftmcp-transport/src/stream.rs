//! Duplex stream transport.
//!
//! The stdio framing over arbitrary supplied byte streams: TCP sockets,
//! Unix sockets, in-memory duplex pairs. One compact JSON frame per
//! `\n`-terminated line.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use weftmcp_protocol::Message;

use crate::error::TransportResult;
use crate::line::LineFramed;
use crate::traits::Transport;

/// Newline-delimited JSON transport over an arbitrary duplex stream pair.
#[derive(Debug)]
pub struct StreamTransport {
    inner: LineFramed,
}

impl StreamTransport {
    /// Create a transport reading frames from `reader` and writing them to
    /// `writer`. Framing is strict: stray non-frame lines terminate the
    /// stream, since unlike stdio there is no subprocess banner to tolerate.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        Self {
            inner: LineFramed::start(reader, writer, true),
        }
    }

    /// Like [`StreamTransport::new`] but tolerating non-frame lines.
    pub fn new_lenient<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        Self {
            inner: LineFramed::start(reader, writer, false),
        }
    }
}

#[async_trait]
impl Transport for StreamTransport {
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
        Some("stream://".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weftmcp_protocol::RequestId;

    /// Build a cross-connected pair of stream transports.
    fn pair() -> (StreamTransport, StreamTransport) {
        let (a_write, b_read) = tokio::io::duplex(8192);
        let (b_write, a_read) = tokio::io::duplex(8192);
        (
            StreamTransport::new(a_read, a_write),
            StreamTransport::new(b_read, b_write),
        )
    }

    #[tokio::test]
    async fn ordered_delivery_within_direction() {
        let (a, b) = pair();
        for i in 0..10 {
            a.send(Message::request(RequestId::Num(i), "tools/list", None))
                .await
                .unwrap();
        }
        for i in 0..10 {
            let msg = b.recv().await.unwrap().unwrap();
            assert_eq!(msg.request_id(), Some(&RequestId::Num(i)));
        }
    }
}
