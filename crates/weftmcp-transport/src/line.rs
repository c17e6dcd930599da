//! Shared machinery for newline-delimited JSON transports.
//!
//! Both the stdio and stream transports frame messages as one compact JSON
//! document per `\n`-terminated line. A background reader task drains the
//! input, decodes frames, and feeds a bounded channel; the writer side
//! serializes on demand and flushes after every frame.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, Mutex as TokioMutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, trace, warn};
use weftmcp_protocol::{Message, MAX_MESSAGE_SIZE};

use crate::error::{TransportError, TransportResult};

type BoxedReader = Pin<Box<dyn AsyncRead + Send + 'static>>;
type BoxedWriter = Pin<Box<dyn AsyncWrite + Send + 'static>>;
type LineWriter = FramedWrite<BoxedWriter, LinesCodec>;

/// Capacity of the inbound frame channel; sends beyond it apply
/// backpressure to the reader task rather than buffering unboundedly.
const INBOUND_BUFFER: usize = 256;

pub(crate) struct LineFramed {
    writer: TokioMutex<Option<LineWriter>>,
    incoming: TokioMutex<mpsc::Receiver<Message>>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl LineFramed {
    /// Spawn the reader task over `reader` and wrap `writer` for sending.
    ///
    /// With `strict_framing` disabled (the default for stdio), input lines
    /// that are not valid frames are logged and discarded so that
    /// subprocesses printing startup banners do not kill the connection.
    /// With it enabled, the first such line terminates the inbound stream.
    pub(crate) fn start<R, W>(reader: R, writer: W, strict_framing: bool) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let boxed_reader: BoxedReader = Box::pin(reader);
        let boxed_writer: BoxedWriter = Box::pin(writer);

        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let mut lines = FramedRead::new(
            BufReader::new(boxed_reader),
            LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE),
        );

        let reader_task = tokio::spawn(async move {
            while let Some(result) = lines.next().await {
                let line = match result {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("line read failed: {e}");
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match Message::from_str(line) {
                    Ok(message) => {
                        trace!("received frame: {} bytes", line.len());
                        if tx.send(message).await.is_err() {
                            debug!("inbound channel closed, stopping reader");
                            break;
                        }
                    }
                    Err(e) if strict_framing => {
                        warn!("non-frame line under strict framing, closing: {e}");
                        break;
                    }
                    Err(e) => {
                        // Startup banner or stray diagnostic output.
                        debug!("discarding non-frame line: {e}");
                    }
                }
            }
            debug!("line reader task finished");
        });

        Self {
            writer: TokioMutex::new(Some(FramedWrite::new(
                boxed_writer,
                LinesCodec::new_with_max_length(MAX_MESSAGE_SIZE),
            ))),
            incoming: TokioMutex::new(rx),
            reader_task: StdMutex::new(Some(reader_task)),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) async fn send(&self, message: &Message) -> TransportResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed);
        }

        let line = message
            .encode()
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;

        // One frame per line: a literal newline inside the document would
        // desynchronize the peer's framing.
        if line.contains('\n') || line.contains('\r') {
            return Err(TransportError::Protocol(
                "encoded frame contains a literal newline".to_string(),
            ));
        }

        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or(TransportError::ConnectionClosed)?;
        writer
            .send(line)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        SinkExt::<String>::flush(writer)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    pub(crate) async fn recv(&self) -> TransportResult<Option<Message>> {
        let mut incoming = self.incoming.lock().await;
        Ok(incoming.recv().await)
    }

    pub(crate) async fn close(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(task) = self
            .reader_task
            .lock()
            .expect("reader task mutex poisoned")
            .take()
        {
            task.abort();
        }
        *self.writer.lock().await = None;
        debug!("line transport closed");
        Ok(())
    }
}

impl std::fmt::Debug for LineFramed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineFramed")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
