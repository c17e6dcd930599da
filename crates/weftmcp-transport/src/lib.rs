//! Frame transports for weftmcp.
//!
//! A transport moves decoded JSON-RPC frames between peers. Every variant
//! presents the same contract ([`Transport`]): an inbound frame stream that
//! terminates on peer close, a `send` that may suspend under backpressure,
//! and an idempotent `close`. Correlation of requests with responses is the
//! session's job; transports never interpret frames beyond what their wire
//! format requires.
//!
//! Variants:
//!
//! - [`StdioTransport`] - newline-delimited JSON over process or child
//!   stdin/stdout.
//! - [`StreamTransport`] - the same framing over arbitrary duplex byte
//!   streams.
//! - [`ChannelTransport`] - in-process channel pair, used by the HTTP
//!   server glue and tests.
//! - [`HttpClientTransport`] - HTTP+SSE and streamable-HTTP client modes.
//!
//! The [`sse`] module holds the pure SSE event codec shared by the HTTP
//! client and server.

pub mod auth;
pub mod channel;
pub mod error;
pub mod http;
mod line;
pub mod sse;
pub mod stdio;
pub mod stream;
mod traits;

pub use auth::BearerAuthenticator;
pub use channel::ChannelTransport;
pub use error::{TransportError, TransportResult};
pub use http::{HttpClientConfig, HttpClientMode, HttpClientTransport, RetryPolicy};
pub use sse::{SseDecoder, SseEvent};
pub use stdio::StdioTransport;
pub use stream::StreamTransport;
pub use traits::Transport;
