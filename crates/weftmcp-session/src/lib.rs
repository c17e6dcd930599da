//! The weftmcp session endpoint.
//!
//! A [`Session`] is the stateful engine bound to a single transport
//! connection. It owns three concurrent activities:
//!
//! 1. A **reader loop** that drains the transport and routes each frame to
//!    either the outstanding-request table (responses and errors) or the
//!    inbound dispatcher (requests and notifications).
//! 2. A **writer funnel** that serializes all outbound frames through one
//!    task, preserving FIFO order on the wire.
//! 3. Per-request **inbound handler tasks**, spawned concurrently, each
//!    with its own cancellation token.
//!
//! Sessions are symmetric: the same engine runs on both ends of a
//! connection, parameterized by [`SessionRole`]. The client role initiates
//! the `initialize` handshake; the server role answers it and gates all
//! other requests behind `notifications/initialized`.

mod context;
mod registry;
mod session;

pub use context::RequestContext;
pub use registry::{HandlerRegistry, NotificationHandler, ProgressCallback, RequestHandler};
pub use session::{
    PeerCapabilities, PeerInfo, RequestOptions, Session, SessionConfig, SessionRole, SessionState,
};
