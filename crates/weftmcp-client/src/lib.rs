//! MCP client surface.
//!
//! [`Client`] wraps a client-role session with typed operations for tools,
//! prompts, resources, and logging, plus pagination helpers. Reverse
//! capabilities the client may expose to the server - sampling and roots -
//! are supplied as handler objects at build time; registering one is what
//! advertises the corresponding capability during the handshake.
//!
//! ```rust,no_run
//! use weftmcp_client::ClientBuilder;
//! use weftmcp_transport::StdioTransport;
//!
//! # async fn example() -> weftmcp_protocol::McpResult<()> {
//! let client = ClientBuilder::new("my-app", "1.0.0").connect(StdioTransport::new());
//! let init = client.initialize().await?;
//! println!("connected to {}", init.server_info.name);
//!
//! let tools = client.list_all_tools().await?;
//! let result = client.call_tool("echo", None).await?;
//! # let _ = (tools, result);
//! # Ok(())
//! # }
//! ```

mod client;
mod handlers;

pub use client::{Client, ClientBuilder};
pub use handlers::{RootsHandler, SamplingHandler, StaticRoots};
