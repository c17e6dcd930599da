//! MCP server surface.
//!
//! A [`Server`] is an immutable bundle of registered tools, prompts, and
//! resources plus identity and capability configuration. It can be served
//! over stdio (one session for the process lifetime) or over HTTP (the
//! multiplexer spawns one session per connection; see [`HttpServerConfig`]).
//!
//! ```rust,no_run
//! use weftmcp_protocol::types::CallToolResult;
//! use weftmcp_server::Server;
//! use serde_json::json;
//!
//! # async fn example() -> weftmcp_protocol::McpResult<()> {
//! let server = Server::builder("echo-server", "1.0.0")
//!     .tool(
//!         "echo",
//!         "Echoes back the input",
//!         json!({
//!             "type": "object",
//!             "properties": {"message": {"type": "string"}},
//!             "required": ["message"]
//!         }),
//!         |_ctx, args| async move {
//!             let message = args
//!                 .and_then(|a| a.get("message").and_then(|m| m.as_str().map(String::from)))
//!                 .unwrap_or_default();
//!             Ok(CallToolResult::text(format!("Echo: {message}")))
//!         },
//!     )
//!     .build();
//!
//! server.serve_stdio().await
//! # }
//! ```

mod builder;
mod http;
mod server;

pub use builder::{PromptHandler, ResourceReader, ServerBuilder, ToolHandler};
pub use http::{HttpAuthConfig, HttpServerConfig, HttpServerHandle, HttpServerMode};
pub use server::Server;
