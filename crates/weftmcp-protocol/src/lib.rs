//! Wire-level types for the Model Context Protocol.
//!
//! This crate is the foundation layer of the weftmcp workspace. It contains:
//!
//! - The JSON-RPC 2.0 frame codec ([`jsonrpc`]): request, response, error
//!   response, and notification frames with deterministic decode
//!   discrimination.
//! - The string-or-integer id unions ([`RequestId`] and [`ProgressToken`])
//!   that must round-trip preserving their original lexical form.
//! - Typed MCP message bodies ([`types`]): initialization, capabilities,
//!   tools, prompts, resources, sampling, roots, and logging.
//! - The domain error type ([`McpError`]) with its JSON-RPC code mapping.
//!
//! Nothing in this crate performs I/O; transports and sessions build on it.

pub mod error;
pub mod id;
pub mod jsonrpc;
pub mod methods;
pub mod types;

pub use error::{McpError, McpResult};
pub use id::{ProgressToken, RequestId};
pub use jsonrpc::{
    ErrorObject, JsonRpcErrorCode, JsonRpcErrorResponse, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, JsonRpcVersion, Message,
};

/// The protocol revision this implementation speaks natively.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Protocol revisions this implementation can interoperate with.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Upper bound on a single encoded frame, shared by all transports.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
