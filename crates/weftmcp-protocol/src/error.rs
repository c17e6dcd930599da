//! Domain error type shared across the workspace.

use serde_json::Value;
use thiserror::Error;

use crate::jsonrpc::ErrorObject;

/// A specialized `Result` for protocol and session operations.
pub type McpResult<T> = std::result::Result<T, McpError>;

/// Errors surfaced by the codec, the session endpoint, and the surfaces
/// built on top of them.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum McpError {
    /// A frame could not be decoded as JSON at all.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A frame decoded as JSON but violates the JSON-RPC shape.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No handler is registered for the requested method, or the required
    /// capability was not advertised.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Request parameters failed validation or deserialization.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// A handler or the session itself failed internally.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A request arrived before the initialize handshake completed.
    #[error("Server not initialized: {0}")]
    NotInitialized(String),

    /// The request was cancelled before a response arrived.
    #[error("Request cancelled")]
    Cancelled,

    /// The underlying transport failed.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The connection closed while the request was outstanding.
    #[error("Connection closed")]
    ConnectionClosed,

    /// An HTTP transport was challenged and no authenticator is configured.
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// The OAuth flow triggered by a 401 challenge failed.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// An error response from the peer that maps to no built-in kind.
    #[error("{message} (code {code})")]
    Rpc {
        /// JSON-RPC error code reported by the peer.
        code: i32,
        /// Human-readable message from the peer.
        message: String,
        /// Optional structured error payload.
        data: Option<Value>,
    },
}

impl McpError {
    /// Shorthand for [`McpError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Shorthand for [`McpError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Shorthand for [`McpError::MethodNotFound`].
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound(method.into())
    }

    /// The JSON-RPC error code this error maps to when sent on the wire.
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::NotInitialized(_) => -32002,
            Self::Rpc { code, .. } => *code,
            _ => -32603,
        }
    }

    /// Convert into the wire-level error object.
    pub fn to_error_object(&self) -> ErrorObject {
        match self {
            Self::Rpc {
                code,
                message,
                data,
            } => ErrorObject {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            other => ErrorObject {
                code: other.code(),
                message: other.to_string(),
                data: None,
            },
        }
    }
}

impl From<ErrorObject> for McpError {
    fn from(error: ErrorObject) -> Self {
        match error.code {
            -32700 => Self::Parse(error.message),
            -32600 => Self::InvalidRequest(error.message),
            -32601 => Self::MethodNotFound(error.message),
            -32602 => Self::InvalidParams(error.message),
            -32002 => Self::NotInitialized(error.message),
            code => Self::Rpc {
                code,
                message: error.message,
                data: error.data,
            },
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_jsonrpc() {
        assert_eq!(McpError::Parse("x".into()).code(), -32700);
        assert_eq!(McpError::InvalidRequest("x".into()).code(), -32600);
        assert_eq!(McpError::MethodNotFound("x".into()).code(), -32601);
        assert_eq!(McpError::InvalidParams("x".into()).code(), -32602);
        assert_eq!(McpError::Internal("x".into()).code(), -32603);
        assert_eq!(McpError::NotInitialized("x".into()).code(), -32002);
    }

    #[test]
    fn error_object_round_trip_preserves_kind() {
        let err = McpError::MethodNotFound("tools/call".into());
        let obj = err.to_error_object();
        assert_eq!(obj.code, -32601);
        assert!(matches!(McpError::from(obj), McpError::MethodNotFound(_)));
    }

    #[test]
    fn unknown_code_becomes_rpc() {
        let obj = ErrorObject {
            code: -32800,
            message: "user declined".into(),
            data: None,
        };
        assert!(matches!(McpError::from(obj), McpError::Rpc { code: -32800, .. }));
    }
}
