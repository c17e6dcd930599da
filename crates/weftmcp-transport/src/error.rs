//! Transport error types.

use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while moving frames.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish the connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection is closed; no further frames can be sent.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send a frame.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a frame.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Failed to encode or decode a frame.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The peer violated the wire protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid transport configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The server answered 401 and no authenticator could satisfy it.
    #[error("Unauthorized{}", challenge.as_deref().map(|c| format!(": {c}")).unwrap_or_default())]
    Unauthorized {
        /// The `WWW-Authenticate` header, when the server sent one.
        challenge: Option<String>,
    },

    /// The configured authenticator failed to obtain a token.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The operation did not complete in time.
    #[error("Operation timed out")]
    Timeout,
}

impl From<TransportError> for weftmcp_protocol::McpError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::ConnectionClosed => Self::ConnectionClosed,
            TransportError::Unauthorized { challenge } => {
                Self::AuthRequired(challenge.unwrap_or_else(|| "bearer token required".into()))
            }
            TransportError::AuthenticationFailed(msg) => Self::AuthFailed(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}
