//! Initialize handshake bodies.

use serde::{Deserialize, Serialize};

use super::{ClientCapabilities, ServerCapabilities};

/// Name and version of an MCP implementation, exchanged during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Implementation {
    /// Machine-readable implementation name.
    pub name: String,
    /// Human-readable display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Implementation version string.
    pub version: String,
}

impl Implementation {
    /// Convenience constructor with no title.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            version: version.into(),
        }
    }
}

/// Params of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeRequest {
    /// Protocol revision the client speaks.
    pub protocol_version: String,
    /// Client capability set.
    pub capabilities: ClientCapabilities,
    /// Client identification.
    pub client_info: Implementation,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol revision the server selected.
    pub protocol_version: String,
    /// Server capability set.
    pub capabilities: ServerCapabilities,
    /// Server identification.
    pub server_info: Implementation,
    /// Optional usage hints for the client's model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}
