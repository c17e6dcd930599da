//! Roots bodies: the server asks the client for workspace roots.

use serde::{Deserialize, Serialize};

/// A filesystem or workspace root the client exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    /// Root URI; `file://` in practice.
    pub uri: String,
    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of `roots/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// The exposed roots.
    pub roots: Vec<Root>,
}
