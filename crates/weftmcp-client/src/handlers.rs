//! Reverse-direction handlers the client may expose to the server.
//!
//! Both are optional. Registering a handler is what advertises the
//! corresponding capability in the handshake; a server calling a method
//! whose handler is absent receives `MethodNotFound`.

use async_trait::async_trait;

use weftmcp_protocol::types::{CreateMessageRequest, CreateMessageResult, Root};
use weftmcp_protocol::McpResult;

/// Handles `sampling/createMessage`: the server asks this client to run an
/// LLM completion on its behalf.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Produce a completion for the given conversation.
    async fn create_message(&self, request: CreateMessageRequest)
        -> McpResult<CreateMessageResult>;
}

/// Handles `roots/list`: the server asks this client which filesystem or
/// workspace roots it exposes.
#[async_trait]
pub trait RootsHandler: Send + Sync {
    /// The roots currently exposed.
    async fn list_roots(&self) -> McpResult<Vec<Root>>;
}

/// A fixed list of roots.
#[derive(Debug, Clone, Default)]
pub struct StaticRoots {
    roots: Vec<Root>,
}

impl StaticRoots {
    /// Expose exactly these roots.
    pub fn new(roots: Vec<Root>) -> Self {
        Self { roots }
    }
}

#[async_trait]
impl RootsHandler for StaticRoots {
    async fn list_roots(&self) -> McpResult<Vec<Root>> {
        Ok(self.roots.clone())
    }
}
