//! The server core: registry assembly, pagination, and stdio serving.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use tracing::debug;

use weftmcp_protocol::types::{
    CallToolRequest, GetPromptRequest, ListPromptsRequest, ListPromptsResult,
    ListResourcesRequest, ListResourcesResult, ListToolsRequest, ListToolsResult, Prompt,
    ReadResourceRequest, Resource, SetLevelRequest, Tool,
};
use weftmcp_protocol::{methods, McpError, McpResult};
use weftmcp_session::{HandlerRegistry, Session, SessionConfig};
use weftmcp_transport::{StdioTransport, Transport};

use crate::builder::{PromptHandler, ResourceReader, ServerBuilder, ToolHandler};

pub(crate) struct RegisteredTool {
    pub(crate) tool: Tool,
    pub(crate) handler: ToolHandler,
}

pub(crate) struct RegisteredPrompt {
    pub(crate) prompt: Prompt,
    pub(crate) handler: PromptHandler,
}

pub(crate) struct RegisteredResource {
    pub(crate) resource: Resource,
    pub(crate) reader: ResourceReader,
}

/// Read-only configuration snapshot shared by every session this server
/// spawns. Sessions share nothing mutable.
pub(crate) struct ServerCore {
    pub(crate) info: weftmcp_protocol::types::Implementation,
    pub(crate) instructions: Option<String>,
    pub(crate) page_size: usize,
    pub(crate) tools: Vec<RegisteredTool>,
    pub(crate) tool_index: HashMap<String, usize>,
    pub(crate) prompts: Vec<RegisteredPrompt>,
    pub(crate) prompt_index: HashMap<String, usize>,
    pub(crate) resources: Vec<RegisteredResource>,
    pub(crate) resource_index: HashMap<String, usize>,
    pub(crate) capabilities: weftmcp_protocol::types::ServerCapabilities,
    pub(crate) registry_seed: HandlerRegistry,
}

/// An MCP server: immutable registration bundle plus session factory.
///
/// Cheap to clone; clones share the read-only core.
#[derive(Clone)]
pub struct Server {
    core: Arc<ServerCore>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.core.info.name)
            .field("tools", &self.core.tools.len())
            .field("prompts", &self.core.prompts.len())
            .field("resources", &self.core.resources.len())
            .finish()
    }
}

impl Server {
    /// Start building a server identifying as `name`/`version`.
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ServerBuilder {
        ServerBuilder::new(name, version)
    }

    pub(crate) fn from_core(core: ServerCore) -> Self {
        Self { core: Arc::new(core) }
    }

    /// Bind one session to the given transport and start it.
    pub fn start_session(&self, transport: Arc<dyn Transport>) -> Session {
        self.start_session_with(transport, false)
    }

    /// Like [`Server::start_session`], optionally skipping the handshake
    /// (sessionless HTTP one-shot exchanges).
    pub(crate) fn start_session_with(
        &self,
        transport: Arc<dyn Transport>,
        assume_initialized: bool,
    ) -> Session {
        let mut config = SessionConfig::server(self.core.info.clone());
        config.server_capabilities = self.core.capabilities.clone();
        config.instructions = self.core.instructions.clone();
        config.assume_initialized = assume_initialized;
        Session::start(transport, config, self.build_registry())
    }

    /// Serve a single session over the current process's stdio, running
    /// until the peer disconnects.
    pub async fn serve_stdio(&self) -> McpResult<()> {
        let session = self.start_session(Arc::new(StdioTransport::new()));
        debug!("serving {} over stdio", self.core.info.name);
        match session.wait_closed().await {
            // Peer hang-up is the normal way a stdio session ends.
            Err(McpError::ConnectionClosed) | Ok(()) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Assemble the per-session handler registry from the core.
    fn build_registry(&self) -> HandlerRegistry {
        let mut registry = self.core.registry_seed.clone();

        let core = Arc::clone(&self.core);
        registry.on_request(methods::TOOLS_LIST, move |_ctx, params| {
            let core = Arc::clone(&core);
            async move {
                let request: ListToolsRequest = parse_params_or_default(params)?;
                let (offset, end, next_cursor) =
                    paginate(core.tools.len(), core.page_size, request.cursor.as_deref())?;
                let tools = core.tools[offset..end]
                    .iter()
                    .map(|t| t.tool.clone())
                    .collect();
                to_result(ListToolsResult { tools, next_cursor })
            }
        });

        let core = Arc::clone(&self.core);
        registry.on_request(methods::TOOLS_CALL, move |ctx, params| {
            let core = Arc::clone(&core);
            async move {
                let request: CallToolRequest = parse_params(params)?;
                let index = *core.tool_index.get(&request.name).ok_or_else(|| {
                    McpError::InvalidParams(format!("unknown tool '{}'", request.name))
                })?;
                let result = (core.tools[index].handler)(ctx, request.arguments).await?;
                to_result(result)
            }
        });

        let core = Arc::clone(&self.core);
        registry.on_request(methods::PROMPTS_LIST, move |_ctx, params| {
            let core = Arc::clone(&core);
            async move {
                let request: ListPromptsRequest = parse_params_or_default(params)?;
                let (offset, end, next_cursor) =
                    paginate(core.prompts.len(), core.page_size, request.cursor.as_deref())?;
                let prompts = core.prompts[offset..end]
                    .iter()
                    .map(|p| p.prompt.clone())
                    .collect();
                to_result(ListPromptsResult {
                    prompts,
                    next_cursor,
                })
            }
        });

        let core = Arc::clone(&self.core);
        registry.on_request(methods::PROMPTS_GET, move |ctx, params| {
            let core = Arc::clone(&core);
            async move {
                let request: GetPromptRequest = parse_params(params)?;
                let index = *core.prompt_index.get(&request.name).ok_or_else(|| {
                    McpError::InvalidParams(format!("unknown prompt '{}'", request.name))
                })?;
                let result = (core.prompts[index].handler)(ctx, request.arguments).await?;
                to_result(result)
            }
        });

        let core = Arc::clone(&self.core);
        registry.on_request(methods::RESOURCES_LIST, move |_ctx, params| {
            let core = Arc::clone(&core);
            async move {
                let request: ListResourcesRequest = parse_params_or_default(params)?;
                let (offset, end, next_cursor) = paginate(
                    core.resources.len(),
                    core.page_size,
                    request.cursor.as_deref(),
                )?;
                let resources = core.resources[offset..end]
                    .iter()
                    .map(|r| r.resource.clone())
                    .collect();
                to_result(ListResourcesResult {
                    resources,
                    next_cursor,
                })
            }
        });

        let core = Arc::clone(&self.core);
        registry.on_request(methods::RESOURCES_READ, move |ctx, params| {
            let core = Arc::clone(&core);
            async move {
                let request: ReadResourceRequest = parse_params(params)?;
                let index = *core.resource_index.get(&request.uri).ok_or_else(|| {
                    McpError::InvalidParams(format!("unknown resource '{}'", request.uri))
                })?;
                let result = (core.resources[index].reader)(ctx, request.uri).await?;
                to_result(result)
            }
        });

        registry.on_request(methods::LOGGING_SET_LEVEL, move |_ctx, params| async move {
            let request: SetLevelRequest = parse_params(params)?;
            debug!("client requested log level {:?}", request.level);
            Ok(Value::Object(Default::default()))
        });

        registry
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let params = params.ok_or_else(|| McpError::invalid_params("missing params"))?;
    serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))
}

fn parse_params_or_default<T: serde::de::DeserializeOwned + Default>(
    params: Option<Value>,
) -> McpResult<T> {
    match params {
        None => Ok(T::default()),
        Some(params) => {
            serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))
        }
    }
}

fn to_result<T: serde::Serialize>(value: T) -> McpResult<Value> {
    serde_json::to_value(value).map_err(|e| McpError::internal(e.to_string()))
}

/// Compute one page. Cursors are opaque to clients: base64url of the
/// decimal start offset.
fn paginate(
    total: usize,
    page_size: usize,
    cursor: Option<&str>,
) -> McpResult<(usize, usize, Option<String>)> {
    let offset = match cursor {
        None => 0,
        Some(cursor) => decode_cursor(cursor)?,
    };
    if offset > total {
        return Err(McpError::invalid_params("cursor is out of range"));
    }
    let end = (offset + page_size).min(total);
    let next_cursor = (end < total).then(|| encode_cursor(end));
    Ok((offset, end, next_cursor))
}

fn encode_cursor(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(offset.to_string())
}

fn decode_cursor(cursor: &str) -> McpResult<usize> {
    URL_SAFE_NO_PAD
        .decode(cursor)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| McpError::invalid_params("malformed cursor"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cursor_round_trips() {
        let cursor = encode_cursor(40);
        assert_eq!(decode_cursor(&cursor).unwrap(), 40);
    }

    #[test]
    fn garbage_cursor_is_invalid_params() {
        assert!(matches!(
            decode_cursor("!!!"),
            Err(McpError::InvalidParams(_))
        ));
    }

    #[test]
    fn pagination_walks_to_the_end() {
        // 100 entries, 20 per page: five pages, last one with no cursor.
        let mut offset_cursor = None;
        let mut seen = 0;
        let mut pages = 0;
        loop {
            let (start, end, next) =
                paginate(100, 20, offset_cursor.as_deref()).unwrap();
            seen += end - start;
            pages += 1;
            match next {
                Some(next) => offset_cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, 100);
        assert_eq!(pages, 5);
    }

    #[test]
    fn empty_listing_has_no_cursor() {
        let (start, end, next) = paginate(0, 20, None).unwrap();
        assert_eq!((start, end), (0, 0));
        assert!(next.is_none());
    }
}
