//! Server builder: explicit `(name, schema, handler)` registration.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};

use weftmcp_protocol::types::{
    CallToolResult, GetPromptResult, Implementation, LoggingCapability, Prompt,
    PromptsCapability, ReadResourceResult, Resource, ResourceContents, ResourcesCapability,
    ServerCapabilities, Tool, ToolsCapability,
};
use weftmcp_protocol::McpResult;
use weftmcp_session::{HandlerRegistry, RequestContext};

use crate::server::{RegisteredPrompt, RegisteredResource, RegisteredTool, Server, ServerCore};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Handles one tool invocation.
pub type ToolHandler = Arc<
    dyn Fn(RequestContext, Option<Map<String, Value>>) -> BoxFuture<McpResult<CallToolResult>>
        + Send
        + Sync,
>;

/// Expands one prompt template.
pub type PromptHandler = Arc<
    dyn Fn(RequestContext, Option<HashMap<String, String>>) -> BoxFuture<McpResult<GetPromptResult>>
        + Send
        + Sync,
>;

/// Reads one resource.
pub type ResourceReader =
    Arc<dyn Fn(RequestContext, String) -> BoxFuture<McpResult<ReadResourceResult>> + Send + Sync>;

/// Assembles a [`Server`].
///
/// Tools, prompts, and resources are registered as explicit
/// `(name, schema, handler)` triples; the session core only ever sees the
/// resulting callbacks. Capabilities are derived from what was registered.
pub struct ServerBuilder {
    info: Implementation,
    instructions: Option<String>,
    page_size: usize,
    tools: Vec<RegisteredTool>,
    prompts: Vec<RegisteredPrompt>,
    resources: Vec<RegisteredResource>,
    logging: bool,
    registry: HandlerRegistry,
}

impl ServerBuilder {
    pub(crate) fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: Implementation::new(name, version),
            instructions: None,
            page_size: 50,
            tools: Vec::new(),
            prompts: Vec::new(),
            resources: Vec::new(),
            logging: false,
            registry: HandlerRegistry::new(),
        }
    }

    /// Replace the implementation info wholesale.
    pub fn info(mut self, info: Implementation) -> Self {
        self.info = info;
        self
    }

    /// Usage hints returned in the `initialize` result.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Entries per page for the `*/list` operations.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Register a tool.
    pub fn tool<F, Fut>(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(RequestContext, Option<Map<String, Value>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<CallToolResult>> + Send + 'static,
    {
        self.tools.push(RegisteredTool {
            tool: Tool {
                name: name.into(),
                title: None,
                description: Some(description.into()),
                input_schema,
            },
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        });
        self
    }

    /// Register a prompt template.
    pub fn prompt<F, Fut>(mut self, prompt: Prompt, handler: F) -> Self
    where
        F: Fn(RequestContext, Option<HashMap<String, String>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<GetPromptResult>> + Send + 'static,
    {
        self.prompts.push(RegisteredPrompt {
            prompt,
            handler: Arc::new(move |ctx, args| Box::pin(handler(ctx, args))),
        });
        self
    }

    /// Register a resource with a reader callback.
    pub fn resource<F, Fut>(mut self, resource: Resource, reader: F) -> Self
    where
        F: Fn(RequestContext, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<ReadResourceResult>> + Send + 'static,
    {
        self.resources.push(RegisteredResource {
            resource,
            reader: Arc::new(move |ctx, uri| Box::pin(reader(ctx, uri))),
        });
        self
    }

    /// Register a fixed-text resource.
    pub fn text_resource(
        self,
        uri: impl Into<String>,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let resource = Resource {
            uri: uri.into(),
            name: name.into(),
            title: None,
            description: None,
            mime_type: Some("text/plain".to_string()),
        };
        self.resource(resource, move |_ctx, requested| {
            let text = text.clone();
            async move {
                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::Text {
                        uri: requested,
                        mime_type: Some("text/plain".to_string()),
                        text,
                    }],
                })
            }
        })
    }

    /// Advertise the `logging` capability and accept `logging/setLevel`.
    pub fn enable_logging(mut self) -> Self {
        self.logging = true;
        self
    }

    /// Access the underlying registry for non-standard methods.
    pub fn registry(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// The capabilities this builder will advertise, derived from what was
    /// registered.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(ToolsCapability::default),
            prompts: (!self.prompts.is_empty()).then(PromptsCapability::default),
            resources: (!self.resources.is_empty()).then(ResourcesCapability::default),
            logging: self.logging.then(LoggingCapability::default),
            experimental: None,
        }
    }

    /// Finish building.
    pub fn build(self) -> Server {
        let capabilities = self.capabilities();
        Server::from_core(ServerCore {
            info: self.info,
            instructions: self.instructions,
            page_size: self.page_size,
            tool_index: self
                .tools
                .iter()
                .enumerate()
                .map(|(i, t)| (t.tool.name.clone(), i))
                .collect(),
            tools: self.tools,
            prompt_index: self
                .prompts
                .iter()
                .enumerate()
                .map(|(i, p)| (p.prompt.name.clone(), i))
                .collect(),
            prompts: self.prompts,
            resource_index: self
                .resources
                .iter()
                .enumerate()
                .map(|(i, r)| (r.resource.uri.clone(), i))
                .collect(),
            resources: self.resources,
            capabilities,
            registry_seed: self.registry,
        })
    }
}
