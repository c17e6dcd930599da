//! The client: builder, handshake, and typed operations.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use weftmcp_protocol::types::{
    CallToolRequest, CallToolResult, ClientCapabilities, Cursor, EmptyResult, GetPromptRequest,
    GetPromptResult, Implementation, InitializeResult, ListPromptsRequest, ListPromptsResult,
    ListResourcesRequest, ListResourcesResult, ListRootsResult, ListToolsRequest, ListToolsResult,
    LoggingLevel, Prompt, ReadResourceRequest, ReadResourceResult, Resource, Root,
    RootsCapability, SamplingCapability, SetLevelRequest, SubscribeRequest, Tool,
};
use weftmcp_protocol::{methods, McpError, McpResult};
use weftmcp_session::{HandlerRegistry, RequestOptions, Session, SessionConfig};
use weftmcp_transport::Transport;

use crate::handlers::{RootsHandler, SamplingHandler, StaticRoots};

/// Configures and connects a [`Client`].
pub struct ClientBuilder {
    info: Implementation,
    initialize_timeout: Duration,
    sampling: Option<Arc<dyn SamplingHandler>>,
    roots: Option<Arc<dyn RootsHandler>>,
    registry: HandlerRegistry,
}

impl ClientBuilder {
    /// Start building a client identifying as `name`/`version`.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: Implementation::new(name, version),
            initialize_timeout: Duration::from_secs(60),
            sampling: None,
            roots: None,
            registry: HandlerRegistry::new(),
        }
    }

    /// Replace the implementation info wholesale.
    pub fn info(mut self, info: Implementation) -> Self {
        self.info = info;
        self
    }

    /// How long [`Client::initialize`] waits for the server's answer.
    pub fn initialize_timeout(mut self, timeout: Duration) -> Self {
        self.initialize_timeout = timeout;
        self
    }

    /// Expose LLM sampling to the server. Advertises the `sampling`
    /// capability.
    pub fn sampling_handler(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.sampling = Some(handler);
        self
    }

    /// Expose workspace roots to the server. Advertises the `roots`
    /// capability.
    pub fn roots_handler(mut self, handler: Arc<dyn RootsHandler>) -> Self {
        self.roots = Some(handler);
        self
    }

    /// Expose a fixed list of roots.
    pub fn roots(self, roots: Vec<Root>) -> Self {
        self.roots_handler(Arc::new(StaticRoots::new(roots)))
    }

    /// Access the underlying registry for non-standard methods the server
    /// may call on this client.
    pub fn registry(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// The capabilities this builder will advertise, derived from the
    /// registered handlers.
    pub fn capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            roots: self.roots.as_ref().map(|_| RootsCapability {
                list_changed: Some(false),
            }),
            sampling: self.sampling.as_ref().map(|_| SamplingCapability {}),
            experimental: None,
        }
    }

    /// Bind to a transport and start the session tasks.
    ///
    /// The returned client is not usable until [`Client::initialize`]
    /// completes the handshake.
    pub fn connect<T: Transport + 'static>(mut self, transport: T) -> Client {
        let capabilities = self.capabilities();

        if let Some(handler) = self.sampling.take() {
            self.registry
                .on_request(methods::SAMPLING_CREATE_MESSAGE, move |_ctx, params| {
                    let handler = Arc::clone(&handler);
                    async move {
                        let request = params
                            .ok_or_else(|| {
                                McpError::invalid_params("sampling/createMessage requires params")
                            })
                            .and_then(|p| {
                                serde_json::from_value(p).map_err(|e| {
                                    McpError::InvalidParams(format!(
                                        "malformed createMessage params: {e}"
                                    ))
                                })
                            })?;
                        let result = handler.create_message(request).await?;
                        serde_json::to_value(result).map_err(|e| McpError::internal(e.to_string()))
                    }
                });
        }

        if let Some(handler) = self.roots.take() {
            self.registry
                .on_request(methods::ROOTS_LIST, move |_ctx, _params| {
                    let handler = Arc::clone(&handler);
                    async move {
                        let roots = handler.list_roots().await?;
                        serde_json::to_value(ListRootsResult { roots })
                            .map_err(|e| McpError::internal(e.to_string()))
                    }
                });
        }

        let mut config = SessionConfig::client(self.info);
        config.client_capabilities = capabilities;
        config.initialize_timeout = self.initialize_timeout;

        let session = Session::start(Arc::new(transport), config, self.registry);
        Client { session }
    }
}

/// An MCP client bound to one server connection.
///
/// Cheap to clone; all clones share the session.
#[derive(Debug, Clone)]
pub struct Client {
    session: Session,
}

impl Client {
    /// The underlying session, for raw requests and reverse-call context.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the initialize handshake and return the server's info and
    /// capabilities.
    pub async fn initialize(&self) -> McpResult<InitializeResult> {
        let result = self.session.initialize().await?;
        debug!(
            "initialized against {} {} (protocol {})",
            result.server_info.name, result.server_info.version, result.protocol_version
        );
        Ok(result)
    }

    /// Liveness check.
    pub async fn ping(&self) -> McpResult<()> {
        let _: EmptyResult = self.typed_request(methods::PING, None::<()>).await?;
        Ok(())
    }

    /// One page of the server's tools.
    pub async fn list_tools(&self, cursor: Option<Cursor>) -> McpResult<ListToolsResult> {
        self.typed_request(methods::TOOLS_LIST, Some(ListToolsRequest { cursor }))
            .await
    }

    /// Every tool, following `nextCursor` until exhausted.
    pub async fn list_all_tools(&self) -> McpResult<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_tools(cursor).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
    }

    /// Invoke a tool by name.
    pub async fn call_tool(
        &self,
        name: impl Into<String>,
        arguments: Option<Map<String, Value>>,
    ) -> McpResult<CallToolResult> {
        self.call_tool_with_options(name, arguments, RequestOptions::default())
            .await
    }

    /// Invoke a tool with cancellation and progress options.
    pub async fn call_tool_with_options(
        &self,
        name: impl Into<String>,
        arguments: Option<Map<String, Value>>,
        options: RequestOptions,
    ) -> McpResult<CallToolResult> {
        let request = CallToolRequest {
            name: name.into(),
            arguments,
        };
        let value = self
            .session
            .request_with_options(
                methods::TOOLS_CALL,
                Some(serde_json::to_value(request)?),
                options,
            )
            .await?;
        serde_json::from_value(value)
            .map_err(|e| McpError::InvalidParams(format!("malformed tool result: {e}")))
    }

    /// One page of the server's prompts.
    pub async fn list_prompts(&self, cursor: Option<Cursor>) -> McpResult<ListPromptsResult> {
        self.typed_request(methods::PROMPTS_LIST, Some(ListPromptsRequest { cursor }))
            .await
    }

    /// Every prompt, following `nextCursor` until exhausted.
    pub async fn list_all_prompts(&self) -> McpResult<Vec<Prompt>> {
        let mut prompts = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_prompts(cursor).await?;
            prompts.extend(page.prompts);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(prompts),
            }
        }
    }

    /// Expand a prompt template.
    pub async fn get_prompt(
        &self,
        name: impl Into<String>,
        arguments: Option<std::collections::HashMap<String, String>>,
    ) -> McpResult<GetPromptResult> {
        self.typed_request(
            methods::PROMPTS_GET,
            Some(GetPromptRequest {
                name: name.into(),
                arguments,
            }),
        )
        .await
    }

    /// One page of the server's resources.
    pub async fn list_resources(&self, cursor: Option<Cursor>) -> McpResult<ListResourcesResult> {
        self.typed_request(
            methods::RESOURCES_LIST,
            Some(ListResourcesRequest { cursor }),
        )
        .await
    }

    /// Every resource, following `nextCursor` until exhausted.
    pub async fn list_all_resources(&self) -> McpResult<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.list_resources(cursor).await?;
            resources.extend(page.resources);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(resources),
            }
        }
    }

    /// Read a resource's contents.
    pub async fn read_resource(&self, uri: impl Into<String>) -> McpResult<ReadResourceResult> {
        self.typed_request(
            methods::RESOURCES_READ,
            Some(ReadResourceRequest { uri: uri.into() }),
        )
        .await
    }

    /// Register interest in change notifications for a resource.
    ///
    /// Requires the server to advertise the `resources.subscribe`
    /// capability.
    pub async fn subscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        let _: EmptyResult = self
            .typed_request(
                methods::RESOURCES_SUBSCRIBE,
                Some(SubscribeRequest { uri: uri.into() }),
            )
            .await?;
        Ok(())
    }

    /// Cancel a previous resource subscription.
    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> McpResult<()> {
        let _: EmptyResult = self
            .typed_request(
                methods::RESOURCES_UNSUBSCRIBE,
                Some(SubscribeRequest { uri: uri.into() }),
            )
            .await?;
        Ok(())
    }

    /// Ask the server to forward log messages at or above `level`.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> McpResult<()> {
        let _: EmptyResult = self
            .typed_request(methods::LOGGING_SET_LEVEL, Some(SetLevelRequest { level }))
            .await?;
        Ok(())
    }

    /// Raw request pass-through for methods without a typed wrapper.
    pub async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        self.session.request(method, params).await
    }

    /// Raw notification pass-through.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.session.notify(method, params).await
    }

    /// Close the connection.
    pub async fn close(&self) {
        self.session.close().await;
    }

    async fn typed_request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> McpResult<R> {
        let params = params.map(serde_json::to_value).transpose()?;
        let value = self.session.request(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| McpError::InvalidParams(format!("malformed {method} result: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use weftmcp_protocol::types::{CreateMessageRequest, CreateMessageResult};

    struct NoopSampling;

    #[async_trait]
    impl SamplingHandler for NoopSampling {
        async fn create_message(
            &self,
            _request: CreateMessageRequest,
        ) -> McpResult<CreateMessageResult> {
            Err(McpError::internal("unused"))
        }
    }

    #[test]
    fn capabilities_follow_registered_handlers() {
        let bare = ClientBuilder::new("c", "0");
        assert_eq!(bare.capabilities(), ClientCapabilities::default());

        let with_sampling =
            ClientBuilder::new("c", "0").sampling_handler(Arc::new(NoopSampling));
        let caps = with_sampling.capabilities();
        assert!(caps.sampling.is_some());
        assert!(caps.roots.is_none());

        let with_roots = ClientBuilder::new("c", "0").roots(vec![]);
        let caps = with_roots.capabilities();
        assert!(caps.roots.is_some());
        assert!(caps.sampling.is_none());
    }
}
