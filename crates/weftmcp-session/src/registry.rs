//! Handler registry: method names mapped to user-supplied callbacks.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use weftmcp_protocol::types::ProgressNotification;
use weftmcp_protocol::McpResult;

use crate::context::RequestContext;
use crate::session::Session;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A request handler: receives the request context and raw params, returns
/// the result value or a domain error that becomes an error response.
pub type RequestHandler =
    Arc<dyn Fn(RequestContext, Option<Value>) -> BoxFuture<McpResult<Value>> + Send + Sync>;

/// A notification handler: fire-and-forget, no reply.
pub type NotificationHandler =
    Arc<dyn Fn(Session, Option<Value>) -> BoxFuture<()> + Send + Sync>;

/// Callback invoked for each `notifications/progress` correlated to an
/// outbound request.
pub type ProgressCallback = Arc<dyn Fn(ProgressNotification) + Send + Sync>;

/// Maps inbound method names to handlers.
///
/// Handlers are registered at session construction; lookup of an unknown
/// request method yields `MethodNotFound` (-32601), unknown notifications
/// are silently dropped. The session's built-in control methods (`ping`,
/// `initialize`, `notifications/initialized`, `notifications/cancelled`,
/// `notifications/progress`) are matched before this registry and cannot be
/// overridden.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    requests: HashMap<String, RequestHandler>,
    notifications: HashMap<String, NotificationHandler>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request handler for `method`.
    pub fn on_request<F, Fut>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpResult<Value>> + Send + 'static,
    {
        self.requests.insert(
            method.into(),
            Arc::new(move |ctx, params| Box::pin(handler(ctx, params))),
        );
        self
    }

    /// Register a notification handler for `method`.
    pub fn on_notification<F, Fut>(&mut self, method: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(Session, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.notifications.insert(
            method.into(),
            Arc::new(move |session, params| Box::pin(handler(session, params))),
        );
        self
    }

    /// Whether a request handler is registered for `method`.
    pub fn has_request(&self, method: &str) -> bool {
        self.requests.contains_key(method)
    }

    pub(crate) fn request_handler(&self, method: &str) -> Option<RequestHandler> {
        self.requests.get(method).cloned()
    }

    pub(crate) fn notification_handler(&self, method: &str) -> Option<NotificationHandler> {
        self.notifications.get(method).cloned()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("requests", &self.requests.keys().collect::<Vec<_>>())
            .field("notifications", &self.notifications.keys().collect::<Vec<_>>())
            .finish()
    }
}
