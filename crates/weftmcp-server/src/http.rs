//! The HTTP multiplexer.
//!
//! One axum router serves both HTTP wire contracts behind a mode flag:
//!
//! - [`HttpServerMode::Sse`]: `GET /sse` upgrades to a Server-Sent Events
//!   stream whose first event (`event: endpoint`) names the POST URL for
//!   the connection, including a fresh `sessionId`; `POST /message` feeds
//!   frames to the session and answers `202 accepted`.
//! - [`HttpServerMode::Streamable`]: a single `POST /mcp` endpoint. A
//!   request body answers with the response inline; a notification body
//!   answers `202 accepted`. `Mcp-Session-Id` binds requests to a live
//!   session; a request without the header runs a sessionless one-shot
//!   exchange (create, use, discard), except `initialize`, which creates a
//!   persistent session and returns its id in the header. `GET /mcp` opens
//!   a server-initiated event stream; `DELETE /mcp` ends the session.
//!
//! Each accepted connection gets its own session bound to a fresh channel
//! transport; the multiplexer shares nothing mutable with its sessions
//! beyond the server's read-only configuration snapshot. When a bearer
//! validator is configured, unauthenticated requests are answered
//! `401 WWW-Authenticate: Bearer realm=..., resource_metadata=...` and the
//! RFC 9728 document is served at `/.well-known/oauth-protected-resource`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use weftmcp_protocol::{McpError, McpResult, Message, RequestId};
use weftmcp_session::Session;
use weftmcp_transport::ChannelTransport;

use crate::server::Server;

/// Which HTTP wire contract to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpServerMode {
    /// Separate SSE and POST endpoints with endpoint discovery.
    Sse,
    /// The single-endpoint streamable contract.
    Streamable,
}

/// Bearer authentication for the multiplexer.
#[derive(Clone)]
pub struct HttpAuthConfig {
    /// Realm reported in the `WWW-Authenticate` challenge.
    pub realm: String,
    /// Absolute URL of the protected-resource metadata document, reported
    /// in the challenge's `resource_metadata` parameter.
    pub resource_metadata_url: String,
    /// The RFC 9728 document served at
    /// `/.well-known/oauth-protected-resource`.
    pub metadata: serde_json::Value,
    /// Validates presented bearer tokens.
    pub validate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl std::fmt::Debug for HttpAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthConfig")
            .field("realm", &self.realm)
            .field("resource_metadata_url", &self.resource_metadata_url)
            .finish_non_exhaustive()
    }
}

/// Multiplexer configuration.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Address to bind; use port 0 for an ephemeral port.
    pub bind: SocketAddr,
    /// Wire contract to serve.
    pub mode: HttpServerMode,
    /// SSE upgrade path (SSE mode).
    pub sse_path: String,
    /// Frame POST path (SSE mode).
    pub message_path: String,
    /// The single MCP endpoint path (streamable mode).
    pub mcp_path: String,
    /// How long a streamable POST waits for its inline response.
    pub inline_response_timeout: Duration,
    /// Bearer authentication; `None` serves unauthenticated.
    pub auth: Option<HttpAuthConfig>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            bind: ([127, 0, 0, 1], 0).into(),
            mode: HttpServerMode::Streamable,
            sse_path: "/sse".to_string(),
            message_path: "/message".to_string(),
            mcp_path: "/mcp".to_string(),
            inline_response_timeout: Duration::from_secs(30),
            auth: None,
        }
    }
}

/// A running HTTP multiplexer.
pub struct HttpServerHandle {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    state: Arc<HttpState>,
}

impl HttpServerHandle {
    /// The address actually bound.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections, close every session, and wait for the
    /// listener task to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.state.close_all().await;
        let _ = self.task.await;
    }
}

impl Server {
    /// Bind the HTTP multiplexer and start serving.
    pub async fn serve_http(&self, config: HttpServerConfig) -> McpResult<HttpServerHandle> {
        let listener = tokio::net::TcpListener::bind(config.bind)
            .await
            .map_err(|e| McpError::Transport(format!("bind {} failed: {e}", config.bind)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let state = Arc::new(HttpState {
            server: self.clone(),
            message_path: config.message_path.clone(),
            inline_response_timeout: config.inline_response_timeout,
            auth: config.auth.clone(),
            sessions: StdMutex::new(HashMap::new()),
        });

        let mut router = match config.mode {
            HttpServerMode::Sse => Router::new()
                .route(&config.sse_path, get(sse_get))
                .route(&config.message_path, axum::routing::post(message_post)),
            HttpServerMode::Streamable => Router::new().route(
                &config.mcp_path,
                axum::routing::post(mcp_post).get(mcp_get).delete(mcp_delete),
            ),
        };
        if state.auth.is_some() {
            router = router.route("/.well-known/oauth-protected-resource", get(well_known));
        }
        let router = router.with_state(Arc::clone(&state));

        let shutdown = CancellationToken::new();
        let serve_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(serve_shutdown.cancelled_owned());
            if let Err(e) = serve.await {
                warn!("http multiplexer stopped with error: {e}");
            }
        });

        info!("mcp http multiplexer listening on {addr} ({:?})", config.mode);
        Ok(HttpServerHandle {
            addr,
            shutdown,
            task,
            state,
        })
    }
}

struct HttpState {
    server: Server,
    message_path: String,
    inline_response_timeout: Duration,
    auth: Option<HttpAuthConfig>,
    sessions: StdMutex<HashMap<String, Arc<HttpSession>>>,
}

/// One accepted connection: the session plus the channels feeding it.
struct HttpSession {
    id: String,
    session: Session,
    to_session: mpsc::Sender<Message>,
    /// Streamable POSTs waiting for their inline response, by request id.
    inline: StdMutex<HashMap<RequestId, oneshot::Sender<Message>>>,
    /// Frames for the connection's event stream, until a consumer takes it.
    events: StdMutex<Option<mpsc::Receiver<Message>>>,
}

impl HttpState {
    /// Spawn a session bound to a fresh channel transport and start the
    /// outbound router that splits inline responses from stream traffic.
    fn spawn_session(self: &Arc<Self>, assume_initialized: bool) -> Arc<HttpSession> {
        let (to_session, from_http) = mpsc::channel::<Message>(64);
        let (to_http, mut from_session) = mpsc::channel::<Message>(64);
        let transport = ChannelTransport::new(from_http, to_http);
        let session = self
            .server
            .start_session_with(Arc::new(transport), assume_initialized);

        let (events_tx, events_rx) = mpsc::channel::<Message>(256);
        let http_session = Arc::new(HttpSession {
            id: Uuid::new_v4().to_string(),
            session,
            to_session,
            inline: StdMutex::new(HashMap::new()),
            events: StdMutex::new(Some(events_rx)),
        });

        let router_session = Arc::clone(&http_session);
        tokio::spawn(async move {
            while let Some(message) = from_session.recv().await {
                let inline_waiter = message.request_id().and_then(|id| {
                    if matches!(message, Message::Response(_) | Message::Error(_)) {
                        router_session
                            .inline
                            .lock()
                            .expect("inline mutex poisoned")
                            .remove(id)
                    } else {
                        None
                    }
                });
                match inline_waiter {
                    Some(waiter) => {
                        let _ = waiter.send(message);
                    }
                    None => {
                        // Server-initiated traffic; drop when the stream
                        // consumer is absent or slow.
                        if events_tx.try_send(message).is_err() {
                            debug!("dropping frame: no event stream consumer");
                        }
                    }
                }
            }
        });

        http_session
    }

    fn register(&self, session: &Arc<HttpSession>) {
        self.sessions
            .lock()
            .expect("sessions mutex poisoned")
            .insert(session.id.clone(), Arc::clone(session));
    }

    fn lookup(&self, id: &str) -> Option<Arc<HttpSession>> {
        self.sessions
            .lock()
            .expect("sessions mutex poisoned")
            .get(id)
            .cloned()
    }

    async fn remove_and_close(&self, id: &str) {
        let session = self
            .sessions
            .lock()
            .expect("sessions mutex poisoned")
            .remove(id);
        if let Some(session) = session {
            session.session.close().await;
            debug!("session {id} closed");
        }
    }

    async fn close_all(&self) {
        let sessions: Vec<Arc<HttpSession>> = {
            let mut map = self.sessions.lock().expect("sessions mutex poisoned");
            map.drain().map(|(_, s)| s).collect()
        };
        for session in sessions {
            session.session.close().await;
        }
    }

    /// Answer 401 with the configured challenge unless the request carries
    /// a valid bearer token.
    fn check_auth(&self, headers: &HeaderMap) -> Result<(), Response> {
        let Some(auth) = &self.auth else { return Ok(()) };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if presented.is_some_and(|token| (auth.validate)(token)) {
            return Ok(());
        }
        let challenge = format!(
            "Bearer realm=\"{}\", resource_metadata=\"{}\"",
            auth.realm, auth.resource_metadata_url
        );
        Err((
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, challenge)],
        )
            .into_response())
    }
}

/// Closes the session when the SSE response stream is dropped.
struct SessionGuard {
    state: Arc<HttpState>,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let state = Arc::clone(&self.state);
        let id = std::mem::take(&mut self.id);
        tokio::spawn(async move {
            state.remove_and_close(&id).await;
        });
    }
}

fn event_stream(
    events: mpsc::Receiver<Message>,
    guard: Option<SessionGuard>,
) -> impl futures::Stream<Item = Result<Event, Infallible>> + Send {
    futures::stream::unfold(
        (events, 0u64, guard),
        |(mut events, mut sequence, guard)| async move {
            loop {
                let message = events.recv().await?;
                let Ok(data) = message.encode() else {
                    continue;
                };
                sequence += 1;
                let event = Event::default()
                    .id(sequence.to_string())
                    .event("message")
                    .data(data);
                return Some((Ok(event), (events, sequence, guard)));
            }
        },
    )
}

fn accepted() -> Response {
    (StatusCode::ACCEPTED, "accepted").into_response()
}

async fn well_known(State(state): State<Arc<HttpState>>) -> Response {
    match &state.auth {
        Some(auth) => Json(auth.metadata.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ---- SSE mode ----------------------------------------------------------

async fn sse_get(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    if let Err(response) = state.check_auth(&headers) {
        return response;
    }

    let http_session = state.spawn_session(false);
    state.register(&http_session);
    let events = http_session
        .events
        .lock()
        .expect("events mutex poisoned")
        .take()
        .expect("fresh session events already taken");

    let endpoint = format!("{}?sessionId={}", state.message_path, http_session.id);
    debug!("sse connection {} -> {endpoint}", http_session.id);
    let guard = SessionGuard {
        state: Arc::clone(&state),
        id: http_session.id.clone(),
    };

    let first = futures::stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint))
    });
    let stream = first.chain(event_stream(events, Some(guard)));
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

async fn message_post(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    Json(message): Json<Message>,
) -> Response {
    if let Err(response) = state.check_auth(&headers) {
        return response;
    }
    let Some(session_id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "missing sessionId").into_response();
    };
    let Some(http_session) = state.lookup(&session_id) else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };
    if http_session.to_session.send(message).await.is_err() {
        return (StatusCode::GONE, "session closed").into_response();
    }
    accepted()
}

// ---- streamable mode ---------------------------------------------------

async fn mcp_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    Json(message): Json<Message>,
) -> Response {
    if let Err(response) = state.check_auth(&headers) {
        return response;
    }

    let session_header = headers
        .get("Mcp-Session-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match (session_header, message) {
        (Some(id), message) => {
            let Some(http_session) = state.lookup(&id) else {
                return (StatusCode::NOT_FOUND, "unknown session").into_response();
            };
            match message {
                Message::Request(request) => {
                    exchange_inline(&state, &http_session, Message::Request(request), true).await
                }
                other => {
                    if http_session.to_session.send(other).await.is_err() {
                        return (StatusCode::GONE, "session closed").into_response();
                    }
                    accepted()
                }
            }
        }
        (None, Message::Request(request)) if request.method == weftmcp_protocol::methods::INITIALIZE => {
            // A fresh handshake binds a new persistent session.
            let http_session = state.spawn_session(false);
            state.register(&http_session);
            exchange_inline(&state, &http_session, Message::Request(request), true).await
        }
        (None, Message::Request(request)) => {
            // Sessionless one-shot: create, use, discard.
            let http_session = state.spawn_session(true);
            let response =
                exchange_inline(&state, &http_session, Message::Request(request), false).await;
            http_session.session.close().await;
            response
        }
        (None, _) => accepted(),
    }
}

/// Feed a request into the session and wait for its correlated response to
/// return inline.
async fn exchange_inline(
    state: &Arc<HttpState>,
    http_session: &Arc<HttpSession>,
    message: Message,
    include_session_header: bool,
) -> Response {
    let id = message
        .request_id()
        .expect("exchange_inline requires a request")
        .clone();

    let (waiter_tx, waiter_rx) = oneshot::channel();
    http_session
        .inline
        .lock()
        .expect("inline mutex poisoned")
        .insert(id.clone(), waiter_tx);

    if http_session.to_session.send(message).await.is_err() {
        http_session
            .inline
            .lock()
            .expect("inline mutex poisoned")
            .remove(&id);
        return (StatusCode::GONE, "session closed").into_response();
    }

    match tokio::time::timeout(state.inline_response_timeout, waiter_rx).await {
        Ok(Ok(response)) => {
            let mut http_response = Json(response).into_response();
            if include_session_header {
                if let Ok(value) = http_session.id.parse() {
                    http_response
                        .headers_mut()
                        .insert("Mcp-Session-Id", value);
                }
            }
            http_response
        }
        Ok(Err(_)) | Err(_) => {
            http_session
                .inline
                .lock()
                .expect("inline mutex poisoned")
                .remove(&id);
            (
                StatusCode::GATEWAY_TIMEOUT,
                "timed out waiting for the session's response",
            )
                .into_response()
        }
    }
}

async fn mcp_get(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    if let Err(response) = state.check_auth(&headers) {
        return response;
    }
    let Some(id) = headers.get("Mcp-Session-Id").and_then(|v| v.to_str().ok()) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id").into_response();
    };
    let Some(http_session) = state.lookup(id) else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };
    let Some(events) = http_session
        .events
        .lock()
        .expect("events mutex poisoned")
        .take()
    else {
        return (StatusCode::CONFLICT, "event stream already open").into_response();
    };

    Sse::new(event_stream(events, None).boxed())
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn mcp_delete(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> Response {
    if let Err(response) = state.check_auth(&headers) {
        return response;
    }
    let Some(id) = headers.get("Mcp-Session-Id").and_then(|v| v.to_str().ok()) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id").into_response();
    };
    state.remove_and_close(id).await;
    StatusCode::NO_CONTENT.into_response()
}
