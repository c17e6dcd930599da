//! The session endpoint: correlation, dispatch, and lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use weftmcp_protocol::jsonrpc::{JsonRpcNotification, JsonRpcRequest};
use weftmcp_protocol::types::{
    CancelledNotification, ClientCapabilities, Implementation, InitializeRequest, InitializeResult,
    ProgressNotification, ServerCapabilities, extract_progress_token, inject_progress_token,
};
use weftmcp_protocol::{
    methods, McpError, McpResult, Message, RequestId, PROTOCOL_VERSION,
    SUPPORTED_PROTOCOL_VERSIONS,
};
use weftmcp_transport::Transport;

use crate::context::RequestContext;
use crate::registry::{HandlerRegistry, ProgressCallback};

/// Which side of the connection this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Initiates the handshake; may expose roots and sampling.
    Client,
    /// Answers the handshake; may expose tools, prompts, and resources.
    Server,
}

/// Session lifecycle states. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Constructed, handshake not begun.
    Created,
    /// `initialize` sent (client) or received (server).
    HandshakeInProgress,
    /// Handshake complete; normal traffic flows.
    Ready,
    /// Shutting down; outstanding requests are being failed.
    Closing,
    /// Fully shut down; the transport has been released.
    Closed,
}

/// Static configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Which side of the connection we play.
    pub role: SessionRole,
    /// Our implementation info, exchanged in the handshake.
    pub info: Implementation,
    /// Capabilities advertised when playing the client role.
    pub client_capabilities: ClientCapabilities,
    /// Capabilities advertised when playing the server role.
    pub server_capabilities: ServerCapabilities,
    /// Protocol revision we offer.
    pub protocol_version: String,
    /// How long the client waits for the `initialize` response.
    pub initialize_timeout: Duration,
    /// How long `close` waits for in-flight inbound handlers to observe
    /// cancellation.
    pub shutdown_grace: Duration,
    /// Usage hints sent in the server's `initialize` result.
    pub instructions: Option<String>,
    /// Start in the `Ready` state, skipping the handshake. Used for
    /// sessionless HTTP one-shot exchanges.
    pub assume_initialized: bool,
}

impl SessionConfig {
    /// Client-role defaults.
    pub fn client(info: Implementation) -> Self {
        Self::new(SessionRole::Client, info)
    }

    /// Server-role defaults.
    pub fn server(info: Implementation) -> Self {
        Self::new(SessionRole::Server, info)
    }

    fn new(role: SessionRole, info: Implementation) -> Self {
        Self {
            role,
            info,
            client_capabilities: ClientCapabilities::default(),
            server_capabilities: ServerCapabilities::default(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            initialize_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
            instructions: None,
            assume_initialized: false,
        }
    }
}

/// What we learned about the peer during the handshake.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// The peer's implementation info.
    pub info: Implementation,
    /// The protocol revision in effect.
    pub protocol_version: String,
    /// The peer's advertised capabilities.
    pub capabilities: PeerCapabilities,
}

/// The peer's capability set, shaped by its role.
#[derive(Debug, Clone)]
pub enum PeerCapabilities {
    /// The peer is a client.
    Client(ClientCapabilities),
    /// The peer is a server.
    Server(ServerCapabilities),
}

/// Per-request options for [`Session::request_with_options`].
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Cancelling this token settles the request with
    /// [`McpError::Cancelled`] and best-effort notifies the peer.
    pub cancellation: Option<CancellationToken>,
    /// Callback for progress notifications correlated to this request.
    /// Setting it opts the request into progress via `_meta.progressToken`.
    pub on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("cancellation", &self.cancellation.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// An outstanding outbound request.
struct Pending {
    method: String,
    responder: oneshot::Sender<McpResult<Value>>,
    progress: Option<ProgressCallback>,
}

struct SessionInner {
    config: SessionConfig,
    registry: HandlerRegistry,
    transport: Arc<dyn Transport>,
    state: StdMutex<SessionState>,
    next_id: AtomicI64,
    outbound_tx: mpsc::Sender<Message>,
    pending: StdMutex<HashMap<RequestId, Pending>>,
    inbound: StdMutex<HashMap<RequestId, CancellationToken>>,
    peer: StdMutex<Option<PeerInfo>>,
    fail_reason: StdMutex<Option<McpError>>,
    /// Cancels the reader, the writer, and every inbound handler token.
    shutdown: CancellationToken,
    /// Cancelled once the session reaches `Closed`.
    done: CancellationToken,
}

/// A bidirectional, multiplexed JSON-RPC session endpoint.
///
/// Cheap to clone; all clones share the same connection. See the crate
/// docs for the task structure.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.inner.config.role)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Capacity of the writer funnel.
const OUTBOUND_BUFFER: usize = 64;

impl Session {
    /// Bind a session to a transport and start its reader and writer tasks.
    ///
    /// The session takes exclusive ownership of the transport. A client
    /// session is not usable until [`Session::initialize`] completes; a
    /// server session becomes usable when the peer's handshake does.
    pub fn start(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        registry: HandlerRegistry,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);

        let initial_state = if config.assume_initialized {
            SessionState::Ready
        } else {
            SessionState::Created
        };

        let inner = Arc::new(SessionInner {
            config,
            registry,
            transport,
            state: StdMutex::new(initial_state),
            next_id: AtomicI64::new(1),
            outbound_tx,
            pending: StdMutex::new(HashMap::new()),
            inbound: StdMutex::new(HashMap::new()),
            peer: StdMutex::new(None),
            fail_reason: StdMutex::new(None),
            shutdown: CancellationToken::new(),
            done: CancellationToken::new(),
        });

        let session = Self { inner };
        session.spawn_writer(outbound_rx);
        session.spawn_reader();
        session
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().expect("state mutex poisoned")
    }

    /// Which side of the connection we play.
    pub fn role(&self) -> SessionRole {
        self.inner.config.role
    }

    /// Whether the handshake has completed.
    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// What the handshake taught us about the peer, once `Ready`.
    pub fn peer_info(&self) -> Option<PeerInfo> {
        self.inner.peer.lock().expect("peer mutex poisoned").clone()
    }

    /// Run the client side of the initialize handshake.
    ///
    /// Sends `initialize`, waits up to the configured timeout for the
    /// result, emits `notifications/initialized`, and transitions to
    /// `Ready`. A protocol-version mismatch is logged and surfaced through
    /// the returned result but does not close the session.
    pub async fn initialize(&self) -> McpResult<InitializeResult> {
        if self.inner.config.role != SessionRole::Client {
            return Err(McpError::internal(
                "initialize is driven by the client role",
            ));
        }
        {
            let mut state = self.inner.state.lock().expect("state mutex poisoned");
            if *state != SessionState::Created {
                return Err(McpError::InvalidRequest(format!(
                    "handshake already started (state {:?})",
                    *state
                )));
            }
            *state = SessionState::HandshakeInProgress;
        }

        let request = InitializeRequest {
            protocol_version: self.inner.config.protocol_version.clone(),
            capabilities: self.inner.config.client_capabilities.clone(),
            client_info: self.inner.config.info.clone(),
        };

        let cancel = CancellationToken::new();
        let options = RequestOptions {
            cancellation: Some(cancel.clone()),
            on_progress: None,
        };
        let fut = self.send_request(
            methods::INITIALIZE,
            Some(serde_json::to_value(request)?),
            options,
        );
        tokio::pin!(fut);

        let value = tokio::select! {
            result = &mut fut => result?,
            () = tokio::time::sleep(self.inner.config.initialize_timeout) => {
                cancel.cancel();
                let _ = fut.await;
                return Err(McpError::Transport(format!(
                    "initialize timed out after {:?}",
                    self.inner.config.initialize_timeout
                )));
            }
        };

        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| McpError::InvalidParams(format!("malformed initialize result: {e}")))?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            warn!(
                "server speaks protocol {} which we do not list as supported; proceeding anyway",
                result.protocol_version
            );
        }

        *self.inner.peer.lock().expect("peer mutex poisoned") = Some(PeerInfo {
            info: result.server_info.clone(),
            protocol_version: result.protocol_version.clone(),
            capabilities: PeerCapabilities::Server(result.capabilities.clone()),
        });

        self.notify(methods::NOTIFICATION_INITIALIZED, None).await?;

        {
            let mut state = self.inner.state.lock().expect("state mutex poisoned");
            if *state == SessionState::HandshakeInProgress {
                *state = SessionState::Ready;
            }
        }

        Ok(result)
    }

    /// Send a request and await its settlement.
    pub async fn request(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        self.request_with_options(method, params, RequestOptions::default())
            .await
    }

    /// Send a request with cancellation and progress options.
    pub async fn request_with_options(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<Value> {
        match self.state() {
            SessionState::Ready => {}
            SessionState::Created | SessionState::HandshakeInProgress => {
                return Err(McpError::NotInitialized(
                    "session handshake has not completed".to_string(),
                ));
            }
            SessionState::Closing | SessionState::Closed => {
                return Err(McpError::ConnectionClosed);
            }
        }
        self.send_request(method, params, options).await
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        if self.state() >= SessionState::Closing {
            return Err(McpError::ConnectionClosed);
        }
        self.inner
            .outbound_tx
            .send(Message::notification(method, params))
            .await
            .map_err(|_| McpError::ConnectionClosed)
    }

    /// Close the session.
    ///
    /// Transitions to `Closing`, fails every outstanding request with
    /// [`McpError::ConnectionClosed`], cancels in-flight inbound handlers
    /// and waits (bounded by the configured grace period) for them to
    /// observe it, then closes the transport and transitions to `Closed`.
    /// Idempotent.
    pub async fn close(&self) {
        self.inner.shutdown_with(None).await;
    }

    /// Wait until the session is fully closed.
    ///
    /// Returns `Ok(())` after an orderly [`Session::close`], or the
    /// transport failure that tore the session down.
    pub async fn wait_closed(&self) -> McpResult<()> {
        self.inner.done.cancelled().await;
        match self
            .inner
            .fail_reason
            .lock()
            .expect("fail reason mutex poisoned")
            .clone()
        {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    // ---- internals ----------------------------------------------------

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> McpResult<Value> {
        let inner = &self.inner;
        let id = RequestId::Num(inner.next_id.fetch_add(1, Ordering::Relaxed));

        let params = if options.on_progress.is_some() {
            Some(inject_progress_token(params, &id.as_progress_token()))
        } else {
            params
        };

        let (responder, mut receiver) = oneshot::channel();
        inner.pending.lock().expect("pending mutex poisoned").insert(
            id.clone(),
            Pending {
                method: method.to_string(),
                responder,
                progress: options.on_progress,
            },
        );

        let frame = Message::request(id.clone(), method, params);
        if inner.outbound_tx.send(frame).await.is_err() || inner.shutdown.is_cancelled() {
            inner.remove_pending(&id);
            return Err(McpError::ConnectionClosed);
        }

        let cancelled = async {
            match &options.cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = &mut receiver => result.unwrap_or(Err(McpError::ConnectionClosed)),
            () = cancelled => {
                self.cancel_outbound(&id).await;
                Err(McpError::Cancelled)
            }
            () = inner.shutdown.cancelled() => {
                inner.remove_pending(&id);
                Err(McpError::ConnectionClosed)
            }
        }
    }

    /// Locally settle an outbound request as cancelled and best-effort tell
    /// the peer. Cancelling an already-settled id is a no-op and sends
    /// nothing.
    async fn cancel_outbound(&self, id: &RequestId) {
        if self.inner.remove_pending(id).is_none() {
            return;
        }
        let notification = CancelledNotification {
            request_id: id.clone(),
            reason: Some("cancelled by requester".to_string()),
        };
        let params = serde_json::to_value(notification).ok();
        let _ = self
            .inner
            .outbound_tx
            .send(Message::notification(
                methods::NOTIFICATION_CANCELLED,
                params,
            ))
            .await;
    }

    fn spawn_writer(&self, mut outbound_rx: mpsc::Receiver<Message>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    biased;
                    () = inner.shutdown.cancelled() => break,
                    message = outbound_rx.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };
                if let Err(e) = inner.transport.send(message).await {
                    warn!("transport send failed: {e}");
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        inner.shutdown_with(Some(McpError::from(e))).await;
                    });
                    break;
                }
            }
            trace!("writer funnel finished");
        });
    }

    fn spawn_reader(&self) {
        let session = self.clone();
        tokio::spawn(async move {
            let inner = Arc::clone(&session.inner);
            loop {
                let received = tokio::select! {
                    () = inner.shutdown.cancelled() => break,
                    received = inner.transport.recv() => received,
                };
                match received {
                    Ok(Some(message)) => session.handle_inbound(message).await,
                    Ok(None) => {
                        debug!("transport reached end of stream");
                        inner.shutdown_with(Some(McpError::ConnectionClosed)).await;
                        break;
                    }
                    Err(e) => {
                        warn!("transport receive failed: {e}");
                        inner.shutdown_with(Some(McpError::from(e))).await;
                        break;
                    }
                }
            }
            trace!("reader loop finished");
        });
    }

    async fn handle_inbound(&self, message: Message) {
        match message {
            Message::Response(response) => {
                self.inner.settle(&response.id, Ok(response.result));
            }
            Message::Error(error) => match error.id {
                Some(id) => self.inner.settle(&id, Err(error.error.into())),
                None => warn!(
                    "peer reported an uncorrelated error: {} (code {})",
                    error.error.message, error.error.code
                ),
            },
            Message::Notification(notification) => self.handle_notification(notification).await,
            Message::Request(request) => self.handle_request(request).await,
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            methods::NOTIFICATION_INITIALIZED => {
                if self.inner.config.role != SessionRole::Server {
                    return;
                }
                let mut state = self.inner.state.lock().expect("state mutex poisoned");
                if *state == SessionState::HandshakeInProgress {
                    *state = SessionState::Ready;
                    debug!("handshake complete, session ready");
                } else {
                    debug!("ignoring initialized notification in state {:?}", *state);
                }
            }
            methods::NOTIFICATION_CANCELLED => {
                let Some(cancelled) = notification
                    .params
                    .and_then(|p| serde_json::from_value::<CancelledNotification>(p).ok())
                else {
                    warn!("malformed cancelled notification");
                    return;
                };
                let token = self
                    .inner
                    .inbound
                    .lock()
                    .expect("inbound mutex poisoned")
                    .remove(&cancelled.request_id);
                match token {
                    Some(token) => {
                        debug!(
                            "cancelling in-flight request {} ({})",
                            cancelled.request_id,
                            cancelled.reason.as_deref().unwrap_or("no reason given")
                        );
                        token.cancel();
                    }
                    // Already completed or never existed.
                    None => debug!(
                        "cancellation for unknown or settled request {}",
                        cancelled.request_id
                    ),
                }
            }
            methods::NOTIFICATION_PROGRESS => {
                let Some(progress) = notification
                    .params
                    .and_then(|p| serde_json::from_value::<ProgressNotification>(p).ok())
                else {
                    warn!("malformed progress notification");
                    return;
                };
                let callback = {
                    let pending = self.inner.pending.lock().expect("pending mutex poisoned");
                    pending
                        .get(&progress.progress_token.as_request_id())
                        .and_then(|p| p.progress.clone())
                };
                match callback {
                    Some(callback) => callback(progress),
                    None => trace!(
                        "dropping progress for unknown token {}",
                        progress.progress_token
                    ),
                }
            }
            other => match self.inner.registry.notification_handler(other) {
                Some(handler) => {
                    let session = self.clone();
                    let params = notification.params;
                    tokio::spawn(async move {
                        handler(session, params).await;
                    });
                }
                // Per JSON-RPC, unknown notifications are dropped.
                None => debug!("ignoring unhandled notification '{other}'"),
            },
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        // Liveness checks are answered regardless of handshake state.
        if method == methods::PING {
            self.respond(Message::success(id, Value::Object(Default::default())))
                .await;
            return;
        }

        if self.inner.config.role == SessionRole::Server {
            if method == methods::INITIALIZE {
                self.handle_initialize_request(id, params).await;
                return;
            }
            if self.state() < SessionState::Ready {
                self.respond_error(
                    id,
                    McpError::NotInitialized(format!(
                        "'{method}' received before the initialize handshake completed"
                    )),
                )
                .await;
                return;
            }
        }

        if self.state() >= SessionState::Closing {
            return;
        }

        if !self.capability_advertised(&method) {
            self.respond_error(id, McpError::method_not_found(method)).await;
            return;
        }

        let Some(handler) = self.inner.registry.request_handler(&method) else {
            self.respond_error(id, McpError::method_not_found(method)).await;
            return;
        };

        let token = self.inner.shutdown.child_token();
        self.inner
            .inbound
            .lock()
            .expect("inbound mutex poisoned")
            .insert(id.clone(), token.clone());

        let ctx = RequestContext::new(
            self.clone(),
            id.clone(),
            method.clone(),
            token.clone(),
            extract_progress_token(params.as_ref()),
        );

        let session = self.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                outcome = handler(ctx, params) => Some(outcome),
                () = token.cancelled() => None,
            };

            // Claim the in-flight entry; losing the race to the canceller
            // means any late result is dropped on the floor.
            let still_inflight = session
                .inner
                .inbound
                .lock()
                .expect("inbound mutex poisoned")
                .remove(&id)
                .is_some();

            match (still_inflight, outcome) {
                (true, Some(Ok(result))) => {
                    session.respond(Message::success(id, result)).await;
                }
                (true, Some(Err(error))) => {
                    session.respond_error(id, error).await;
                }
                (true, None) => {
                    trace!("handler for {method} stopped by session shutdown");
                }
                (false, _) => {
                    debug!("dropping result of cancelled request {id}");
                }
            }
        });
    }

    async fn handle_initialize_request(&self, id: RequestId, params: Option<Value>) {
        let state = self.state();
        match state {
            SessionState::Created => {}
            SessionState::HandshakeInProgress | SessionState::Ready => {
                self.respond_error(
                    id,
                    McpError::InvalidRequest("duplicate initialize request".to_string()),
                )
                .await;
                return;
            }
            SessionState::Closing | SessionState::Closed => return,
        }

        let request: InitializeRequest = match params
            .ok_or_else(|| McpError::invalid_params("initialize requires params"))
            .and_then(|p| {
                serde_json::from_value(p)
                    .map_err(|e| McpError::InvalidParams(format!("malformed initialize params: {e}")))
            }) {
            Ok(request) => request,
            Err(e) => {
                self.respond_error(id, e).await;
                return;
            }
        };

        // Echo a version we both speak, or counter-offer our own.
        let negotiated = if SUPPORTED_PROTOCOL_VERSIONS.contains(&request.protocol_version.as_str())
        {
            request.protocol_version.clone()
        } else {
            warn!(
                "client offered unsupported protocol {}, countering with {}",
                request.protocol_version, self.inner.config.protocol_version
            );
            self.inner.config.protocol_version.clone()
        };

        *self.inner.peer.lock().expect("peer mutex poisoned") = Some(PeerInfo {
            info: request.client_info,
            protocol_version: negotiated.clone(),
            capabilities: PeerCapabilities::Client(request.capabilities),
        });

        {
            let mut state = self.inner.state.lock().expect("state mutex poisoned");
            if *state == SessionState::Created {
                *state = SessionState::HandshakeInProgress;
            }
        }

        let result = InitializeResult {
            protocol_version: negotiated,
            capabilities: self.inner.config.server_capabilities.clone(),
            server_info: self.inner.config.info.clone(),
            instructions: self.inner.config.instructions.clone(),
        };
        match serde_json::to_value(result) {
            Ok(value) => self.respond(Message::success(id, value)).await,
            Err(e) => {
                self.respond_error(id, McpError::internal(e.to_string()))
                    .await;
            }
        }
    }

    /// Whether we advertised the capability gating `method`. Methods with
    /// no capability mapping pass through to the registry.
    fn capability_advertised(&self, method: &str) -> bool {
        let config = &self.inner.config;
        match config.role {
            SessionRole::Server => {
                let caps = &config.server_capabilities;
                if method.starts_with("tools/") {
                    caps.tools.is_some()
                } else if method.starts_with("prompts/") {
                    caps.prompts.is_some()
                } else if method.starts_with("resources/") {
                    caps.resources.is_some()
                } else if method.starts_with("logging/") {
                    caps.logging.is_some()
                } else {
                    true
                }
            }
            SessionRole::Client => {
                let caps = &config.client_capabilities;
                match method {
                    methods::ROOTS_LIST => caps.roots.is_some(),
                    methods::SAMPLING_CREATE_MESSAGE => caps.sampling.is_some(),
                    _ => true,
                }
            }
        }
    }

    async fn respond(&self, message: Message) {
        // Abandon the send if shutdown wins the race; nobody is reading.
        tokio::select! {
            result = self.inner.outbound_tx.send(message) => {
                if result.is_err() {
                    debug!("response dropped: writer funnel is gone");
                }
            }
            () = self.inner.shutdown.cancelled() => {}
        }
    }

    async fn respond_error(&self, id: RequestId, error: McpError) {
        self.respond(Message::error(id, error.to_error_object())).await;
    }
}

impl SessionInner {
    fn remove_pending(&self, id: &RequestId) -> Option<Pending> {
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .remove(id)
    }

    /// Settle an outstanding request. Replies for ids we never issued (or
    /// already settled) are logged and dropped.
    fn settle(&self, id: &RequestId, outcome: McpResult<Value>) {
        match self.remove_pending(id) {
            Some(pending) => {
                trace!("settling {} ({})", id, pending.method);
                let _ = pending.responder.send(outcome);
            }
            None => debug!("dropping reply for unknown or settled id {id}"),
        }
    }

    fn fail_all_pending(&self, reason: &McpError) {
        let drained: Vec<Pending> = {
            let mut pending = self.pending.lock().expect("pending mutex poisoned");
            pending.drain().map(|(_, p)| p).collect()
        };
        for entry in drained {
            let _ = entry.responder.send(Err(reason.clone()));
        }
    }

    /// Drive the shutdown path. `reason` is `None` for an orderly close and
    /// the fatal error otherwise. Idempotent.
    async fn shutdown_with(&self, reason: Option<McpError>) {
        {
            let mut state = self.state.lock().expect("state mutex poisoned");
            if *state >= SessionState::Closing {
                return;
            }
            *state = SessionState::Closing;
        }
        if let Some(reason) = &reason {
            *self
                .fail_reason
                .lock()
                .expect("fail reason mutex poisoned") = Some(reason.clone());
        }

        // Stops the reader and writer and cancels every inbound handler's
        // child token.
        self.shutdown.cancel();

        self.fail_all_pending(&reason.unwrap_or(McpError::ConnectionClosed));

        // Give in-flight handlers a bounded window to observe cancellation.
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        loop {
            let inflight = self
                .inbound
                .lock()
                .expect("inbound mutex poisoned")
                .len();
            if inflight == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("{inflight} inbound handlers still running at shutdown deadline");
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        if let Err(e) = self.transport.close().await {
            debug!("transport close reported: {e}");
        }

        *self.state.lock().expect("state mutex poisoned") = SessionState::Closed;
        self.done.cancel();
        debug!("session closed");
    }
}
