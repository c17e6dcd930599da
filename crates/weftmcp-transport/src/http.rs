//! HTTP client transport: SSE and streamable modes.
//!
//! Both modes share one implementation behind [`HttpClientMode`]:
//!
//! - **Sse**: a GET to the configured endpoint opens a persistent
//!   `text/event-stream`; the first `event: endpoint` record names the URL
//!   that outbound frames are POSTed to (each POST answers 202). Response
//!   frames come back on the stream.
//! - **Streamable**: every outbound frame POSTs to the single configured
//!   endpoint. A request's response is the POST's response body (JSON, or
//!   an SSE stream); notifications answer 202. A GET side channel carries
//!   server-initiated traffic when the server supports it.
//!
//! In streamable mode the server holds a request's POST open until the
//! handler finishes, so request POSTs run as background tasks; a slow
//! tool call must not stall the session's writer funnel. Notifications
//! and responses POST inline, which keeps `notifications/initialized`
//! ahead of the traffic that follows it.
//!
//! The transport captures `Mcp-Session-Id` from responses and replays it
//! on every subsequent request, tracks `Last-Event-ID` for resumable
//! reconnects, and reconnects the event stream with capped exponential
//! backoff. On a 401 it consults the configured [`BearerAuthenticator`]
//! once and retries once.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header;
use tokio::sync::{mpsc, watch, Mutex as TokioMutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;
use weftmcp_protocol::{Message, PROTOCOL_VERSION};

use crate::auth::BearerAuthenticator;
use crate::error::{TransportError, TransportResult};
use crate::sse::{SseDecoder, SseEvent};
use crate::traits::Transport;

/// Which HTTP wire contract the transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpClientMode {
    /// GET opens SSE; outbound frames POST to the discovered endpoint.
    Sse,
    /// Outbound frames POST to the single endpoint; responses arrive inline.
    Streamable,
}

/// Reconnect policy for the event stream.
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Fixed interval between attempts.
    Fixed {
        /// Interval between attempts.
        interval: Duration,
        /// Give up after this many attempts; `None` retries forever.
        max_attempts: Option<u32>,
    },
    /// Exponential backoff doubling from `base` up to `max_delay`.
    Exponential {
        /// First delay.
        base: Duration,
        /// Upper bound on the delay.
        max_delay: Duration,
        /// Give up after this many attempts; `None` retries forever.
        max_attempts: Option<u32>,
    },
    /// Never reconnect.
    Never,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: Some(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt number `attempt` (0-based), or `None` to give
    /// up.
    fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Fixed {
                interval,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    return None;
                }
                Some(*interval)
            }
            Self::Exponential {
                base,
                max_delay,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|max| attempt >= max) {
                    return None;
                }
                let millis = (base.as_millis() as u64)
                    .saturating_mul(1u64 << attempt.min(16))
                    .min(max_delay.as_millis() as u64);
                Some(Duration::from_millis(millis))
            }
            Self::Never => None,
        }
    }
}

/// HTTP client transport configuration.
#[derive(Clone)]
pub struct HttpClientConfig {
    /// The endpoint URL: the SSE endpoint in [`HttpClientMode::Sse`], the
    /// MCP endpoint in [`HttpClientMode::Streamable`].
    pub url: String,
    /// Wire contract to speak.
    pub mode: HttpClientMode,
    /// Per-request timeout for POSTs. Also bounds how long a streamable
    /// request may take end to end, since its response rides the POST.
    pub request_timeout: Duration,
    /// How long `connect` waits for the SSE endpoint event.
    pub connect_timeout: Duration,
    /// Extra headers attached to every request.
    pub headers: Vec<(String, String)>,
    /// Value of the `MCP-Protocol-Version` header.
    pub protocol_version: String,
    /// Event stream reconnect policy.
    pub retry_policy: RetryPolicy,
    /// Token source consulted for `Authorization` headers and on 401.
    pub authenticator: Option<Arc<dyn BearerAuthenticator>>,
}

impl std::fmt::Debug for HttpClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientConfig")
            .field("url", &self.url)
            .field("mode", &self.mode)
            .field("authenticator", &self.authenticator.as_ref().map(|_| "<dyn>"))
            .finish_non_exhaustive()
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/mcp".to_string(),
            mode: HttpClientMode::Streamable,
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            headers: Vec::new(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            retry_policy: RetryPolicy::default(),
            authenticator: None,
        }
    }
}

/// Shared plumbing for POSTs, cloned into background tasks.
#[derive(Clone)]
struct PostClient {
    http: reqwest::Client,
    mode: HttpClientMode,
    headers: Vec<(String, String)>,
    protocol_version: String,
    authenticator: Option<Arc<dyn BearerAuthenticator>>,
    session_id: Arc<RwLock<Option<String>>>,
    token: Arc<RwLock<Option<String>>>,
    incoming_tx: mpsc::Sender<Message>,
    shutdown: CancellationToken,
}

impl PostClient {
    async fn current_token(&self) -> Option<String> {
        if let Some(token) = self.token.read().await.clone() {
            return Some(token);
        }
        let authenticator = self.authenticator.as_ref()?;
        let token = authenticator.bearer_token().await?;
        *self.token.write().await = Some(token.clone());
        Some(token)
    }

    /// POST one encoded frame, retrying once on a 401, and route the
    /// response body (streamable mode) into the inbound channel. The body
    /// is `Bytes` so the auth-retry loop and detached request tasks clone
    /// it without copying.
    async fn post(&self, url: Url, body: Bytes) -> TransportResult<()> {
        let mut auth_retried = false;
        loop {
            let mut req = self
                .http
                .post(url.clone())
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::ACCEPT, "application/json, text/event-stream")
                .header("MCP-Protocol-Version", &self.protocol_version)
                .body(body.clone());
            if let Some(session_id) = self.session_id.read().await.as_ref() {
                req = req.header("Mcp-Session-Id", session_id);
            }
            for (name, value) in &self.headers {
                req = req.header(name, value);
            }
            if let Some(token) = self.current_token().await {
                req = req.bearer_auth(token);
            }

            let response = req
                .send()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;

            if let Some(session_id) = response
                .headers()
                .get("Mcp-Session-Id")
                .and_then(|v| v.to_str().ok())
            {
                *self.session_id.write().await = Some(session_id.to_string());
            }

            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                let challenge = response
                    .headers()
                    .get(header::WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if auth_retried {
                    return Err(TransportError::Unauthorized { challenge });
                }
                let Some(authenticator) = self.authenticator.as_ref() else {
                    return Err(TransportError::Unauthorized { challenge });
                };
                info!("401 challenge from {url}, invoking authenticator");
                let token = authenticator
                    .on_unauthorized(challenge.as_deref().unwrap_or(""), &url)
                    .await?;
                *self.token.write().await = Some(token);
                auth_retried = true;
                continue;
            }

            if !response.status().is_success() {
                return Err(TransportError::SendFailed(format!(
                    "POST {url} answered {}",
                    response.status()
                )));
            }

            if self.mode == HttpClientMode::Streamable {
                self.route_response(response).await?;
            }
            return Ok(());
        }
    }

    /// Route a streamable POST's response into the inbound channel: 202
    /// means accepted-no-body, JSON bodies are single frames, SSE bodies
    /// stream frames until they end.
    async fn route_response(&self, response: reqwest::Response) -> TransportResult<()> {
        if response.status() == reqwest::StatusCode::ACCEPTED {
            return Ok(());
        }
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("text/event-stream") {
            let mut decoder = SseDecoder::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { break };
                for event in decoder.feed(&chunk) {
                    if event.data.trim().is_empty() {
                        continue;
                    }
                    match Message::from_str(&event.data) {
                        Ok(message) => {
                            if self.incoming_tx.send(message).await.is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => warn!("discarding malformed SSE frame: {e}"),
                    }
                }
                if self.shutdown.is_cancelled() {
                    return Ok(());
                }
            }
            return Ok(());
        }

        let body: Bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
        if body.is_empty() {
            return Ok(());
        }
        match Message::from_slice(&body) {
            Ok(message) => {
                let _ = self.incoming_tx.send(message).await;
                Ok(())
            }
            Err(e) => {
                warn!("discarding malformed response frame: {e}");
                Ok(())
            }
        }
    }
}

/// HTTP client transport; see the module docs for the wire contracts.
pub struct HttpClientTransport {
    config: HttpClientConfig,
    base_url: Url,
    post_client: PostClient,
    incoming: TokioMutex<mpsc::Receiver<Message>>,
    post_url: Arc<RwLock<Option<Url>>>,
    shutdown: CancellationToken,
    pump_task: StdMutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for HttpClientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientTransport")
            .field("url", &self.config.url)
            .field("mode", &self.config.mode)
            .finish_non_exhaustive()
    }
}

impl HttpClientTransport {
    /// Connect to the server.
    ///
    /// In SSE mode this opens the event stream and waits (up to
    /// `connect_timeout`) for the server's `endpoint` event before
    /// returning, so that `send` always has a POST target. In streamable
    /// mode the GET side channel is opened best-effort and the call
    /// returns immediately.
    pub async fn connect(config: HttpClientConfig) -> TransportResult<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| TransportError::Configuration(format!("invalid endpoint URL: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Configuration(e.to_string()))?;

        let (incoming_tx, incoming_rx) = mpsc::channel(256);
        let (endpoint_tx, mut endpoint_rx) = watch::channel(false);
        let shutdown = CancellationToken::new();

        let post_client = PostClient {
            http,
            mode: config.mode,
            headers: config.headers.clone(),
            protocol_version: config.protocol_version.clone(),
            authenticator: config.authenticator.clone(),
            session_id: Arc::new(RwLock::new(None)),
            token: Arc::new(RwLock::new(None)),
            incoming_tx,
            shutdown: shutdown.clone(),
        };

        let transport = Self {
            base_url,
            post_client,
            incoming: TokioMutex::new(incoming_rx),
            post_url: Arc::new(RwLock::new(None)),
            shutdown,
            pump_task: StdMutex::new(None),
            config,
        };

        transport.spawn_pump(endpoint_tx);

        if transport.config.mode == HttpClientMode::Sse {
            let wait = async {
                while !*endpoint_rx.borrow() {
                    if endpoint_rx.changed().await.is_err() {
                        return Err(TransportError::ConnectionFailed(
                            "event stream ended before endpoint discovery".to_string(),
                        ));
                    }
                }
                Ok(())
            };
            tokio::time::timeout(transport.config.connect_timeout, wait)
                .await
                .map_err(|_| {
                    TransportError::ConnectionFailed(
                        "timed out waiting for the endpoint event".to_string(),
                    )
                })??;
        }

        Ok(transport)
    }

    fn spawn_pump(&self, endpoint_tx: watch::Sender<bool>) {
        let ctx = PumpContext {
            url: self.base_url.clone(),
            mode: self.config.mode,
            retry_policy: self.config.retry_policy.clone(),
            post_client: self.post_client.clone(),
            post_url: Arc::clone(&self.post_url),
            endpoint_tx,
        };
        let task = tokio::spawn(ctx.run());
        *self.pump_task.lock().expect("pump task mutex poisoned") = Some(task);
    }

    /// The URL outbound frames are POSTed to right now.
    async fn target_url(&self) -> TransportResult<Url> {
        match self.config.mode {
            HttpClientMode::Streamable => Ok(self.base_url.clone()),
            HttpClientMode::Sse => self.post_url.read().await.clone().ok_or_else(|| {
                TransportError::ConnectionFailed("message endpoint not discovered yet".to_string())
            }),
        }
    }
}

#[async_trait]
impl Transport for HttpClientTransport {
    async fn send(&self, message: Message) -> TransportResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        let url = self.target_url().await?;
        let body = message
            .encode()
            .map(Bytes::from)
            .map_err(|e| TransportError::SerializationFailed(e.to_string()))?;

        // A streamable request's POST stays open until the server's
        // handler finishes, so it runs detached; a POST failure there is a
        // transport failure and tears the connection down. Everything else
        // answers promptly and posts inline, preserving the order of
        // notifications relative to later traffic.
        if self.config.mode == HttpClientMode::Streamable && message.is_request() {
            let post_client = self.post_client.clone();
            tokio::spawn(async move {
                if let Err(e) = post_client.post(url, body).await {
                    error!("request POST failed: {e}");
                    post_client.shutdown.cancel();
                }
            });
            Ok(())
        } else {
            self.post_client.post(url, body).await
        }
    }

    async fn recv(&self) -> TransportResult<Option<Message>> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            biased;
            message = incoming.recv() => Ok(message),
            () = self.shutdown.cancelled() => Ok(incoming.try_recv().ok()),
        }
    }

    async fn close(&self) -> TransportResult<()> {
        self.shutdown.cancel();
        if let Some(task) = self
            .pump_task
            .lock()
            .expect("pump task mutex poisoned")
            .take()
        {
            task.abort();
        }
        Ok(())
    }

    fn endpoint(&self) -> Option<String> {
        Some(self.config.url.clone())
    }
}

/// Everything the event stream task needs, detached from the transport so
/// the task owns its state.
struct PumpContext {
    url: Url,
    mode: HttpClientMode,
    retry_policy: RetryPolicy,
    post_client: PostClient,
    post_url: Arc<RwLock<Option<Url>>>,
    endpoint_tx: watch::Sender<bool>,
}

impl PumpContext {
    async fn run(self) {
        let shutdown = self.post_client.shutdown.clone();
        let mut attempt: u32 = 0;
        let mut last_event_id: Option<String> = None;

        loop {
            if shutdown.is_cancelled() {
                return;
            }
            if attempt > 0 {
                let Some(delay) = self.retry_policy.delay(attempt - 1) else {
                    if self.mode == HttpClientMode::Sse {
                        error!("event stream reconnect attempts exhausted");
                        shutdown.cancel();
                    } else {
                        debug!("GET side channel unavailable, continuing without it");
                    }
                    return;
                };
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = shutdown.cancelled() => return,
                }
            }
            attempt += 1;

            let mut req = self
                .post_client
                .http
                .get(self.url.clone())
                .header(header::ACCEPT, "text/event-stream")
                .header("MCP-Protocol-Version", &self.post_client.protocol_version);
            if let Some(session_id) = self.post_client.session_id.read().await.as_ref() {
                req = req.header("Mcp-Session-Id", session_id);
            }
            if let Some(id) = &last_event_id {
                req = req.header("Last-Event-ID", id);
            }
            if let Some(token) = self.post_client.token.read().await.clone() {
                req = req.bearer_auth(token);
            }
            for (name, value) in &self.post_client.headers {
                req = req.header(name, value);
            }

            let response = match req.send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!("event stream connect failed: {e}");
                    continue;
                }
            };

            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                if let Some(authenticator) = &self.post_client.authenticator {
                    let challenge = response
                        .headers()
                        .get(header::WWW_AUTHENTICATE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    match authenticator.on_unauthorized(&challenge, &self.url).await {
                        Ok(token) => {
                            *self.post_client.token.write().await = Some(token);
                            continue;
                        }
                        Err(e) => {
                            error!("authenticator failed on event stream 401: {e}");
                            continue;
                        }
                    }
                }
                warn!("event stream answered 401 and no authenticator is configured");
                continue;
            }

            if !response.status().is_success() {
                debug!("event stream GET answered {}", response.status());
                continue;
            }

            if let Some(session_id) = response
                .headers()
                .get("Mcp-Session-Id")
                .and_then(|v| v.to_str().ok())
            {
                *self.post_client.session_id.write().await = Some(session_id.to_string());
            }

            info!("event stream established to {}", self.url);
            attempt = 0;

            let mut decoder = SseDecoder::new();
            let mut stream = response.bytes_stream();
            loop {
                let chunk = tokio::select! {
                    chunk = stream.next() => chunk,
                    () = shutdown.cancelled() => return,
                };
                let Some(chunk) = chunk else {
                    warn!("event stream ended");
                    break;
                };
                let Ok(chunk) = chunk else {
                    warn!("event stream read failed");
                    break;
                };
                for event in decoder.feed(&chunk) {
                    if let Some(id) = &event.id {
                        last_event_id = Some(id.clone());
                    }
                    if !self.handle_event(event).await {
                        return;
                    }
                }
            }
            attempt = 1;
        }
    }

    /// Returns false when the transport is gone and the pump should stop.
    async fn handle_event(&self, event: SseEvent) -> bool {
        match event.event_type() {
            "endpoint" => {
                let target = event.data.trim();
                match self.url.join(target) {
                    Ok(resolved) => {
                        info!("discovered message endpoint: {resolved}");
                        *self.post_url.write().await = Some(resolved);
                        let _ = self.endpoint_tx.send(true);
                    }
                    Err(e) => warn!("unresolvable endpoint event '{target}': {e}"),
                }
                true
            }
            "message" => {
                if event.data.trim().is_empty() {
                    return true;
                }
                match Message::from_str(&event.data) {
                    Ok(message) => self.post_client.incoming_tx.send(message).await.is_ok(),
                    Err(e) => {
                        warn!("discarding malformed frame from event stream: {e}");
                        true
                    }
                }
            }
            other => {
                debug!("ignoring unknown SSE event type '{other}'");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_caps_and_exhausts() {
        let policy = RetryPolicy::Exponential {
            base: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            max_attempts: Some(4),
        };
        assert_eq!(policy.delay(0), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay(1), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay(2), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay(4), None);
    }

    #[test]
    fn never_policy_gives_up_immediately() {
        assert_eq!(RetryPolicy::Never.delay(0), None);
    }

    #[tokio::test]
    async fn connect_rejects_bad_url() {
        let config = HttpClientConfig {
            url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpClientTransport::connect(config).await,
            Err(TransportError::Configuration(_))
        ));
    }
}
