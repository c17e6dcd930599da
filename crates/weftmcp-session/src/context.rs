//! Per-request context handed to inbound request handlers.

use std::sync::{Arc, Mutex as StdMutex};

use tokio_util::sync::CancellationToken;
use weftmcp_protocol::methods;
use weftmcp_protocol::types::ProgressNotification;
use weftmcp_protocol::{McpError, McpResult, ProgressToken, RequestId};

use crate::session::Session;

/// Context for one inbound request.
///
/// Exposes the session (for reverse calls back to the peer), the request's
/// cancellation signal, and the parsed progress token when the caller
/// opted into progress reporting.
#[derive(Clone)]
pub struct RequestContext {
    session: Session,
    request_id: RequestId,
    method: String,
    cancellation: CancellationToken,
    progress_token: Option<ProgressToken>,
    last_progress: Arc<StdMutex<Option<f64>>>,
}

impl RequestContext {
    pub(crate) fn new(
        session: Session,
        request_id: RequestId,
        method: String,
        cancellation: CancellationToken,
        progress_token: Option<ProgressToken>,
    ) -> Self {
        Self {
            session,
            request_id,
            method,
            cancellation,
            progress_token,
            last_progress: Arc::new(StdMutex::new(None)),
        }
    }

    /// The session this request arrived on; usable for reverse calls.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Id of the request being handled.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Method name of the request being handled.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The cancellation signal for this request. Fires when the peer sends
    /// `notifications/cancelled` for this id or the session shuts down.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// The progress token from the request's `_meta`, if any.
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    /// Emit a `notifications/progress` for this request.
    ///
    /// A no-op when the caller did not supply a progress token. Progress
    /// values must be non-decreasing; a regressing value is rejected here
    /// rather than forwarded. Notifications are enqueued to the writer in
    /// the order emitted.
    pub async fn progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> McpResult<()> {
        let Some(token) = &self.progress_token else {
            return Ok(());
        };

        {
            let mut last = self.last_progress.lock().expect("progress mutex poisoned");
            if let Some(previous) = *last {
                if progress < previous {
                    return Err(McpError::invalid_params(format!(
                        "progress went backwards: {progress} < {previous}"
                    )));
                }
            }
            *last = Some(progress);
        }

        let notification = ProgressNotification {
            progress_token: token.clone(),
            progress,
            total,
            message,
        };
        self.session
            .notify(
                methods::NOTIFICATION_PROGRESS,
                Some(serde_json::to_value(notification)?),
            )
            .await
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
