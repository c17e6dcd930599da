//! Typed MCP message bodies.
//!
//! Everything here is a plain serde struct with camelCase wire names. The
//! session machinery consumes only the handful it needs (initialization,
//! ping, cancellation, progress, roots, sampling); the rest are typed
//! conveniences for the client and server surfaces.

mod capabilities;
mod content;
mod initialization;
mod logging;
mod prompts;
mod resources;
mod roots;
mod sampling;
mod tools;

pub use capabilities::*;
pub use content::*;
pub use initialization::*;
pub use logging::*;
pub use prompts::*;
pub use resources::*;
pub use roots::*;
pub use sampling::*;
pub use tools::*;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::{ProgressToken, RequestId};

/// Opaque pagination cursor.
pub type Cursor = String;

/// Empty result object, the reply to `ping` and friends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyResult {}

/// Params of `notifications/cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledNotification {
    /// Id of the request being cancelled.
    pub request_id: RequestId,
    /// Optional human-readable reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Params of `notifications/progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotification {
    /// Token from the originating request's `_meta.progressToken`.
    pub progress_token: ProgressToken,
    /// Monotonically non-decreasing progress value.
    pub progress: f64,
    /// Optional total, in the same unit as `progress`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Read `params._meta.progressToken` from a request's params, if present.
pub fn extract_progress_token(params: Option<&Value>) -> Option<ProgressToken> {
    let meta = params?.get("_meta")?;
    serde_json::from_value(meta.get("progressToken")?.clone()).ok()
}

/// Stamp `params._meta.progressToken` into a params value, creating the
/// params object and `_meta` map as needed.
pub fn inject_progress_token(params: Option<Value>, token: &ProgressToken) -> Value {
    let mut obj = match params {
        Some(Value::Object(obj)) => obj,
        // Non-object params cannot carry _meta; start fresh.
        _ => Map::new(),
    };
    let meta = obj
        .entry("_meta".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(meta) = meta {
        meta.insert(
            "progressToken".to_string(),
            serde_json::to_value(token).unwrap_or(Value::Null),
        );
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn progress_token_injection_round_trips() {
        let params = inject_progress_token(Some(json!({"name": "slow"})), &ProgressToken::Num(4));
        assert_eq!(params["_meta"]["progressToken"], json!(4));
        assert_eq!(
            extract_progress_token(Some(&params)),
            Some(ProgressToken::Num(4))
        );
    }

    #[test]
    fn injection_creates_params_when_absent() {
        let params = inject_progress_token(None, &ProgressToken::Str("t1".into()));
        assert_eq!(params["_meta"]["progressToken"], json!("t1"));
    }

    #[test]
    fn missing_meta_yields_no_token() {
        assert_eq!(extract_progress_token(Some(&json!({"name": "x"}))), None);
        assert_eq!(extract_progress_token(None), None);
    }

    #[test]
    fn cancelled_notification_wire_shape() {
        let n = CancelledNotification {
            request_id: RequestId::Num(2),
            reason: Some("timeout".into()),
        };
        assert_eq!(
            serde_json::to_value(&n).unwrap(),
            json!({"requestId": 2, "reason": "timeout"})
        );
    }
}
