//! JSON-RPC 2.0 frame types and codec.
//!
//! Frames are one of four shapes: request, success response, error response,
//! or notification. Decode discrimination is deterministic and proceeds by
//! field presence in this order: `error`, then `result`, then `method` with
//! an id, then `method` without one. Anything else is a parse error. A
//! literal `null` id is treated as "missing" on decode and is never emitted.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{McpError, McpResult};
use crate::id::RequestId;

/// JSON-RPC version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Marker type that serializes as the literal `"2.0"` and rejects anything
/// else during deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// A request frame: carries an id and expects exactly one reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Request identifier, echoed verbatim in the reply.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters, opaque to the codec.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A success response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Id of the request being answered.
    pub id: RequestId,
    /// Result payload.
    pub result: Value,
}

/// An error response frame.
///
/// The id is optional only for the parse-error case where the offending
/// frame's id could not be recovered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    /// Protocol version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Id of the request being answered; `None` serializes as `null`.
    pub id: Option<RequestId>,
    /// The error object.
    pub error: ErrorObject,
}

/// A notification frame: no id, no reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version marker.
    pub jsonrpc: JsonRpcVersion,
    /// Method name.
    pub method: String,
    /// Notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// The wire-level error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard JSON-RPC error codes plus the MCP extension codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    /// Parse error (-32700).
    ParseError,
    /// Invalid request (-32600).
    InvalidRequest,
    /// Method not found (-32601).
    MethodNotFound,
    /// Invalid params (-32602).
    InvalidParams,
    /// Internal error (-32603).
    InternalError,
    /// Server has not completed the initialize handshake (-32002).
    ServerNotInitialized,
    /// Application-defined error.
    ApplicationError(i32),
}

impl JsonRpcErrorCode {
    /// The numeric code.
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerNotInitialized => -32002,
            Self::ApplicationError(code) => *code,
        }
    }

    /// The standard message for the code.
    pub fn message(&self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerNotInitialized => "Server not initialized",
            Self::ApplicationError(_) => "Application error",
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

impl From<JsonRpcErrorCode> for ErrorObject {
    fn from(code: JsonRpcErrorCode) -> Self {
        Self {
            code: code.code(),
            message: code.message().to_string(),
            data: None,
        }
    }
}

/// A decoded JSON-RPC frame.
#[derive(Debug, Clone)]
pub enum Message {
    /// Request expecting a reply.
    Request(JsonRpcRequest),
    /// Success response.
    Response(JsonRpcResponse),
    /// Error response.
    Error(JsonRpcErrorResponse),
    /// Fire-and-forget notification.
    Notification(JsonRpcNotification),
}

impl Message {
    /// Build a request frame.
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Request(JsonRpcRequest {
            jsonrpc: JsonRpcVersion,
            id,
            method: method.into(),
            params,
        })
    }

    /// Build a success response frame.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self::Response(JsonRpcResponse {
            jsonrpc: JsonRpcVersion,
            id,
            result,
        })
    }

    /// Build an error response frame for the given request id.
    pub fn error(id: RequestId, error: ErrorObject) -> Self {
        Self::Error(JsonRpcErrorResponse {
            jsonrpc: JsonRpcVersion,
            id: Some(id),
            error,
        })
    }

    /// Build a notification frame.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::Notification(JsonRpcNotification {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        })
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            _ => None,
        }
    }

    /// The id carried by this frame, if any.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(r) => Some(&r.id),
            Self::Response(r) => Some(&r.id),
            Self::Error(e) => e.id.as_ref(),
            Self::Notification(_) => None,
        }
    }

    /// Whether this frame expects a reply.
    pub fn is_request(&self) -> bool {
        matches!(self, Self::Request(_))
    }

    /// Decode a frame from a JSON value.
    ///
    /// Discrimination order: `error`, `result`, `method` with id, `method`
    /// without id. Arrays (JSON-RPC batches) are rejected: MCP 2025-06-18
    /// removed batching from the protocol.
    pub fn from_value(value: Value) -> McpResult<Self> {
        if value.is_array() {
            return Err(McpError::InvalidRequest(
                "batch frames are not supported".to_string(),
            ));
        }
        let Value::Object(mut obj) = value else {
            return Err(McpError::Parse("frame is not a JSON object".to_string()));
        };

        match obj.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            Some(other) => {
                return Err(McpError::InvalidRequest(format!(
                    "unsupported JSON-RPC version '{other}'"
                )));
            }
            None => {
                return Err(McpError::InvalidRequest(
                    "missing jsonrpc version field".to_string(),
                ));
            }
        }

        let id = decode_id(&mut obj)?;

        if let Some(error) = obj.remove("error") {
            let error: ErrorObject = serde_json::from_value(error)
                .map_err(|e| McpError::InvalidRequest(format!("malformed error object: {e}")))?;
            return Ok(Self::Error(JsonRpcErrorResponse {
                jsonrpc: JsonRpcVersion,
                id,
                error,
            }));
        }

        if let Some(result) = obj.remove("result") {
            let id = id.ok_or_else(|| {
                McpError::InvalidRequest("response frame is missing an id".to_string())
            })?;
            return Ok(Self::Response(JsonRpcResponse {
                jsonrpc: JsonRpcVersion,
                id,
                result,
            }));
        }

        if let Some(method) = obj.remove("method") {
            let method = method
                .as_str()
                .ok_or_else(|| McpError::InvalidRequest("method must be a string".to_string()))?
                .to_string();
            let params = obj.remove("params");
            return Ok(match id {
                Some(id) => Self::Request(JsonRpcRequest {
                    jsonrpc: JsonRpcVersion,
                    id,
                    method,
                    params,
                }),
                None => Self::Notification(JsonRpcNotification {
                    jsonrpc: JsonRpcVersion,
                    method,
                    params,
                }),
            });
        }

        Err(McpError::Parse(
            "frame has none of error, result, or method".to_string(),
        ))
    }

    /// Decode a frame from its UTF-8 JSON encoding.
    pub fn from_slice(bytes: &[u8]) -> McpResult<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| McpError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Decode a frame from a JSON string.
    pub fn from_str(json: &str) -> McpResult<Self> {
        Self::from_slice(json.as_bytes())
    }

    /// Encode this frame to a compact JSON string.
    pub fn encode(&self) -> McpResult<String> {
        serde_json::to_string(self).map_err(|e| McpError::Internal(e.to_string()))
    }
}

/// Extract and decode the `id` field, treating JSON `null` as absent.
fn decode_id(obj: &mut Map<String, Value>) -> McpResult<Option<RequestId>> {
    match obj.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| McpError::InvalidRequest(format!("malformed id: {e}"))),
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Request(r) => r.serialize(serializer),
            Self::Response(r) => r.serialize(serializer),
            Self::Error(e) => e.serialize(serializer),
            Self::Notification(n) => n.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_request() {
        let msg = Message::from_str(
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"echo"}}"#,
        )
        .unwrap();
        let Message::Request(req) = msg else {
            panic!("expected request");
        };
        assert_eq!(req.id, RequestId::Num(1));
        assert_eq!(req.method, "tools/call");
        assert_eq!(req.params, Some(json!({"name": "echo"})));
    }

    #[test]
    fn decodes_notification_without_id() {
        let msg =
            Message::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(msg, Message::Notification(_)));
    }

    #[test]
    fn null_id_means_notification() {
        let msg = Message::from_str(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert!(matches!(msg, Message::Notification(_)));
    }

    #[test]
    fn error_takes_precedence_over_result() {
        // A malformed frame carrying both fields discriminates as an error.
        let msg = Message::from_str(
            r#"{"jsonrpc":"2.0","id":3,"result":{},"error":{"code":-32601,"message":"nope"}}"#,
        )
        .unwrap();
        assert!(matches!(msg, Message::Error(_)));
    }

    #[test]
    fn result_takes_precedence_over_method() {
        let msg =
            Message::from_str(r#"{"jsonrpc":"2.0","id":3,"result":{"x":1},"method":"ping"}"#)
                .unwrap();
        assert!(matches!(msg, Message::Response(_)));
    }

    #[test]
    fn rejects_batch() {
        let err = Message::from_str(r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#).unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_wrong_version() {
        let err = Message::from_str(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_shapeless_frame() {
        let err = Message::from_str(r#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert!(matches!(err, McpError::Parse(_)));
    }

    #[test]
    fn id_form_preserved_through_encode() {
        let original = r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#;
        let msg = Message::from_str(original).unwrap();
        let encoded = msg.encode().unwrap();
        assert!(encoded.contains(r#""id":"abc""#));

        let numeric = Message::from_str(r#"{"jsonrpc":"2.0","id":17,"method":"ping"}"#).unwrap();
        assert!(numeric.encode().unwrap().contains(r#""id":17"#));
    }

    #[test]
    fn response_without_id_rejected() {
        let err = Message::from_str(r#"{"jsonrpc":"2.0","result":{}}"#).unwrap_err();
        assert!(matches!(err, McpError::InvalidRequest(_)));
    }

    #[test]
    fn serde_deserialize_delegates_to_decoder() {
        let msg: Message =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":5,"method":"ping"}"#).unwrap();
        assert!(msg.is_request());
    }
}
