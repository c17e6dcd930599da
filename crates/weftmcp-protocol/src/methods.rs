//! MCP method name constants.
//!
//! Dispatch sites match on these constants rather than retyping strings.

/// `initialize`: the handshake request.
pub const INITIALIZE: &str = "initialize";
/// `ping`: liveness check, answered with an empty object.
pub const PING: &str = "ping";

/// `notifications/initialized`: completes the handshake.
pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
/// `notifications/cancelled`: cooperative request cancellation.
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";
/// `notifications/progress`: progress report correlated by token.
pub const NOTIFICATION_PROGRESS: &str = "notifications/progress";
/// `notifications/message`: server log message.
pub const NOTIFICATION_MESSAGE: &str = "notifications/message";
/// `notifications/roots/list_changed`: client roots changed.
pub const NOTIFICATION_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

/// `tools/list`
pub const TOOLS_LIST: &str = "tools/list";
/// `tools/call`
pub const TOOLS_CALL: &str = "tools/call";

/// `prompts/list`
pub const PROMPTS_LIST: &str = "prompts/list";
/// `prompts/get`
pub const PROMPTS_GET: &str = "prompts/get";

/// `resources/list`
pub const RESOURCES_LIST: &str = "resources/list";
/// `resources/read`
pub const RESOURCES_READ: &str = "resources/read";
/// `resources/subscribe`
pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
/// `resources/unsubscribe`
pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";

/// `logging/setLevel`
pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";

/// `roots/list`: server asks the client for workspace roots.
pub const ROOTS_LIST: &str = "roots/list";
/// `sampling/createMessage`: server asks the client for an LLM completion.
pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
