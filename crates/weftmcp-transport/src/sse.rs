//! Server-Sent Events encoding and decoding.
//!
//! Pure, no-I/O SSE support shared by the HTTP client transport and the
//! HTTP server. Events are fields separated by newlines and terminated by
//! a blank line:
//!
//! ```text
//! id: 42
//! event: message
//! data: {"jsonrpc":"2.0", ...}
//!
//! ```

/// A single Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event id, replayed via `Last-Event-ID` on reconnect.
    pub id: Option<String>,
    /// Event type; readers treat a missing type as `message`.
    pub event: Option<String>,
    /// Event data. Multiple `data:` lines are joined with `\n`.
    pub data: String,
    /// Retry interval hint in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// An event with only data.
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: data.into(),
            retry: None,
        }
    }

    /// An event with an explicit type.
    pub fn typed(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: Some(event.into()),
            data: data.into(),
            retry: None,
        }
    }

    /// The effective event type, defaulting to `message`.
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }

    /// Encode this event in wire format, including the terminating blank
    /// line.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(id) = &self.id {
            out.push_str("id: ");
            out.push_str(id);
            out.push('\n');
        }
        if let Some(event) = &self.event {
            out.push_str("event: ");
            out.push_str(event);
            out.push('\n');
        }
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        if let Some(retry) = self.retry {
            out.push_str(&format!("retry: {retry}\n"));
        }
        out.push('\n');
        out
    }
}

/// Incremental SSE decoder fed with byte chunks off the wire.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(pos) = self.find_event_boundary() {
            let raw: String = self.buffer.drain(..pos.end).collect();
            let raw = &raw[..pos.start];
            if let Some(event) = parse_event(raw) {
                events.push(event);
            }
        }
        events
    }

    fn find_event_boundary(&self) -> Option<EventBoundary> {
        let lf = self.buffer.find("\n\n").map(|i| EventBoundary {
            start: i,
            end: i + 2,
        });
        let crlf = self.buffer.find("\r\n\r\n").map(|i| EventBoundary {
            start: i,
            end: i + 4,
        });
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.start <= b.start { a } else { b }),
            (a, b) => a.or(b),
        }
    }
}

struct EventBoundary {
    start: usize,
    end: usize,
}

/// Parse one event block. Returns `None` for comment-only or empty blocks.
fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut id = None;
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();
    let mut retry = None;

    for line in raw.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.find(':') {
            Some(pos) => (&line[..pos], line[pos + 1..].strip_prefix(' ').unwrap_or(&line[pos + 1..])),
            None => (line, ""),
        };
        match field {
            "id" => id = Some(value.to_string()),
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value),
            "retry" => retry = value.parse().ok(),
            _ => {}
        }
    }

    if id.is_none() && event.is_none() && data_lines.is_empty() && retry.is_none() {
        return None;
    }

    Some(SseEvent {
        id,
        event,
        data: data_lines.join("\n"),
        retry,
    })
}
