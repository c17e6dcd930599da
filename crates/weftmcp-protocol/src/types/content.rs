//! Content blocks shared by tools, prompts, and sampling.

use serde::{Deserialize, Serialize};

/// A single content block in a tool result, prompt message, or sampling
/// exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text payload.
        text: String,
    },
    /// Base64-encoded image data.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type, e.g. `image/png`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// An embedded resource.
    Resource {
        /// The resource contents.
        resource: super::ResourceContents,
    },
}

impl Content {
    /// Build a text content block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The text payload, if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// The role of a conversation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human or calling application.
    User,
    /// The model.
    Assistant,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn text_content_wire_shape() {
        let content = Content::text("Echo: Hello MCP!");
        assert_eq!(
            serde_json::to_value(&content).unwrap(),
            json!({"type": "text", "text": "Echo: Hello MCP!"})
        );
    }

    #[test]
    fn image_content_uses_mime_type_key() {
        let content = Content::Image {
            data: "aGk=".into(),
            mime_type: "image/png".into(),
        };
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value["mimeType"], "image/png");
    }
}
