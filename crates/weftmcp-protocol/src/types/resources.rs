//! Resource listing and reading bodies.

use serde::{Deserialize, Serialize};

use super::Cursor;

/// A resource the server exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Resource URI.
    pub uri: String,
    /// Machine-readable name.
    pub name: String,
    /// Human-readable display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// What the resource contains.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Params of `resources/list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResourcesRequest {
    /// Resume listing from this cursor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// Result of `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    /// One page of resources.
    pub resources: Vec<Resource>,
    /// Cursor for the next page; absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

/// Params of `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceRequest {
    /// URI of the resource to read.
    pub uri: String,
}

/// Result of `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// The contents, one entry per representation.
    pub contents: Vec<ResourceContents>,
}

/// The contents of a resource, textual or binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    /// UTF-8 text contents.
    Text {
        /// Resource URI.
        uri: String,
        /// MIME type, when known.
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// The text.
        text: String,
    },
    /// Base64-encoded binary contents.
    Blob {
        /// Resource URI.
        uri: String,
        /// MIME type, when known.
        #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// Base64 payload.
        blob: String,
    },
}

/// Params of `resources/subscribe` and `resources/unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// URI of the resource to watch.
    pub uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn text_contents_deserialize_untagged() {
        let json = r#"{"uri":"file:///a.txt","mimeType":"text/plain","text":"hi"}"#;
        let contents: ResourceContents = serde_json::from_str(json).unwrap();
        assert_eq!(
            contents,
            ResourceContents::Text {
                uri: "file:///a.txt".into(),
                mime_type: Some("text/plain".into()),
                text: "hi".into(),
            }
        );
    }

    #[test]
    fn blob_contents_deserialize_untagged() {
        let json = r#"{"uri":"file:///a.bin","blob":"aGk="}"#;
        let contents: ResourceContents = serde_json::from_str(json).unwrap();
        assert!(matches!(contents, ResourceContents::Blob { .. }));
    }
}
