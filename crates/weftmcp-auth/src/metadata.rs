//! RFC 9728 protected-resource metadata and resource binding.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, AuthResult};

/// The protected-resource metadata document (RFC 9728).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// Canonical URI of the protected resource.
    pub resource: String,
    /// Authorization servers that may authenticate access to it.
    #[serde(default)]
    pub authorization_servers: Vec<String>,
    /// Scopes the resource understands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    /// How bearer tokens may be presented.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,
    /// Human-readable resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
}

/// The parameters of a `WWW-Authenticate: Bearer` challenge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BearerChallenge {
    /// The `realm` parameter.
    pub realm: Option<String>,
    /// The `resource_metadata` parameter: where to fetch the RFC 9728
    /// document.
    pub resource_metadata: Option<String>,
    /// The `scope` parameter.
    pub scope: Option<String>,
    /// The `error` parameter.
    pub error: Option<String>,
}

/// Parse a `WWW-Authenticate` header value as a Bearer challenge.
pub fn parse_challenge(header: &str) -> AuthResult<BearerChallenge> {
    let rest = header
        .trim()
        .strip_prefix("Bearer")
        .or_else(|| header.trim().strip_prefix("bearer"))
        .ok_or_else(|| AuthError::Challenge(format!("not a Bearer challenge: '{header}'")))?;

    let mut challenge = BearerChallenge::default();
    for part in rest.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match name.trim() {
            "realm" => challenge.realm = Some(value),
            "resource_metadata" => challenge.resource_metadata = Some(value),
            "scope" => challenge.scope = Some(value),
            "error" => challenge.error = Some(value),
            _ => {}
        }
    }
    Ok(challenge)
}

/// Canonical form used for resource binding: lowercase scheme and host,
/// port dropped, trailing slash trimmed.
pub fn canonical_resource(url: &Url) -> String {
    let scheme = url.scheme().to_lowercase();
    let host = url.host_str().unwrap_or_default().to_lowercase();
    let path = url.path().trim_end_matches('/');
    format!("{scheme}://{host}{path}")
}

/// Fetch the protected-resource metadata document.
pub async fn fetch(
    http: &reqwest::Client,
    metadata_url: &Url,
) -> AuthResult<ProtectedResourceMetadata> {
    let response = http
        .get(metadata_url.clone())
        .send()
        .await
        .map_err(|e| AuthError::ResourceMetadata(e.to_string()))?;
    if !response.status().is_success() {
        return Err(AuthError::ResourceMetadata(format!(
            "GET {metadata_url} answered {}",
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| AuthError::ResourceMetadata(format!("malformed document: {e}")))
}

/// Verify that the metadata's `resource` names the URL we actually used.
///
/// On mismatch nothing may be cached and no token may be sent.
pub fn validate_binding(metadata: &ProtectedResourceMetadata, used: &Url) -> AuthResult<()> {
    let advertised_url = Url::parse(&metadata.resource).map_err(|e| {
        AuthError::ResourceMetadata(format!("unparseable resource '{}': {e}", metadata.resource))
    })?;
    let advertised = canonical_resource(&advertised_url);
    let used = canonical_resource(used);
    if advertised == used {
        Ok(())
    } else {
        Err(AuthError::ResourceMismatch { advertised, used })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_the_standard_challenge() {
        let challenge = parse_challenge(
            "Bearer realm=\"Mcp\", resource_metadata=\"https://rs/.well-known/oauth-protected-resource\"",
        )
        .unwrap();
        assert_eq!(challenge.realm.as_deref(), Some("Mcp"));
        assert_eq!(
            challenge.resource_metadata.as_deref(),
            Some("https://rs/.well-known/oauth-protected-resource")
        );
    }

    #[test]
    fn rejects_non_bearer_schemes() {
        assert!(parse_challenge("Basic realm=\"x\"").is_err());
    }

    #[test]
    fn canonicalization_drops_port_and_trailing_slash() {
        let url = Url::parse("HTTPS://RS.Example.COM:8443/mcp/").unwrap();
        assert_eq!(canonical_resource(&url), "https://rs.example.com/mcp");
    }

    #[test]
    fn binding_accepts_equivalent_urls() {
        let metadata = ProtectedResourceMetadata {
            resource: "https://rs.example.com/mcp".into(),
            authorization_servers: vec![],
            scopes_supported: None,
            bearer_methods_supported: None,
            resource_name: None,
        };
        let used = Url::parse("https://rs.example.com:443/mcp/").unwrap();
        assert!(validate_binding(&metadata, &used).is_ok());
    }

    #[test]
    fn binding_rejects_a_different_host() {
        let metadata = ProtectedResourceMetadata {
            resource: "https://other.example.com/mcp".into(),
            authorization_servers: vec![],
            scopes_supported: None,
            bearer_methods_supported: None,
            resource_name: None,
        };
        let used = Url::parse("https://rs.example.com/mcp").unwrap();
        assert!(matches!(
            validate_binding(&metadata, &used),
            Err(AuthError::ResourceMismatch { .. })
        ));
    }
}
