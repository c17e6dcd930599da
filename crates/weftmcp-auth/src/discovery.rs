//! Authorization-server metadata discovery (RFC 8414 / OIDC).

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{AuthError, AuthResult};

/// Well-known locations tried in order.
const WELL_KNOWN_PATHS: &[&str] = &[
    "/.well-known/openid-configuration",
    "/.well-known/oauth-authorization-server",
];

/// Authorization-server metadata, after defaults are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// The AS issuer identifier.
    pub issuer: String,
    /// Where the authorization-code flow starts.
    pub authorization_endpoint: String,
    /// Where codes and refresh tokens are exchanged.
    pub token_endpoint: String,
    /// RFC 7591 registration endpoint, when offered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,
    /// Defaults to `["code"]`.
    #[serde(default)]
    pub response_types_supported: Option<Vec<String>>,
    /// Defaults to `["authorization_code", "refresh_token"]`.
    #[serde(default)]
    pub grant_types_supported: Option<Vec<String>>,
    /// Defaults to `["client_secret_post"]`.
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
    /// Defaults to `["S256"]`.
    #[serde(default)]
    pub code_challenge_methods_supported: Option<Vec<String>>,
    /// Scopes the AS understands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
}

impl AuthorizationServerMetadata {
    /// Fill the RFC 8414 default values for any field the document omitted.
    pub fn fill_defaults(&mut self) {
        self.response_types_supported
            .get_or_insert_with(|| vec!["code".to_string()]);
        self.grant_types_supported.get_or_insert_with(|| {
            vec!["authorization_code".to_string(), "refresh_token".to_string()]
        });
        self.token_endpoint_auth_methods_supported
            .get_or_insert_with(|| vec!["client_secret_post".to_string()]);
        self.code_challenge_methods_supported
            .get_or_insert_with(|| vec!["S256".to_string()]);
    }
}

/// Fetch the AS metadata, trying the OIDC location first and the RFC 8414
/// location second.
pub async fn discover(
    http: &reqwest::Client,
    issuer: &Url,
) -> AuthResult<AuthorizationServerMetadata> {
    for path in WELL_KNOWN_PATHS {
        let url = issuer
            .join(path)
            .map_err(|e| AuthError::Discovery(format!("cannot build {path} for {issuer}: {e}")))?;
        let response = match http.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("discovery fetch {url} failed: {e}");
                continue;
            }
        };
        if !response.status().is_success() {
            debug!("discovery fetch {url} answered {}", response.status());
            continue;
        }
        match response.json::<AuthorizationServerMetadata>().await {
            Ok(mut metadata) => {
                metadata.fill_defaults();
                return Ok(metadata);
            }
            Err(e) => {
                debug!("discovery document at {url} is malformed: {e}");
            }
        }
    }
    Err(AuthError::Discovery(format!(
        "no metadata document at any well-known location under {issuer}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_fill_only_missing_fields() {
        let mut metadata = AuthorizationServerMetadata {
            issuer: "https://as.example.com".into(),
            authorization_endpoint: "https://as.example.com/authorize".into(),
            token_endpoint: "https://as.example.com/token".into(),
            registration_endpoint: None,
            response_types_supported: Some(vec!["code".into(), "token".into()]),
            grant_types_supported: None,
            token_endpoint_auth_methods_supported: None,
            code_challenge_methods_supported: None,
            scopes_supported: None,
        };
        metadata.fill_defaults();

        assert_eq!(
            metadata.response_types_supported.unwrap(),
            vec!["code".to_string(), "token".to_string()]
        );
        assert_eq!(
            metadata.grant_types_supported.unwrap(),
            vec!["authorization_code".to_string(), "refresh_token".to_string()]
        );
        assert_eq!(
            metadata.token_endpoint_auth_methods_supported.unwrap(),
            vec!["client_secret_post".to_string()]
        );
        assert_eq!(
            metadata.code_challenge_methods_supported.unwrap(),
            vec!["S256".to_string()]
        );
    }
}
