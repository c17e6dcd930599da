//! Dynamic client registration (RFC 7591).

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Client metadata sent to the registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Redirect URIs for the authorization-code flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uris: Option<Vec<String>>,
    /// How the client authenticates at the token endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_method: Option<String>,
    /// Grant types the client will use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_types: Option<Vec<String>>,
    /// Response types the client will use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_types: Option<Vec<String>>,
    /// Human-readable client name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Space-separated scope string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl RegistrationRequest {
    /// The registration document for an MCP client using the
    /// authorization-code flow with PKCE.
    pub fn mcp_client(client_name: &str, redirect_uri: &str, scopes: &[String]) -> Self {
        Self {
            redirect_uris: Some(vec![redirect_uri.to_string()]),
            token_endpoint_auth_method: Some("client_secret_post".to_string()),
            grant_types: Some(vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ]),
            response_types: Some(vec!["code".to_string()]),
            client_name: Some(client_name.to_string()),
            scope: (!scopes.is_empty()).then(|| scopes.join(" ")),
        }
    }
}

/// Credentials issued by the registration endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationResponse {
    /// The issued client identifier.
    pub client_id: String,
    /// The issued client secret, absent for public clients.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Seconds-since-epoch issue time.
    #[serde(default)]
    pub client_id_issued_at: Option<u64>,
    /// Seconds-since-epoch secret expiry; 0 means never.
    #[serde(default)]
    pub client_secret_expires_at: Option<u64>,
}

/// Register at the AS's registration endpoint.
pub async fn register(
    http: &reqwest::Client,
    endpoint: &str,
    request: &RegistrationRequest,
) -> AuthResult<RegistrationResponse> {
    let response = http
        .post(endpoint)
        .json(request)
        .send()
        .await
        .map_err(|e| AuthError::Registration(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Registration(format!(
            "POST {endpoint} answered {status}: {body}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| AuthError::Registration(format!("malformed registration response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_client_document_shape() {
        let request = RegistrationRequest::mcp_client(
            "my-client",
            "http://localhost:9999/callback",
            &["mcp:tools".to_string()],
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["client_name"], "my-client");
        assert_eq!(value["redirect_uris"][0], "http://localhost:9999/callback");
        assert_eq!(value["grant_types"][0], "authorization_code");
        assert_eq!(value["response_types"][0], "code");
        assert_eq!(value["scope"], "mcp:tools");
    }

    #[test]
    fn empty_scopes_are_omitted() {
        let request = RegistrationRequest::mcp_client("c", "http://localhost/cb", &[]);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("scope").is_none());
    }
}
