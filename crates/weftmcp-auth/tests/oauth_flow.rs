//! OAuth flow tests against a mock resource server and authorization
//! server.

use std::sync::{Arc, Mutex};

use serde_json::json;
use url::Url;
use weftmcp_auth::{AuthError, AuthorizationRedirect, OAuthClient, OAuthConfig};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mounts a provider that plays both the protected resource and the
/// authorization server.
async fn mock_provider(resource_override: Option<&str>) -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();

    let resource = resource_override
        .map(str::to_string)
        .unwrap_or_else(|| format!("{base}/mcp"));
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-protected-resource"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resource": resource,
            "authorization_servers": [base],
        })))
        .mount(&server)
        .await;

    // The OIDC location is absent; discovery must fall back to the
    // RFC 8414 location.
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
            "registration_endpoint": format!("{base}/register"),
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "client_id": "dyn-client-1",
            "client_secret": "dyn-secret",
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-123",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt-456",
            "scope": "mcp",
        })))
        .mount(&server)
        .await;

    server
}

fn capturing_redirect(seen: Arc<Mutex<Option<Url>>>) -> AuthorizationRedirect {
    Arc::new(move |url| {
        *seen.lock().unwrap() = Some(url);
        Box::pin(async move { Ok("code-1".to_string()) })
    })
}

fn challenge_for(base: &str) -> String {
    format!(
        "Bearer realm=\"Mcp\", resource_metadata=\"{base}/.well-known/oauth-protected-resource\""
    )
}

#[tokio::test]
async fn full_unauthorized_flow_yields_a_token() {
    let provider = mock_provider(None).await;
    let base = provider.uri();
    let request_url = Url::parse(&format!("{base}/mcp")).unwrap();

    let seen_authorize_url = Arc::new(Mutex::new(None));
    let client = OAuthClient::new(
        OAuthConfig {
            scopes: vec!["mcp".to_string()],
            ..Default::default()
        },
        capturing_redirect(Arc::clone(&seen_authorize_url)),
    )
    .unwrap();

    let token = client
        .handle_unauthorized(&challenge_for(&base), &request_url)
        .await
        .unwrap();
    assert_eq!(token.access_token, "at-123");
    assert_eq!(token.refresh_token.as_deref(), Some("rt-456"));

    // The authorization URL carried PKCE and the dynamically registered
    // client id.
    let authorize_url = seen_authorize_url.lock().unwrap().clone().unwrap();
    let query: Vec<(String, String)> = authorize_url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let get = |name: &str| {
        query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    };
    assert_eq!(get("response_type"), Some("code"));
    assert_eq!(get("client_id"), Some("dyn-client-1"));
    assert_eq!(get("code_challenge_method"), Some("S256"));
    assert!(get("code_challenge").is_some_and(|c| !c.is_empty()));
    assert!(get("resource").is_some_and(|r| r.ends_with("/mcp")));

    // The fresh token is now served from the cache.
    assert_eq!(client.token().await.as_deref(), Some("at-123"));
}

#[tokio::test]
async fn mismatched_resource_metadata_is_rejected_and_nothing_cached() {
    let provider = mock_provider(Some("https://attacker.example.com/mcp")).await;
    let base = provider.uri();
    let request_url = Url::parse(&format!("{base}/mcp")).unwrap();

    let client = OAuthClient::new(
        OAuthConfig::default(),
        capturing_redirect(Arc::new(Mutex::new(None))),
    )
    .unwrap();

    let err = client
        .handle_unauthorized(&challenge_for(&base), &request_url)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::ResourceMismatch { .. }));

    // No token was cached and none may be sent.
    assert_eq!(client.token().await, None);
}

#[tokio::test]
async fn missing_registration_endpoint_without_client_id_fails() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-protected-resource"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resource": format!("{base}/mcp"),
            "authorization_servers": [base],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
        })))
        .mount(&server)
        .await;

    let request_url = Url::parse(&format!("{base}/mcp")).unwrap();
    let client = OAuthClient::new(
        OAuthConfig::default(),
        capturing_redirect(Arc::new(Mutex::new(None))),
    )
    .unwrap();

    let err = client
        .handle_unauthorized(&challenge_for(&base), &request_url)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoClientId));
}

#[tokio::test]
async fn preconfigured_client_id_skips_registration() {
    let provider = mock_provider(None).await;
    let base = provider.uri();
    let request_url = Url::parse(&format!("{base}/mcp")).unwrap();

    let seen_authorize_url = Arc::new(Mutex::new(None));
    let client = OAuthClient::new(
        OAuthConfig {
            client_id: Some("preconfigured-id".to_string()),
            ..Default::default()
        },
        capturing_redirect(Arc::clone(&seen_authorize_url)),
    )
    .unwrap();

    client
        .handle_unauthorized(&challenge_for(&base), &request_url)
        .await
        .unwrap();

    let authorize_url = seen_authorize_url.lock().unwrap().clone().unwrap();
    assert!(authorize_url
        .query_pairs()
        .any(|(k, v)| k == "client_id" && v == "preconfigured-id"));
    // The /register mock exists but must not have been hit.
    let requests = provider.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() != "/register"));
}
