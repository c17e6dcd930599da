//! HTTP multiplexer tests: streamable and SSE modes, sessionless
//! one-shots, and the bearer challenge.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use weftmcp_client::ClientBuilder;
use weftmcp_protocol::types::{CallToolResult, Content};
use weftmcp_protocol::McpResult;
use weftmcp_server::{
    HttpAuthConfig, HttpServerConfig, HttpServerHandle, HttpServerMode, Server,
};
use weftmcp_transport::{HttpClientConfig, HttpClientMode, HttpClientTransport};

fn echo_server() -> Server {
    Server::builder("http-demo", "1.0.0")
        .tool(
            "echo",
            "Echoes back the input",
            json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }),
            |_ctx, args| async move {
                let message = args
                    .as_ref()
                    .and_then(|a| a.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(CallToolResult::text(format!("Echo: {message}")))
            },
        )
        .build()
}

async fn serve(mode: HttpServerMode, auth: Option<HttpAuthConfig>) -> HttpServerHandle {
    echo_server()
        .serve_http(HttpServerConfig {
            mode,
            auth,
            ..Default::default()
        })
        .await
        .expect("bind failed")
}

fn echo_args(message: &str) -> Option<Map<String, Value>> {
    let mut args = Map::new();
    args.insert("message".to_string(), json!(message));
    Some(args)
}

async fn run_echo_roundtrip(config: HttpClientConfig) -> McpResult<CallToolResult> {
    let transport = HttpClientTransport::connect(config).await.expect("connect failed");
    let client = ClientBuilder::new("http-test-client", "0.0.0").connect(transport);
    client.initialize().await?;
    let result = client.call_tool("echo", echo_args("over http")).await;
    client.close().await;
    result
}

#[tokio::test]
async fn streamable_mode_serves_a_full_session() {
    let handle = serve(HttpServerMode::Streamable, None).await;
    let config = HttpClientConfig {
        url: format!("http://{}/mcp", handle.addr()),
        mode: HttpClientMode::Streamable,
        ..Default::default()
    };

    let result = run_echo_roundtrip(config).await.unwrap();
    assert_eq!(result.content, vec![Content::text("Echo: over http")]);

    handle.shutdown().await;
}

#[tokio::test]
async fn sse_mode_serves_a_full_session() {
    let handle = serve(HttpServerMode::Sse, None).await;
    let config = HttpClientConfig {
        url: format!("http://{}/sse", handle.addr()),
        mode: HttpClientMode::Sse,
        ..Default::default()
    };

    let result = run_echo_roundtrip(config).await.unwrap();
    assert_eq!(result.content, vec![Content::text("Echo: over http")]);

    handle.shutdown().await;
}

#[tokio::test]
async fn sessionless_post_is_a_one_shot_exchange() {
    let handle = serve(HttpServerMode::Streamable, None).await;
    let url = format!("http://{}/mcp", handle.addr());
    let http = reqwest::Client::new();

    // A request without Mcp-Session-Id creates, uses, and discards an
    // ephemeral session; the response body is the response frame.
    let response = http
        .post(&url)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"message": "one shot"}}
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], json!(1));
    assert_eq!(
        body["result"]["content"][0]["text"],
        json!("Echo: one shot")
    );

    // A notification without a session answers 202 with body "accepted".
    let response = http
        .post(&url)
        .json(&json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    assert_eq!(response.text().await.unwrap(), "accepted");

    handle.shutdown().await;
}

#[tokio::test]
async fn initialize_without_header_binds_a_persistent_session() {
    let handle = serve(HttpServerMode::Streamable, None).await;
    let url = format!("http://{}/mcp", handle.addr());
    let http = reqwest::Client::new();

    let response = http
        .post(&url)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "raw", "version": "0"}
            }
        }))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let session_id = response
        .headers()
        .get("Mcp-Session-Id")
        .expect("initialize must return a session id")
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["serverInfo"]["name"], json!("http-demo"));

    // Complete the handshake and call a tool on the bound session.
    let response = http
        .post(&url)
        .header("Mcp-Session-Id", &session_id)
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let response = http
        .post(&url)
        .header("Mcp-Session-Id", &session_id)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "echo", "arguments": {"message": "bound"}}
        }))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["content"][0]["text"], json!("Echo: bound"));

    // DELETE tears the session down.
    let response = http
        .delete(&url)
        .header("Mcp-Session-Id", &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

    handle.shutdown().await;
}

#[tokio::test]
async fn missing_bearer_token_is_challenged() {
    let metadata = json!({
        "resource": "http://localhost/mcp",
        "authorization_servers": ["https://as.example.com"]
    });
    let auth = HttpAuthConfig {
        realm: "Mcp".to_string(),
        resource_metadata_url: "http://localhost/.well-known/oauth-protected-resource"
            .to_string(),
        metadata: metadata.clone(),
        validate: Arc::new(|token| token == "secret-token"),
    };
    let handle = serve(HttpServerMode::Streamable, Some(auth)).await;
    let base = format!("http://{}", handle.addr());
    let http = reqwest::Client::new();

    // No token: 401 with the Bearer challenge pointing at the metadata.
    let response = http
        .post(format!("{base}/mcp"))
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    let challenge = response
        .headers()
        .get("WWW-Authenticate")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(challenge.starts_with("Bearer realm=\"Mcp\""));
    assert!(challenge.contains("resource_metadata="));

    // The metadata document itself is served unauthenticated.
    let served: Value = http
        .get(format!("{base}/.well-known/oauth-protected-resource"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(served, metadata);

    // A valid token passes.
    let response = http
        .post(format!("{base}/mcp"))
        .bearer_auth("secret-token")
        .json(&json!({"jsonrpc": "2.0", "method": "notifications/x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    handle.shutdown().await;
}
