//! End-to-end client/server scenarios over in-process transports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use weftmcp_client::{Client, ClientBuilder, SamplingHandler};
use weftmcp_protocol::types::{
    CallToolResult, Content, CreateMessageRequest, CreateMessageResult, Role,
};
use weftmcp_protocol::{McpError, McpResult};
use weftmcp_server::Server;
use weftmcp_session::RequestOptions;
use weftmcp_transport::StreamTransport;

fn demo_server() -> Server {
    Server::builder("demo-server", "1.0.0")
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
                    .ok_or_else(|| McpError::invalid_params("message is required"))?
                    .to_string();
                Ok(CallToolResult::text(format!("Echo: {message}")))
            },
        )
        .tool(
            "slow",
            "Runs until cancelled",
            json!({"type": "object"}),
            |ctx, _args| async move {
                ctx.cancellation().cancelled().await;
                Err(McpError::Cancelled)
            },
        )
        .tool(
            "sampleLLM",
            "Asks the client's LLM for a completion",
            json!({
                "type": "object",
                "properties": {"prompt": {"type": "string"}},
                "required": ["prompt"]
            }),
            |ctx, args| async move {
                let prompt = args
                    .as_ref()
                    .and_then(|a| a.get("prompt"))
                    .and_then(Value::as_str)
                    .unwrap_or("hello")
                    .to_string();
                let value = ctx
                    .session()
                    .request(
                        "sampling/createMessage",
                        Some(json!({
                            "messages": [{
                                "role": "user",
                                "content": {"type": "text", "text": prompt}
                            }],
                            "maxTokens": 100
                        })),
                    )
                    .await?;
                let completion: CreateMessageResult = serde_json::from_value(value)
                    .map_err(|e| McpError::InvalidParams(e.to_string()))?;
                let text = completion
                    .content
                    .as_text()
                    .unwrap_or("<non-text completion>")
                    .to_string();
                Ok(CallToolResult::text(text))
            },
        )
        .build()
}

/// Wire a client to a server over an in-process stream pair and run the
/// handshake.
async fn connect(server: &Server, builder: ClientBuilder) -> Client {
    let (client_write, server_read) = tokio::io::duplex(64 * 1024);
    let (server_write, client_read) = tokio::io::duplex(64 * 1024);

    let _server_session = server.start_session(Arc::new(StreamTransport::new(
        server_read,
        server_write,
    )));
    let client = builder.connect(StreamTransport::new(client_read, client_write));
    client.initialize().await.expect("handshake failed");
    client
}

fn echo_args(message: &str) -> Option<Map<String, Value>> {
    let mut args = Map::new();
    args.insert("message".to_string(), json!(message));
    Some(args)
}

#[tokio::test]
async fn echo_tool_round_trips() {
    let server = demo_server();
    let client = connect(&server, ClientBuilder::new("test-client", "0.0.0")).await;

    let result = client.call_tool("echo", echo_args("Hello MCP!")).await.unwrap();
    assert!(!result.is_error);
    assert_eq!(
        result.content,
        vec![Content::text("Echo: Hello MCP!")]
    );
}

#[tokio::test]
async fn listing_paginates_until_cursor_runs_out() {
    let mut builder = Server::builder("resource-server", "1.0.0").page_size(20);
    for index in 0..100 {
        builder = builder.text_resource(
            format!("memo://resource/{index}"),
            format!("resource-{index}"),
            format!("contents of resource {index}"),
        );
    }
    let server = builder.build();
    let client = connect(&server, ClientBuilder::new("test-client", "0.0.0")).await;

    // A single page respects the configured size and carries a cursor.
    let first = client.list_resources(None).await.unwrap();
    assert_eq!(first.resources.len(), 20);
    assert!(first.next_cursor.is_some());

    // Aggregating across pages yields every entry exactly once.
    let all = client.list_all_resources().await.unwrap();
    assert_eq!(all.len(), 100);
    let mut names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), 100);

    // Reading one of them returns its text.
    let read = client.read_resource("memo://resource/7").await.unwrap();
    assert_eq!(read.contents.len(), 1);
}

struct TestSampling;

#[async_trait]
impl SamplingHandler for TestSampling {
    async fn create_message(
        &self,
        request: CreateMessageRequest,
    ) -> McpResult<CreateMessageResult> {
        assert_eq!(request.max_tokens, 100);
        Ok(CreateMessageResult {
            model: "test-model".to_string(),
            role: Role::Assistant,
            content: Content::text("Test response"),
            stop_reason: None,
        })
    }
}

#[tokio::test]
async fn server_samples_through_the_client() {
    let server = demo_server();
    let client = connect(
        &server,
        ClientBuilder::new("test-client", "0.0.0").sampling_handler(Arc::new(TestSampling)),
    )
    .await;

    let result = client
        .call_tool("sampleLLM", {
            let mut args = Map::new();
            args.insert("prompt".to_string(), json!("What is MCP?"));
            Some(args)
        })
        .await
        .unwrap();
    assert_eq!(result.content, vec![Content::text("Test response")]);
}

#[tokio::test]
async fn sampling_without_a_handler_is_method_not_found() {
    let server = demo_server();
    // No sampling handler: the capability is not advertised, so the
    // server's reverse call comes back MethodNotFound and the tool fails.
    let client = connect(&server, ClientBuilder::new("test-client", "0.0.0")).await;

    let err = client
        .call_tool("sampleLLM", None)
        .await
        .expect_err("sampleLLM should fail without a sampling handler");
    assert!(matches!(err, McpError::MethodNotFound(_)));
}

#[tokio::test]
async fn long_running_tool_observes_cancellation() {
    let server = demo_server();
    let client = connect(&server, ClientBuilder::new("test-client", "0.0.0")).await;

    let cancel = CancellationToken::new();
    let call = {
        let client = client.clone();
        let options = RequestOptions {
            cancellation: Some(cancel.clone()),
            on_progress: None,
        };
        tokio::spawn(async move { client.call_tool_with_options("slow", None, options).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let outcome = timeout(Duration::from_millis(200), call)
        .await
        .expect("caller did not observe cancellation in time")
        .unwrap();
    assert!(matches!(outcome, Err(McpError::Cancelled)));
}

#[tokio::test]
async fn hundred_concurrent_tool_calls_keep_their_messages() {
    let server = demo_server();
    let client = connect(&server, ClientBuilder::new("test-client", "0.0.0")).await;

    let mut handles = Vec::new();
    for index in 0..100 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let message = format!("message-{index}");
            let result = client.call_tool("echo", echo_args(&message)).await.unwrap();
            assert_eq!(
                result.content,
                vec![Content::text(format!("Echo: {message}"))]
            );
        }));
    }
    for handle in handles {
        timeout(Duration::from_secs(10), handle)
            .await
            .expect("tool call lost")
            .unwrap();
    }
}

#[tokio::test]
async fn unknown_tool_is_invalid_params() {
    let server = demo_server();
    let client = connect(&server, ClientBuilder::new("test-client", "0.0.0")).await;

    let err = client.call_tool("nope", None).await.unwrap_err();
    assert!(matches!(err, McpError::InvalidParams(_)));
}
