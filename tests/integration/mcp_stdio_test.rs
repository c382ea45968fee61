//! Stdio MCP client against the mock server binary.

use crate::common::{mock_args, mock_server, TestContext};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_test::assert_ok;
use warden::error::ErrorKind;
use warden::mcp::{McpClient, TransportKind};
use warden::ToolRegistry;

async fn connected(flags: &[&str]) -> McpClient {
    let client = McpClient::new();
    assert_ok!(
        client
            .connect("mock", mock_server(), &mock_args(flags), &HashMap::new())
            .await
    );
    client
}

#[tokio::test]
async fn test_handshake_and_server_info() {
    let client = connected(&[]).await;

    assert!(client.is_ready("mock").await);
    assert_eq!(client.transport_kind("mock").await, Some(TransportKind::Stdio));
    let info = client.server_info("mock").await.unwrap();
    assert_eq!(info.name, "mock-mcp-server");
    assert_eq!(info.version, "1.0.0");

    client.shutdown().await;
    assert!(client.servers().await.is_empty());
}

#[tokio::test]
async fn test_list_and_call_tools() {
    let client = connected(&[]).await;

    let tools = client.list_tools("mock").await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "add"]);
    assert_eq!(tools[0].input_schema["required"], json!(["text"]));

    let echoed = client
        .call_tool("mock", "echo", json!({"text": "hello"}))
        .await
        .unwrap();
    assert_eq!(echoed.text(), "hello");
    assert!(!echoed.is_error);

    let sum = client
        .call_tool("mock", "add", json!({"a": 2, "b": 3}))
        .await
        .unwrap();
    assert_eq!(sum.text(), "5");
}

#[tokio::test]
async fn test_unknown_method_is_protocol_error() {
    let client = connected(&[]).await;
    let err = client
        .request("mock", "resources/list", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("resources/list"));
    assert!(err.to_string().contains("-32601"));
}

#[tokio::test]
async fn test_malformed_line_does_not_break_connection() {
    let client = connected(&["--garbage-before", "2"]).await;

    let tools = client.list_tools("mock").await.unwrap();
    assert_eq!(tools.len(), 2);
    let echoed = client
        .call_tool("mock", "echo", json!({"text": "still here"}))
        .await
        .unwrap();
    assert_eq!(echoed.text(), "still here");
}

#[tokio::test]
async fn test_replies_split_across_writes() {
    let client = connected(&["--split-writes"]).await;
    assert!(client.is_ready("mock").await);

    let echoed = client
        .call_tool("mock", "echo", json!({"text": "two halves"}))
        .await
        .unwrap();
    assert_eq!(echoed.text(), "two halves");
}

#[tokio::test]
async fn test_failed_handshake_leaves_degraded_server() {
    let client = connected(&["--fail-initialize"]).await;

    assert_eq!(client.servers().await, vec!["mock"]);
    assert!(!client.is_ready("mock").await);
    assert!(client.server_info("mock").await.is_none());
}

#[tokio::test]
async fn test_server_exit_fails_later_calls() {
    let client = connected(&["--exit-after", "1"]).await;
    assert!(client.is_ready("mock").await);

    let err = client.list_tools("mock").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn test_spawn_failure_registers_nothing() {
    let client = McpClient::new();
    let err = client
        .connect("ghost", "/nonexistent/mcp-server", &[], &HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(client.servers().await.is_empty());
}

#[tokio::test]
async fn test_disconnect() {
    let client = connected(&[]).await;
    assert!(client.disconnect("mock").await);
    assert!(!client.disconnect("mock").await);

    let err = client.list_tools("mock").await.unwrap_err();
    assert!(err.to_string().contains("Server not connected"));
}

#[tokio::test]
async fn test_remote_tools_through_registry() {
    let ctx = TestContext::new();
    let client = Arc::new(connected(&[]).await);
    let mut registry = ToolRegistry::new(ctx.shared_sandbox());

    let added = registry.register_server(&client, "mock").await.unwrap();
    assert_eq!(added, 2);
    assert!(registry.names().contains(&"echo"));
    assert!(registry.describe().contains("- add: Add two numbers"));

    let out = registry
        .dispatch(r#"<tool_code>{"name": "echo", "arguments": {"text": "via registry"}}</tool_code>"#)
        .await
        .unwrap();
    assert_eq!(out, "via registry");
}

#[tokio::test]
async fn test_remote_tool_error_flag() {
    let ctx = TestContext::new();
    let client = Arc::new(connected(&["--tool-error"]).await);
    let mut registry = ToolRegistry::new(ctx.shared_sandbox());
    registry.register_server(&client, "mock").await.unwrap();

    let out = registry.execute("echo", json!({"text": "boom"})).await;
    assert_eq!(out, "Error: Remote tool failed: boom");
}
