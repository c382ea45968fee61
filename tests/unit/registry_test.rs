//! ToolRegistry with the built-in tools.

use crate::common::TestContext;
use pretty_assertions::assert_eq;
use serde_json::json;
use warden::ToolRegistry;

#[test]
fn test_builtins_are_seeded_in_order() {
    let ctx = TestContext::new();
    let registry = ToolRegistry::new(ctx.shared_sandbox());
    assert_eq!(
        registry.names(),
        vec!["exec", "read_file", "write_file", "list_files", "search_code", "log_activity"]
    );
    assert!(registry.describe().contains("- exec:"));
}

#[tokio::test]
async fn test_dispatch_write_then_read() {
    let ctx = TestContext::new();
    let registry = ToolRegistry::new(ctx.shared_sandbox());

    let written = registry
        .dispatch(
            r#"I'll save it.
<tool_code>{"name": "write_file", "arguments": {"path": "notes/plan.md", "content": "step one"}}</tool_code>"#,
        )
        .await
        .unwrap();
    assert_eq!(written, "Wrote 8 bytes to notes/plan.md");

    let read = registry
        .execute("read_file", json!({"path": "notes/plan.md"}))
        .await;
    assert_eq!(read, "step one");
}

#[tokio::test]
async fn test_errors_become_strings() {
    let ctx = TestContext::new();
    let registry = ToolRegistry::new(ctx.shared_sandbox());

    let out = registry
        .execute("read_file", json!({"path": "../secret"}))
        .await;
    assert!(out.starts_with("Error: "), "{out}");

    let out = registry.execute("exec", json!({"command": "sudo ls"})).await;
    assert_eq!(out, "Error: Command not allowed: sudo");

    let out = registry.execute("write_file", json!({"path": "x"})).await;
    assert_eq!(out, "Error: Invalid arguments: missing string field 'content'");
}

#[tokio::test]
async fn test_search_and_list_through_registry() {
    let ctx = TestContext::new();
    ctx.create_file("src/lib.rs", "pub fn answer() -> u32 { 42 }\n");
    let registry = ToolRegistry::new(ctx.shared_sandbox());

    let found = registry
        .execute("search_code", json!({"pattern": "fn answer", "file_pattern": "*.rs"}))
        .await;
    assert_eq!(found, "src/lib.rs:1: pub fn answer() -> u32 { 42 }");

    let listing = registry.execute("list_files", json!({})).await;
    assert_eq!(listing, "d src");
}

#[tokio::test]
async fn test_log_activity_tool() {
    let ctx = TestContext::new();
    let registry = ToolRegistry::new(ctx.shared_sandbox());
    let out = registry
        .execute("log_activity", json!({"message": "started refactor"}))
        .await;
    assert_eq!(out, "Logged activity to .warden/activity.log");

    let log = std::fs::read_to_string(ctx.path().join(".warden/activity.log")).unwrap();
    assert!(log.contains("started refactor"));
}

#[tokio::test]
async fn test_no_tool_call_this_turn() {
    let ctx = TestContext::new();
    let registry = ToolRegistry::new(ctx.shared_sandbox());
    assert!(registry.dispatch("All done, nothing to run.").await.is_none());
    assert!(registry
        .dispatch("<tool_code>not json</tool_code>")
        .await
        .is_none());
}
