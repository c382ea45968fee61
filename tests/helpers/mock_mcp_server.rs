//! Mock MCP server for integration tests.
//!
//! Speaks newline-delimited JSON-RPC 2.0 on stdin/stdout, like a real stdio
//! MCP server, with flags that inject the failure modes the client must
//! survive.
//!
//! ```bash
//! mock_mcp_server                       # answer everything
//! mock_mcp_server --garbage-before 2    # write a malformed line before reply 2
//! mock_mcp_server --split-writes        # write each reply in two flushed halves
//! mock_mcp_server --fail-initialize     # answer initialize with an error
//! mock_mcp_server --exit-after 1        # exit after handling N requests
//! mock_mcp_server --tool-error          # tools/call results carry isError
//! ```
//!
//! | Method | Reply |
//! |--------|-------|
//! | `initialize` | `{protocolVersion, capabilities, serverInfo}` |
//! | `notifications/initialized` | none |
//! | `tools/list` | `echo` and `add` |
//! | `tools/call` | `echo` returns its `text`, `add` returns `a + b` |
//! | anything else | error -32601 |

use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::time::Duration;

#[derive(Debug, Default)]
struct Options {
    /// Write a malformed line before replying to this request (1-based).
    garbage_before: usize,
    split_writes: bool,
    fail_initialize: bool,
    /// Exit once this many requests were answered (0 = never).
    exit_after: usize,
    tool_error: bool,
}

impl Options {
    fn from_args() -> Self {
        let mut options = Options::default();
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--garbage-before" => {
                    options.garbage_before =
                        args.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                }
                "--exit-after" => {
                    options.exit_after = args.next().and_then(|v| v.parse().ok()).unwrap_or(0);
                }
                "--split-writes" => options.split_writes = true,
                "--fail-initialize" => options.fail_initialize = true,
                "--tool-error" => options.tool_error = true,
                _ => {}
            }
        }
        options
    }
}

fn success(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn failure(id: &Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

fn tools() -> Value {
    json!({
        "tools": [
            {
                "name": "echo",
                "description": "Echo input back",
                "inputSchema": {
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }
            },
            {
                "name": "add",
                "description": "Add two numbers",
                "inputSchema": {
                    "type": "object",
                    "properties": { "a": { "type": "number" }, "b": { "type": "number" } }
                }
            }
        ]
    })
}

fn call_tool(options: &Options, id: &Value, params: &Value) -> Value {
    let args = &params["arguments"];
    let text = match params["name"].as_str() {
        Some("echo") => args["text"].as_str().unwrap_or_default().to_string(),
        Some("add") => {
            let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
            sum.to_string()
        }
        _ => return failure(id, -32602, "Unknown tool"),
    };
    success(
        id,
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": options.tool_error
        }),
    )
}

fn route(options: &Options, message: &Value) -> Option<Value> {
    let id = message.get("id")?;
    let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
    let reply = match message["method"].as_str().unwrap_or_default() {
        "initialize" if options.fail_initialize => failure(id, -32603, "initialize refused"),
        "initialize" => success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "mock-mcp-server", "version": "1.0.0" }
            }),
        ),
        "tools/list" => success(id, tools()),
        "tools/call" => call_tool(options, id, &params),
        _ => failure(id, -32601, "Method not found"),
    };
    Some(reply)
}

fn write_reply(out: &mut impl Write, reply: &Value, split: bool) -> io::Result<()> {
    let mut line = reply.to_string();
    line.push('\n');
    if split {
        let (head, tail) = line.split_at(line.len() / 2);
        out.write_all(head.as_bytes())?;
        out.flush()?;
        std::thread::sleep(Duration::from_millis(20));
        out.write_all(tail.as_bytes())?;
    } else {
        out.write_all(line.as_bytes())?;
    }
    out.flush()
}

fn main() {
    let options = Options::from_args();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut answered = 0usize;

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some(reply) = route(&options, &message) else {
            continue;
        };

        answered += 1;
        if options.garbage_before == answered {
            writeln!(stdout, "this is not valid json!!!").ok();
        }
        if write_reply(&mut stdout, &reply, options.split_writes).is_err() {
            break;
        }
        if options.exit_after > 0 && answered >= options.exit_after {
            std::process::exit(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_gets_no_reply() {
        let note = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(route(&Options::default(), &note).is_none());
    }

    #[test]
    fn test_echo_call() {
        let call = json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "echo", "arguments": {"text": "hi"}}
        });
        let reply = route(&Options::default(), &call).unwrap();
        assert_eq!(reply["result"]["content"][0]["text"], "hi");
    }

    #[test]
    fn test_unknown_method() {
        let call = json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"});
        let reply = route(&Options::default(), &call).unwrap();
        assert_eq!(reply["error"]["code"], -32601);
    }
}
