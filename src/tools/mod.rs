//! Tools the agent can call.
//!
//! Every tool, built-in or discovered on an MCP server, implements [`Tool`].
//! The [`ToolRegistry`] owns them in registration order and is the boundary
//! where failures turn into `"Error: ..."` strings: nothing past
//! [`ToolRegistry::execute`] ever sees a `Result`.
//!
//! Model output requests a tool with a single block:
//!
//! ```text
//! <tool_code>{"name": "read_file", "arguments": {"path": "README.md"}}</tool_code>
//! ```

pub mod builtin;
pub mod remote;

pub use remote::RemoteTool;

use crate::error::{WardenError, WardenResult};
use crate::mcp::McpClient;
use crate::sandbox::ExecutionSandbox;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of a single tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    /// The remote server flagged its own result as an error.
    #[error("Remote tool failed: {0}")]
    Remote(String),

    #[error(transparent)]
    Warden(#[from] WardenError),
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// One-line summary shown to the model.
    fn description(&self) -> &str;

    /// Example or schema of the expected arguments.
    fn usage(&self) -> String;

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError>;
}

/// Fetches a required string argument.
pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string field '{key}'")))
}

/// A tool request extracted from model output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(serde_json::Map::new())
}

static TOOL_CODE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<tool_code>(.*?)</tool_code>").expect("invalid regex: tool_code block")
});

/// Extracts the first `<tool_code>` block from `output`.
///
/// Returns `None` if there is no block or its body is not a valid call.
/// Only the first block is considered.
///
/// # Examples
///
/// ```
/// use warden::tools::parse_tool_call;
///
/// let call = parse_tool_call(
///     r#"Let me look. <tool_code>{"name": "list_files", "arguments": {"path": "src"}}</tool_code>"#,
/// )
/// .unwrap();
/// assert_eq!(call.name, "list_files");
/// assert_eq!(call.arguments["path"], "src");
///
/// assert!(parse_tool_call("no tool this turn").is_none());
/// ```
#[must_use]
pub fn parse_tool_call(output: &str) -> Option<ToolCall> {
    let body = TOOL_CODE_BLOCK.captures(output)?.get(1)?.as_str().trim();
    match serde_json::from_str::<ToolCall>(body) {
        Ok(mut call) => {
            if call.arguments.is_null() {
                call.arguments = empty_arguments();
            }
            Some(call)
        }
        Err(e) => {
            warn!(error = %e, "Ignoring malformed tool_code block");
            None
        }
    }
}

/// Ordered set of tools, unique by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates a registry seeded with the built-in tools.
    #[must_use]
    pub fn new(sandbox: Arc<ExecutionSandbox>) -> Self {
        let mut registry = Self::empty();
        for tool in builtin::all(sandbox) {
            registry.register(tool);
        }
        registry
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds `tool`, replacing any tool with the same name in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(index) => {
                debug!(tool = %tool.name(), "Replacing existing tool");
                self.tools[index] = tool;
            }
            None => self.tools.push(tool),
        }
    }

    /// Registers every tool `server` advertises.
    ///
    /// # Errors
    ///
    /// Returns the error from listing the server's tools.
    pub async fn register_server(
        &mut self,
        client: &Arc<McpClient>,
        server: &str,
    ) -> WardenResult<usize> {
        let descriptors = client.list_tools(server).await?;
        let count = descriptors.len();
        for descriptor in descriptors {
            self.register(Arc::new(RemoteTool::new(
                Arc::clone(client),
                server,
                descriptor,
            )));
        }
        info!(server = %server, count, "Registered MCP tools");
        Ok(count)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Renders the tool list for inclusion in a prompt.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut out = String::from("Available tools:");
        for tool in &self.tools {
            let _ = write!(
                out,
                "\n- {}: {}\n  arguments: {}",
                tool.name(),
                tool.description(),
                tool.usage()
            );
        }
        out
    }

    /// Runs `name` with `arguments`. Always returns a string.
    pub async fn execute(&self, name: &str, arguments: Value) -> String {
        let Some(tool) = self.get(name) else {
            warn!(tool = %name, "Unknown tool requested");
            return format!("Error: Unknown tool: {name}");
        };

        debug!(tool = %name, "Executing tool");
        match tool.invoke(arguments).await {
            Ok(output) => output,
            Err(e) => {
                debug!(tool = %name, error = %e, "Tool failed");
                format!("Error: {e}")
            }
        }
    }

    /// Parses `model_output` and runs the requested tool, if any.
    pub async fn dispatch(&self, model_output: &str) -> Option<String> {
        let call = parse_tool_call(model_output)?;
        Some(self.execute(&call.name, call.arguments).await)
    }
}
