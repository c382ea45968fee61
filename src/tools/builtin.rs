//! Built-in tools backed by the [`ExecutionSandbox`].

use super::{required_str, Tool, ToolError};
use crate::sandbox::{ExecutionSandbox, SearchQuery};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Every built-in tool, in registration order.
#[must_use]
pub fn all(sandbox: Arc<ExecutionSandbox>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ExecTool(Arc::clone(&sandbox))),
        Arc::new(ReadFileTool(Arc::clone(&sandbox))),
        Arc::new(WriteFileTool(Arc::clone(&sandbox))),
        Arc::new(ListFilesTool(Arc::clone(&sandbox))),
        Arc::new(SearchCodeTool(Arc::clone(&sandbox))),
        Arc::new(LogActivityTool(sandbox)),
    ]
}

/// Runs a validated command.
pub struct ExecTool(Arc<ExecutionSandbox>);

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Run an allow-listed command in the project root (no shell; rm moves files to a staging directory)"
    }

    fn usage(&self) -> String {
        r#"{"command": "git status"}"#.to_string()
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let command = required_str(&arguments, "command")?;
        let result = self.0.execute_command(command).await;

        match result.error {
            None => Ok(result.output),
            Some(error) if result.output.is_empty() => Err(ToolError::Execution(error)),
            Some(error) if result.output.contains(&error) => Ok(result.output),
            Some(error) => Ok(format!("{}\nError: {error}", result.output)),
        }
    }
}

/// Reads a project file.
pub struct ReadFileTool(Arc<ExecutionSandbox>);

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 file inside the project"
    }

    fn usage(&self) -> String {
        r#"{"path": "src/main.rs"}"#.to_string()
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let path = required_str(&arguments, "path")?;
        Ok(self.0.read_file(path).await?)
    }
}

/// Writes a project file.
pub struct WriteFileTool(Arc<ExecutionSandbox>);

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or overwrite a file inside the project"
    }

    fn usage(&self) -> String {
        r#"{"path": "notes/todo.md", "content": "..."}"#.to_string()
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = required_str(&arguments, "content")?;
        Ok(self.0.write_file(path, content).await?)
    }
}

/// Lists a directory.
pub struct ListFilesTool(Arc<ExecutionSandbox>);

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List a directory inside the project ('d' marks directories)"
    }

    fn usage(&self) -> String {
        r#"{"path": "."}"#.to_string()
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let path = arguments.get("path").and_then(Value::as_str).unwrap_or(".");
        Ok(self.0.list_files(path).await?)
    }
}

/// Regex search over project files.
pub struct SearchCodeTool(Arc<ExecutionSandbox>);

#[async_trait]
impl Tool for SearchCodeTool {
    fn name(&self) -> &str {
        "search_code"
    }

    fn description(&self) -> &str {
        "Search project files with a regular expression"
    }

    fn usage(&self) -> String {
        r#"{"pattern": "fn main", "case_insensitive": false, "file_pattern": "*.rs"}"#.to_string()
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let pattern = required_str(&arguments, "pattern")?;
        let query = SearchQuery {
            pattern: pattern.to_string(),
            case_insensitive: arguments
                .get("case_insensitive")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            file_pattern: arguments
                .get("file_pattern")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        let found = self.0.search_code(query).await?;
        if found.is_empty() {
            Ok("No matches found".to_string())
        } else {
            Ok(found)
        }
    }
}

/// Appends to the project activity log.
pub struct LogActivityTool(Arc<ExecutionSandbox>);

#[async_trait]
impl Tool for LogActivityTool {
    fn name(&self) -> &str {
        "log_activity"
    }

    fn description(&self) -> &str {
        "Record a note in the project activity log"
    }

    fn usage(&self) -> String {
        r#"{"message": "Refactored the parser"}"#.to_string()
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let message = required_str(&arguments, "message")?;
        Ok(self.0.log_activity(message).await?)
    }
}
