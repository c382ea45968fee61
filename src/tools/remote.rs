//! Adapter exposing an MCP server tool through [`Tool`].

use super::{Tool, ToolError};
use crate::mcp::{CallToolResult, McpClient, ToolDescriptor};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A tool that forwards to `tools/call` on an MCP server.
pub struct RemoteTool {
    client: Arc<McpClient>,
    server: String,
    descriptor: ToolDescriptor,
    description: String,
}

impl RemoteTool {
    #[must_use]
    pub fn new(client: Arc<McpClient>, server: &str, descriptor: ToolDescriptor) -> Self {
        let description = descriptor
            .description
            .clone()
            .unwrap_or_else(|| format!("Tool provided by MCP server '{server}'"));
        Self {
            client,
            server: server.to_string(),
            descriptor,
            description,
        }
    }

    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }
}

/// Flattens a call result into a single string.
///
/// Text segments are concatenated. A result with no text at all is rendered
/// as JSON so nothing is silently lost.
#[must_use]
pub fn normalize(result: &CallToolResult) -> String {
    if result.has_text() {
        result.text()
    } else {
        serde_json::to_string(&result.content).unwrap_or_default()
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn usage(&self) -> String {
        self.descriptor.input_schema.to_string()
    }

    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let result = self
            .client
            .call_tool(&self.server, &self.descriptor.name, arguments)
            .await?;
        let text = normalize(&result);
        if result.is_error {
            return Err(ToolError::Remote(text));
        }
        Ok(text)
    }
}
