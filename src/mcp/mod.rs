//! MCP (Model Context Protocol) client.
//!
//! Remote tool servers are reached over stdio or HTTP; callers see the same
//! [`McpClient::list_tools`] / [`McpClient::call_tool`] surface either way.

pub mod client;
pub mod framing;
pub mod protocol;
pub mod transport;

pub use client::{McpClient, TransportKind};
pub use protocol::{CallToolResult, ContentSegment, ServerInfo, ToolDescriptor};
pub use transport::{HttpTransport, StdioTransport, Transport};

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// One `[mcp.servers.<name>]` entry.
#[derive(Debug, Deserialize)]
pub struct McpServerConfig {
    #[serde(flatten)]
    pub transport: McpTransportConfig,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// How to reach a server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpTransportConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default, deserialize_with = "deserialize_token")]
        bearer_token: Option<SecretString>,
    },
}

fn deserialize_token<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let token: Option<String> = Option::deserialize(deserializer)?;
    Ok(token.map(SecretString::from))
}
