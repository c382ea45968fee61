//! Connection manager for MCP servers.
//!
//! [`McpClient`] owns every live connection and the request id counter.
//! Nothing is global: independent clients never share ids or servers.
//!
//! # Example
//!
//! ```ignore
//! use warden::mcp::McpClient;
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> warden::error::WardenResult<()> {
//!     let client = McpClient::new();
//!     client.connect("files", "files-mcp", &[], &HashMap::new()).await?;
//!
//!     for tool in client.list_tools("files").await? {
//!         println!("{}", tool.name);
//!     }
//!     let result = client.call_tool("files", "read", json!({"path": "README.md"})).await?;
//!     println!("{}", result.text());
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

use super::protocol::{
    initialize_params, CallToolResult, ListToolsResult, ServerInfo, ToolDescriptor,
};
use super::transport::{HttpTransport, StdioTransport, Transport};
use super::{McpServerConfig, McpTransportConfig};
use crate::error::{WardenError, WardenResult};
use futures::future::join_all;
use once_cell::sync::OnceCell;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Which transport a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Stdio,
    Http,
}

struct McpConnection {
    kind: TransportKind,
    transport: Arc<dyn Transport>,
    ready: AtomicBool,
    server_info: OnceCell<ServerInfo>,
}

/// Manages named MCP server connections.
pub struct McpClient {
    connections: RwLock<HashMap<String, Arc<McpConnection>>>,
    next_id: AtomicU64,
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl McpClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Spawns a stdio server and performs the handshake.
    ///
    /// A failed handshake is logged and leaves the server registered but not
    /// ready; see [`is_ready`](Self::is_ready).
    ///
    /// # Errors
    ///
    /// Returns a transport error if the process cannot be spawned.
    pub async fn connect(
        &self,
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> WardenResult<()> {
        info!(server = %name, command = %command, ?args, "Starting MCP server");
        let transport = StdioTransport::spawn(name, command, args, env).map_err(|e| {
            error!(server = %name, error = %e, "Failed to start MCP server");
            e
        })?;
        self.attach(name, transport).await;
        Ok(())
    }

    /// Registers an already-running stdio transport and performs the
    /// handshake on it.
    pub async fn attach(&self, name: &str, transport: StdioTransport) {
        let connection = self
            .register(name, TransportKind::Stdio, Arc::new(transport))
            .await;

        match self.handshake(name, &connection).await {
            Ok(()) => {
                if let Err(e) = connection
                    .transport
                    .notify("notifications/initialized", json!({}))
                    .await
                {
                    warn!(server = %name, error = %e, "Failed to send initialized notification");
                }
                connection.ready.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                error!(
                    server = %name,
                    error = %e,
                    "MCP handshake failed; server left connected but degraded"
                );
            }
        }
    }

    /// Connects to an HTTP server and performs the handshake.
    ///
    /// # Errors
    ///
    /// Returns the handshake error. The server is not left registered.
    pub async fn connect_http(
        &self,
        name: &str,
        url: &str,
        token: Option<SecretString>,
    ) -> WardenResult<()> {
        info!(server = %name, url = %url, "Connecting to MCP HTTP server");
        let transport = HttpTransport::new(name, url, token)?;
        let connection = self
            .register(name, TransportKind::Http, Arc::new(transport))
            .await;

        if let Err(e) = self.handshake(name, &connection).await {
            error!(server = %name, error = %e, "MCP handshake failed; removing server");
            self.connections.write().await.remove(name);
            return Err(e);
        }
        connection.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn register(
        &self,
        name: &str,
        kind: TransportKind,
        transport: Arc<dyn Transport>,
    ) -> Arc<McpConnection> {
        let connection = Arc::new(McpConnection {
            kind,
            transport,
            ready: AtomicBool::new(false),
            server_info: OnceCell::new(),
        });
        let previous = self
            .connections
            .write()
            .await
            .insert(name.to_string(), Arc::clone(&connection));
        if let Some(previous) = previous {
            debug!(server = %name, "Replacing existing connection");
            previous.transport.close().await;
        }
        connection
    }

    async fn handshake(&self, name: &str, connection: &McpConnection) -> WardenResult<()> {
        let result = connection
            .transport
            .request(self.next_request_id(), "initialize", initialize_params())
            .await?;

        let info: ServerInfo = result
            .get("serverInfo")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        info!(
            server = %name,
            remote_name = %info.name,
            remote_version = %info.version,
            "MCP server initialized"
        );
        let _ = connection.server_info.set(info);
        Ok(())
    }

    /// Connects every enabled server in `servers`, returning the names that
    /// completed their handshake.
    ///
    /// Failures are logged and skipped.
    pub async fn connect_configured(&self, servers: &BTreeMap<String, McpServerConfig>) -> Vec<String> {
        let mut ready = Vec::new();
        for (name, config) in servers {
            if !config.enabled {
                debug!(server = %name, "Skipping disabled MCP server");
                continue;
            }

            let connected = match &config.transport {
                McpTransportConfig::Stdio { command, args, env } => {
                    self.connect(name, command, args, env).await
                }
                McpTransportConfig::Http { url, bearer_token } => {
                    let token = bearer_token
                        .as_ref()
                        .map(|t| SecretString::from(t.expose_secret().to_string()));
                    self.connect_http(name, url, token).await
                }
            };

            match connected {
                Ok(()) if self.is_ready(name).await => ready.push(name.clone()),
                Ok(()) => {}
                Err(e) => warn!(server = %name, error = %e, "Skipping MCP server"),
            }
        }
        ready
    }

    async fn connection(&self, server: &str, method: &str) -> WardenResult<Arc<McpConnection>> {
        self.connections
            .read()
            .await
            .get(server)
            .cloned()
            .ok_or_else(|| WardenError::transport(server, method, "Server not connected"))
    }

    /// Sends a raw call to `server`.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the server is unknown or unreachable, or
    /// a protocol error if it replies with one.
    pub async fn request(&self, server: &str, method: &str, params: Value) -> WardenResult<Value> {
        let connection = self.connection(server, method).await?;
        connection
            .transport
            .request(self.next_request_id(), method, params)
            .await
    }

    /// Lists the tools `server` offers.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request). A reply that is not a tool list is a
    /// protocol error.
    pub async fn list_tools(&self, server: &str) -> WardenResult<Vec<ToolDescriptor>> {
        let result = self.request(server, "tools/list", json!({})).await?;
        let list: ListToolsResult = serde_json::from_value(result).map_err(|e| {
            WardenError::protocol(server, "tools/list", -32603, format!("Malformed tool list: {e}"))
        })?;
        debug!(server = %server, count = list.tools.len(), "Listed MCP tools");
        Ok(list.tools)
    }

    /// Invokes `tool` on `server`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> WardenResult<CallToolResult> {
        let result = self
            .request(
                server,
                "tools/call",
                json!({ "name": tool, "arguments": arguments }),
            )
            .await?;
        serde_json::from_value(result).map_err(|e| {
            WardenError::protocol(server, "tools/call", -32603, format!("Malformed tool result: {e}"))
        })
    }

    /// Closes and forgets `server`. Calls still waiting on it fail.
    ///
    /// Returns `false` if no such server was connected.
    pub async fn disconnect(&self, server: &str) -> bool {
        let removed = self.connections.write().await.remove(server);
        match removed {
            Some(connection) => {
                connection.transport.close().await;
                info!(server = %server, kind = ?connection.kind, "Disconnected MCP server");
                true
            }
            None => false,
        }
    }

    /// Disconnects every server.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        join_all(drained.iter().map(|(name, connection)| async move {
            connection.transport.close().await;
            debug!(server = %name, "Closed MCP connection");
        }))
        .await;
    }

    /// Names of connected servers, sorted.
    pub async fn servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns `true` if `server` is connected and completed its handshake.
    pub async fn is_ready(&self, server: &str) -> bool {
        self.connections
            .read()
            .await
            .get(server)
            .is_some_and(|c| c.ready.load(Ordering::SeqCst))
    }

    /// Identity `server` reported during the handshake.
    pub async fn server_info(&self, server: &str) -> Option<ServerInfo> {
        self.connections
            .read()
            .await
            .get(server)
            .and_then(|c| c.server_info.get().cloned())
    }

    /// Transport used by `server`.
    pub async fn transport_kind(&self, server: &str) -> Option<TransportKind> {
        self.connections.read().await.get(server).map(|c| c.kind)
    }
}
