//! MCP transports.
//!
//! - [`StdioTransport`]: a child process speaking newline-delimited JSON-RPC
//!   on stdin/stdout. Replies are matched to callers by id through a pending
//!   map, so out-of-order replies land in the right place.
//! - [`HttpTransport`]: one POST per message with a bearer token. The HTTP
//!   exchange itself pairs request and reply.
//!
//! # Example
//!
//! ```ignore
//! use warden::mcp::transport::{StdioTransport, Transport};
//! use serde_json::json;
//! use std::collections::HashMap;
//!
//! #[tokio::main]
//! async fn main() -> warden::error::WardenResult<()> {
//!     let transport = StdioTransport::spawn("files", "files-mcp", &[], &HashMap::new())?;
//!     let tools = transport.request(1, "tools/list", json!({})).await?;
//!     transport.close().await;
//!     Ok(())
//! }
//! ```

use super::framing::LineBuffer;
use super::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::error::{WardenError, WardenResult};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Longest slice of a malformed line echoed into logs.
const LOG_SNIPPET_LEN: usize = 200;

/// Transport contract shared by stdio and HTTP servers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a call and waits for its reply.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the message cannot be delivered or the
    /// connection ends first, and a protocol error if the server replies with
    /// a JSON-RPC error object.
    async fn request(&self, id: u64, method: &str, params: Value) -> WardenResult<Value>;

    /// Sends a one-way notification.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the message cannot be delivered.
    async fn notify(&self, method: &str, params: Value) -> WardenResult<()>;

    /// Releases the connection. Requests still waiting are rejected.
    async fn close(&self);
}

/// A call waiting for its reply.
struct PendingRequest {
    method: String,
    tx: oneshot::Sender<WardenResult<Value>>,
}

#[derive(Default)]
struct PendingState {
    closed: bool,
    requests: HashMap<u64, PendingRequest>,
}

type PendingMap = Arc<Mutex<PendingState>>;

/// Stdio transport for MCP servers.
pub struct StdioTransport {
    server: String,
    writer_tx: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    child: Mutex<Option<Child>>,
    tasks: Vec<JoinHandle<()>>,
}

impl StdioTransport {
    /// Spawns `command` and wires up its stdin/stdout. Stderr is inherited.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the process cannot be started.
    pub fn spawn(
        server: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> WardenResult<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WardenError::transport(server, "spawn", format!("Failed to spawn {command}: {e}"))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(WardenError::transport(server, "spawn", "Child pipes unavailable"));
        };

        let mut transport = Self::from_streams(server, stdout, stdin);
        transport.child = Mutex::new(Some(child));
        Ok(transport)
    }

    /// Builds a transport over arbitrary streams. `reader` carries the
    /// server's output, `writer` its input.
    pub fn from_streams<R, W>(server: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::default();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<String>();

        let writer_task = tokio::spawn(write_loop(server.to_string(), writer, writer_rx));
        let reader_task = tokio::spawn(read_loop(
            server.to_string(),
            reader,
            Arc::clone(&pending),
        ));

        Self {
            server: server.to_string(),
            writer_tx,
            pending,
            child: Mutex::new(None),
            tasks: vec![writer_task, reader_task],
        }
    }

    /// Number of calls still waiting for a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.requests.len()
    }

    fn send_line(&self, method: &str, message: &JsonRpcRequest) -> WardenResult<()> {
        let line = serde_json::to_string(message).map_err(|e| {
            WardenError::transport(&self.server, method, format!("Failed to serialize: {e}"))
        })?;
        self.writer_tx
            .send(line)
            .map_err(|_| WardenError::transport(&self.server, method, "Writer task closed"))
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, id: u64, method: &str, params: Value) -> WardenResult<Value> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(WardenError::transport(
                    &self.server,
                    method,
                    "Connection closed",
                ));
            }
            pending.requests.insert(
                id,
                PendingRequest {
                    method: method.to_string(),
                    tx,
                },
            );
        }

        if let Err(e) = self.send_line(method, &JsonRpcRequest::new(id, method, params)) {
            self.pending.lock().await.requests.remove(&id);
            return Err(e);
        }

        rx.await.unwrap_or_else(|_| {
            Err(WardenError::transport(
                &self.server,
                method,
                "Connection dropped before reply",
            ))
        })
    }

    async fn notify(&self, method: &str, params: Value) -> WardenResult<()> {
        self.send_line(method, &JsonRpcRequest::notification(method, params))
    }

    async fn close(&self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        reject_all(&self.server, &self.pending, "Connection closed").await;
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn write_loop<W>(server: String, mut writer: W, mut rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            error!(server = %server, error = %e, "Failed to write to MCP server");
            break;
        }
    }
}

async fn read_loop<R>(server: String, mut reader: R, pending: PendingMap)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = LineBuffer::new();
    let mut chunk = vec![0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                for line in buffer.push(&chunk[..n]) {
                    route_line(&server, &line, &pending).await;
                }
            }
            Err(e) => {
                error!(server = %server, error = %e, "Failed to read from MCP server");
                break;
            }
        }
    }

    if let Some(rest) = buffer.take_remainder() {
        route_line(&server, &rest, &pending).await;
    }
    debug!(server = %server, "MCP server output closed");
    reject_all(&server, &pending, "Server closed the connection").await;
}

async fn route_line(server: &str, line: &str, pending: &PendingMap) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            let snippet: String = line.chars().take(LOG_SNIPPET_LEN).collect();
            warn!(server = %server, error = %e, line = %snippet, "Dropping malformed line from MCP server");
            return;
        }
    };

    let is_reply = value.get("result").is_some() || value.get("error").is_some();
    if !is_reply {
        let method = value.get("method").and_then(Value::as_str).unwrap_or("?");
        debug!(server = %server, method = %method, "Ignoring server-initiated message");
        return;
    }

    let response: JsonRpcResponse = match serde_json::from_value(value) {
        Ok(response) => response,
        Err(e) => {
            warn!(server = %server, error = %e, "Dropping reply with invalid shape");
            return;
        }
    };
    let Some(id) = response.numeric_id() else {
        warn!(server = %server, "Dropping reply without a usable id");
        return;
    };

    let entry = pending.lock().await.requests.remove(&id);
    let Some(PendingRequest { method, tx }) = entry else {
        debug!(server = %server, id, "Dropping reply for unknown or completed request");
        return;
    };

    let result = response
        .into_result()
        .map_err(|e| WardenError::protocol(server, &method, e.code, e.message));
    let _ = tx.send(result);
}

async fn reject_all(server: &str, pending: &PendingMap, reason: &str) {
    let mut state = pending.lock().await;
    state.closed = true;
    for (id, request) in state.requests.drain() {
        debug!(server = %server, id, method = %request.method, "Rejecting pending request");
        let _ = request
            .tx
            .send(Err(WardenError::transport(server, &request.method, reason)));
    }
}

/// HTTP transport for MCP servers.
pub struct HttpTransport {
    server: String,
    url: String,
    token: Option<SecretString>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be built.
    pub fn new(server: &str, url: &str, token: Option<SecretString>) -> WardenResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("warden/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WardenError::transport(server, "connect", e.to_string()))?;
        Ok(Self {
            server: server.to_string(),
            url: url.to_string(),
            token,
            client,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, method: &str, message: &JsonRpcRequest) -> WardenResult<reqwest::Response> {
        let mut builder = self.client.post(&self.url).json(message);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| WardenError::transport(&self.server, method, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(server = %self.server, method = %method, status = %status, "MCP HTTP call failed");
            return Err(WardenError::transport(
                &self.server,
                method,
                format!("HTTP {status}: {}", body.trim()),
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, id: u64, method: &str, params: Value) -> WardenResult<Value> {
        let response = self
            .post(method, &JsonRpcRequest::new(id, method, params))
            .await?;
        let reply: JsonRpcResponse = response.json().await.map_err(|e| {
            WardenError::transport(&self.server, method, format!("Invalid JSON-RPC reply: {e}"))
        })?;
        reply
            .into_result()
            .map_err(|e| WardenError::protocol(&self.server, method, e.code, e.message))
    }

    async fn notify(&self, method: &str, params: Value) -> WardenResult<()> {
        self.post(method, &JsonRpcRequest::notification(method, params))
            .await
            .map(|_| ())
    }

    async fn close(&self) {}
}
