//! JSON-RPC 2.0 envelopes and the MCP payloads carried inside them.
//!
//! # Example
//!
//! ```
//! use warden::mcp::protocol::JsonRpcRequest;
//! use serde_json::json;
//!
//! let request = JsonRpcRequest::new(1, "tools/list", json!({}));
//! let line = serde_json::to_string(&request).unwrap();
//! assert!(line.contains("\"jsonrpc\":\"2.0\""));
//! assert!(line.contains("\"id\":1"));
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// MCP protocol revision sent during `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Name this client reports in `clientInfo`.
pub const CLIENT_NAME: &str = "warden";

/// A JSON-RPC 2.0 call or notification.
///
/// A request without an id is a notification and gets no reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    params: Value,
}

impl JsonRpcRequest {
    /// Creates a call with a numeric id.
    #[must_use]
    pub fn new(id: u64, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    /// Creates a one-way notification.
    #[must_use]
    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn params(&self) -> &Value {
        &self.params
    }

    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Method not found (-32601).
    #[must_use]
    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found")
    }

    /// Invalid params (-32602).
    #[must_use]
    pub fn invalid_params(details: &str) -> Self {
        Self::new(-32602, format!("Invalid params: {details}"))
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(id)),
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Option<u64>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.map(|id| json!(id)),
            result: None,
            error: Some(error),
        }
    }

    /// Returns the id when it is a non-negative integer.
    ///
    /// Servers occasionally echo ids as strings; those are accepted if they
    /// parse.
    #[must_use]
    pub fn numeric_id(&self) -> Option<u64> {
        match self.id.as_ref()? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&JsonRpcError> {
        self.error.as_ref()
    }

    /// Consumes the reply, yielding the result or the error object.
    ///
    /// # Errors
    ///
    /// Returns the [`JsonRpcError`] carried by an error reply.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Parameters of the `initialize` call.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({ "type": "object" })
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

/// One typed piece of a `tools/call` result.
///
/// Missing fields default to empty so a sloppy segment still yields
/// whatever it does carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentSegment {
    Text {
        #[serde(default)]
        text: String,
    },
    Image {
        #[serde(default)]
        data: String,
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    Resource {
        #[serde(default)]
        resource: Value,
    },
    #[serde(other)]
    Unknown,
}

impl ContentSegment {
    /// Reads one segment, falling back to plain text for bare strings and
    /// untyped objects with a `text` field.
    fn from_value_lenient(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text { text },
            other => {
                let bare_text = other
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                serde_json::from_value(other).unwrap_or_else(|_| match bare_text {
                    Some(text) => Self::Text { text },
                    None => Self::Unknown,
                })
            }
        }
    }
}

/// Accepts `content` as a list of segments, a single segment, a plain
/// string, or null.
fn lenient_content<'de, D>(deserializer: D) -> Result<Vec<ContentSegment>, D::Error>
where
    D: Deserializer<'de>,
{
    let content = match Value::deserialize(deserializer)? {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .map(ContentSegment::from_value_lenient)
            .collect(),
        single => vec![ContentSegment::from_value_lenient(single)],
    };
    Ok(content)
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default, deserialize_with = "lenient_content")]
    pub content: Vec<ContentSegment>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Concatenates the text segments, in order.
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|segment| match segment {
                ContentSegment::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn has_text(&self) -> bool {
        self.content
            .iter()
            .any(|segment| matches!(segment, ContentSegment::Text { .. }))
    }
}

/// Server identity returned by `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}
