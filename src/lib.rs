//! Warden - a sandboxed command runner and MCP tool layer for coding agents.
//!
//! The crate has three layers:
//!
//! - [`sandbox`]: validates and runs commands without a shell, confines file
//!   operations to the project root, and turns deletion into a move into a
//!   staging directory.
//! - [`mcp`]: connects to Model Context Protocol servers over stdio or HTTP.
//! - [`tools`]: a registry that exposes both as uniform tools and parses
//!   `<tool_code>` requests out of model output.

pub mod config;
pub mod error;
pub mod mcp;
pub mod sandbox;
pub mod tools;

pub use config::Config;
pub use error::{WardenError, WardenResult};
pub use sandbox::{CommandOutput, ExecutionPolicy, ExecutionSandbox};
pub use tools::{parse_tool_call, Tool, ToolCall, ToolError, ToolRegistry};
