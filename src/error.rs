//! Centralized error types for Warden.
//!
//! [`WardenError`] covers every failure class the sandbox and the MCP layer
//! can produce. Most of them never reach the agent loop as errors: the sandbox
//! folds validation and execution failures into a [`CommandOutput`] and the
//! tool registry renders everything as an `"Error: ..."` string. The enum
//! exists so that the internal seams stay typed.
//!
//! # Example
//!
//! ```
//! use warden::error::{WardenError, WardenResult};
//!
//! fn check(path: &str) -> WardenResult<()> {
//!     if path.contains("..") {
//!         return Err(WardenError::filesystem(path, "path traversal"));
//!     }
//!     Ok(())
//! }
//!
//! let err = check("../etc/passwd").unwrap_err();
//! assert!(err.is_security_related());
//! ```
//!
//! [`CommandOutput`]: crate::sandbox::CommandOutput

use thiserror::Error;

/// Result type alias using [`WardenError`].
pub type WardenResult<T> = Result<T, WardenError>;

/// Broad category of a [`WardenError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Transport,
    Protocol,
    Execution,
    Filesystem,
}

/// Centralized error type for Warden.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Input was blocked before anything executed.
    #[error("validation failed: {}", .reasons.join("; "))]
    Validation {
        /// Every rule the input violated, in check order.
        reasons: Vec<String>,
    },

    /// A server could not be spawned or reached.
    #[error("transport error [{server}] {method}: {message}")]
    Transport {
        server: String,
        method: String,
        message: String,
    },

    /// The remote server answered with a JSON-RPC error object.
    #[error("protocol error [{server}] {method}: {message} ({code})")]
    Protocol {
        server: String,
        method: String,
        code: i64,
        message: String,
    },

    /// A spawned command failed, timed out, or overflowed its output cap.
    #[error("execution of '{command}' failed: {message}")]
    Execution { command: String, message: String },

    /// A path escaped the project root, was missing, or was not accessible.
    #[error("filesystem error for '{path}': {message}")]
    Filesystem { path: String, message: String },
}

impl WardenError {
    /// Creates a validation error from a list of reasons.
    #[must_use]
    pub fn validation(reasons: Vec<String>) -> Self {
        Self::Validation { reasons }
    }

    /// Creates a transport error with server and method context.
    #[must_use]
    pub fn transport(
        server: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            server: server.into(),
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates a protocol error from a remote JSON-RPC error object.
    #[must_use]
    pub fn protocol(
        server: impl Into<String>,
        method: impl Into<String>,
        code: i64,
        message: impl Into<String>,
    ) -> Self {
        Self::Protocol {
            server: server.into(),
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Creates an execution error.
    #[must_use]
    pub fn execution(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Creates a filesystem error.
    #[must_use]
    pub fn filesystem(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Filesystem {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Filesystem { .. } => ErrorKind::Filesystem,
        }
    }

    /// Returns `true` if retrying the same input could plausibly succeed.
    ///
    /// Nothing here retries automatically; this only informs the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Execution { .. })
    }

    /// Returns `true` if the error stems from a blocked attack class.
    #[must_use]
    pub fn is_security_related(&self) -> bool {
        match self {
            Self::Validation { .. } => true,
            Self::Filesystem { message, .. } => {
                message.contains("traversal")
                    || message.contains("outside project root")
                    || message.contains("refusing to delete")
                    || message.contains("Symlink")
            }
            _ => false,
        }
    }

    /// Returns the human-readable reason without the category prefix.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Validation { reasons } => reasons.join("; "),
            Self::Transport { message, .. }
            | Self::Protocol { message, .. }
            | Self::Execution { message, .. }
            | Self::Filesystem { message, .. } => message.clone(),
        }
    }
}
