//! Configuration types for Warden.
//!
//! Configuration lives in `warden.toml` at the project root (or wherever
//! `--config` points). Every field has a default, so an absent file is the
//! same as an empty one.
//!
//! ```toml
//! [sandbox]
//! timeout_secs = 30
//! extra_env = ["CARGO_HOME"]
//!
//! [mcp.servers.files]
//! type = "stdio"
//! command = "/usr/local/bin/files-mcp"
//! args = ["--root", "."]
//!
//! [mcp.servers.search]
//! type = "http"
//! url = "https://tools.example.com/mcp"
//! bearer_token = "..."
//! ```

use crate::mcp::McpServerConfig;
use crate::sandbox::check_staging_name;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the project root when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "warden.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sandbox: SandboxSettings,
    pub mcp: McpSettings,
}

/// Limits and knobs for the execution sandbox.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxSettings {
    /// Wall-clock limit for a spawned command.
    pub timeout_secs: u64,
    /// Combined stdout+stderr cap in bytes.
    pub max_output_bytes: usize,
    /// Largest payload `write_file` accepts.
    pub max_file_size: usize,
    /// Name of the safe-delete staging directory under the project root.
    pub staging_dir: String,
    /// Extra environment variable names passed through to children.
    pub extra_env: Vec<String>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_output_bytes: 10 * 1024 * 1024,
            max_file_size: 10 * 1024 * 1024,
            staging_dir: ".not-needed".to_string(),
            extra_env: Vec::new(),
        }
    }
}

impl SandboxSettings {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Rejects settings the sandbox cannot honour.
    ///
    /// # Errors
    ///
    /// Returns an error if `staging_dir` is not a plain directory name.
    pub fn validate(&self) -> Result<()> {
        check_staging_name(&self.staging_dir)
            .map_err(|reason| anyhow::anyhow!("Invalid sandbox.staging_dir: {reason}"))
    }
}

/// Tool-server section.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct McpSettings {
    /// Servers keyed by the name they are registered under.
    pub servers: BTreeMap<String, McpServerConfig>,
}

impl Config {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML, has unknown keys, or
    /// fails validation.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Failed to parse configuration")?;
        config.sandbox.validate()?;
        Ok(config)
    }

    /// Loads configuration.
    ///
    /// With an explicit path the file must exist. Without one,
    /// `<project_root>/warden.toml` is used if present and defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>, project_root: &Path) -> Result<Self> {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = project_root.join(DEFAULT_CONFIG_FILE);
                if !candidate.exists() {
                    tracing::debug!(path = %candidate.display(), "No config file, using defaults");
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            servers = config.mcp.servers.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}
