//! Execution policy: which programs may run and what they inherit.
//!
//! The command allow-list is closed. Anything not named here fails before a
//! process is created.

use crate::config::SandboxSettings;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::time::Duration;

/// Programs the sandbox is willing to spawn.
pub static ALLOWED_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let commands = [
        // Version control
        "git",
        // Inspection
        "ls",
        "cat",
        "head",
        "tail",
        "wc",
        "file",
        "stat",
        "tree",
        "du",
        "pwd",
        "which",
        "echo",
        // Search
        "grep",
        "rg",
        "find",
        // Text processing
        "sort",
        "uniq",
        "diff",
        "cut",
        "jq",
        // File management (deletion goes through safe delete)
        "mkdir",
        "touch",
        "cp",
        "mv",
        // Toolchains
        "node",
        "npm",
        "npx",
        "yarn",
        "pnpm",
        "tsc",
        "python",
        "python3",
        "pip",
        "pytest",
        "cargo",
        "rustc",
        "go",
        "make",
        // Network and containers
        "curl",
        "docker",
    ];
    commands.into_iter().collect()
});

/// First tokens that divert into safe delete, compared case-insensitively.
pub static DELETE_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["rm", "rmdir", "unlink", "del", "erase", "rd"]
        .into_iter()
        .collect()
});

/// Environment variables children inherit by default.
pub const BASE_ENV_ALLOWLIST: &[&str] = &[
    "PATH", "HOME", "USER", "LOGNAME", "SHELL", "TERM", "LANG", "LC_ALL", "LC_CTYPE",
    "LC_MESSAGES", "TMPDIR", "TMP", "TEMP",
];

/// Prefixes of dynamic-loader variables that are never propagated.
const LOADER_ENV_PREFIXES: &[&str] = &["LD_", "DYLD_"];

/// Returns `true` if `name` is a loader-injection variable.
#[must_use]
pub fn is_loader_variable(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    LOADER_ENV_PREFIXES
        .iter()
        .any(|prefix| upper.starts_with(prefix))
}

/// Returns `true` if `command` should be handled by safe delete.
#[must_use]
pub fn is_delete_command(command: &str) -> bool {
    DELETE_COMMANDS.contains(command.to_ascii_lowercase().as_str())
}

/// Limits and environment rules applied to every spawned command.
#[derive(Debug, Clone)]
pub struct ExecutionPolicy {
    /// Timeout for command execution.
    pub command_timeout: Duration,
    /// Maximum combined stdout+stderr size in bytes.
    pub max_output_size: usize,
    /// Maximum payload accepted by `write_file`.
    pub max_file_size: usize,
    /// Staging directory name for safe delete, relative to the project root.
    pub staging_dir: String,
    env_allowlist: Vec<String>,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self::from_settings(&SandboxSettings::default())
    }
}

impl ExecutionPolicy {
    /// Builds a policy from the `[sandbox]` configuration section.
    #[must_use]
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        let mut env_allowlist: Vec<String> =
            BASE_ENV_ALLOWLIST.iter().map(|s| (*s).to_string()).collect();
        for name in &settings.extra_env {
            if is_loader_variable(name) {
                tracing::warn!(variable = %name, "Ignoring loader variable in extra_env");
                continue;
            }
            if !env_allowlist.contains(name) {
                env_allowlist.push(name.clone());
            }
        }

        Self {
            command_timeout: settings.timeout(),
            max_output_size: settings.max_output_bytes,
            max_file_size: settings.max_file_size,
            staging_dir: settings.staging_dir.clone(),
            env_allowlist,
        }
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_output_size(mut self, bytes: usize) -> Self {
        self.max_output_size = bytes;
        self
    }

    #[must_use]
    pub fn with_max_file_size(mut self, bytes: usize) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Returns `true` if `command` may be spawned.
    #[must_use]
    pub fn allows(&self, command: &str) -> bool {
        ALLOWED_COMMANDS.contains(command)
    }

    /// Variable names passed through to children.
    #[must_use]
    pub fn env_allowlist(&self) -> &[String] {
        &self.env_allowlist
    }

    /// Collects the child environment from `source`, keeping only allowed,
    /// non-loader variables.
    pub fn filter_env<I>(&self, source: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        source
            .into_iter()
            .filter(|(name, _)| !is_loader_variable(name))
            .filter(|(name, _)| self.env_allowlist.iter().any(|allowed| allowed == name))
            .collect()
    }
}
