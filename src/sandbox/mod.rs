//! Execution sandbox.
//!
//! [`ExecutionSandbox`] is the only way agent-requested commands and file
//! operations touch the host. Commands are validated, then spawned from a
//! literal argv with no shell in between. File operations are confined to the
//! project root. Deletion is diverted to [`safe_delete`].
//!
//! Failures are reported in [`CommandOutput::error`], never raised.

pub mod paths;
pub mod policy;
pub mod safe_delete;
pub mod search;
pub mod tokenizer;
pub mod validator;

pub use policy::ExecutionPolicy;
pub use safe_delete::{check_staging_name, DeleteReport, SafeDelete};
pub use search::SearchQuery;
pub use validator::ValidationResult;

use crate::error::{WardenError, WardenResult};
use paths::{reject_symlink, resolve_existing, resolve_lexically};
use policy::is_delete_command;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};
use validator::{validate_arguments, validate_raw_command};

/// Directory under the project root holding Warden's own state.
pub const STATE_DIR: &str = ".warden";
/// Activity log file name inside [`STATE_DIR`].
pub const ACTIVITY_LOG: &str = "activity.log";

/// Result of a sandboxed command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// Stdout followed by stderr on success; partial stdout on failure.
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandOutput {
    fn success(output: String) -> Self {
        Self {
            output,
            error: None,
        }
    }

    fn failure(output: String, error: impl Into<String>) -> Self {
        Self {
            output,
            error: Some(error.into()),
        }
    }

    fn rejected(reasons: &[String]) -> Self {
        Self::failure(String::new(), reasons.join("; "))
    }

    /// Returns `true` if no error was reported.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

enum Collected {
    Finished(ExitStatus),
    Overflow,
}

/// Sandbox rooted at a project directory.
#[derive(Debug, Clone)]
pub struct ExecutionSandbox {
    root: PathBuf,
    policy: ExecutionPolicy,
    deleter: SafeDelete,
}

impl ExecutionSandbox {
    /// Creates a sandbox for `root`.
    ///
    /// # Errors
    ///
    /// Returns a filesystem error if `root` cannot be canonicalized or the
    /// policy names an unusable staging directory.
    pub fn new(root: impl AsRef<Path>, policy: ExecutionPolicy) -> WardenResult<Self> {
        let shown = root.as_ref().display().to_string();
        let root = root.as_ref().canonicalize().map_err(|e| {
            WardenError::filesystem(shown, format!("Invalid project root: {e}"))
        })?;
        check_staging_name(&policy.staging_dir)
            .map_err(|reason| WardenError::filesystem(policy.staging_dir.clone(), reason))?;
        let deleter = SafeDelete::new(&root, policy.staging_dir.clone());
        Ok(Self {
            root,
            policy,
            deleter,
        })
    }

    /// Replaces the safe-delete engine, e.g. to swap its move primitive.
    #[must_use]
    pub fn with_safe_delete(mut self, deleter: SafeDelete) -> Self {
        self.deleter = deleter;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Validates and runs `raw`.
    pub async fn execute_command(&self, raw: &str) -> CommandOutput {
        let raw_check = validate_raw_command(raw);
        if !raw_check.valid {
            warn!(command = %raw, reasons = %raw_check.reason(), "Security: command rejected");
            return CommandOutput::rejected(&raw_check.errors);
        }

        let tokens = tokenizer::tokenize(raw);
        let Some((first, rest)) = tokens.split_first() else {
            return CommandOutput::failure(String::new(), "Empty command");
        };
        let program = tokenizer::unquote(first);

        if is_delete_command(&program) {
            return self.safe_delete(rest).await;
        }

        if !self.policy.allows(&program) {
            warn!(command = %program, "Security: command not in allow-list");
            return CommandOutput::failure(String::new(), format!("Command not allowed: {program}"));
        }

        let checked = validate_arguments(&program, rest, &self.root);
        if !checked.valid {
            warn!(command = %raw, reasons = %checked.reason(), "Security: arguments rejected");
            return CommandOutput::rejected(&checked.errors);
        }

        self.spawn(&program, &checked.sanitized_args).await
    }

    async fn safe_delete(&self, args: &[String]) -> CommandOutput {
        let deleter = self.deleter.clone();
        let args = args.to_vec();
        let outcome = tokio::task::spawn_blocking(move || deleter.run(&args)).await;

        match outcome {
            Ok(Ok(report)) => {
                let summary = report.to_string();
                if report.is_complete() {
                    CommandOutput::success(summary)
                } else {
                    CommandOutput::failure(summary, report.failures.join("; "))
                }
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Safe delete rejected");
                CommandOutput::failure(String::new(), e.to_string())
            }
            Err(e) => CommandOutput::failure(String::new(), format!("Safe delete aborted: {e}")),
        }
    }

    async fn spawn(&self, program: &str, args: &[String]) -> CommandOutput {
        let env = self.policy.filter_env(std::env::vars());
        let spawned = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .env_clear()
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %program, error = %e, "Failed to spawn command");
                return CommandOutput::failure(
                    String::new(),
                    WardenError::execution(program, format!("failed to spawn: {e}")).to_string(),
                );
            }
        };

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return CommandOutput::failure(String::new(), "Failed to capture command output");
        };

        let cap = self.policy.max_output_size;
        let mut out = Vec::new();
        let mut err = Vec::new();
        let outcome = tokio::time::timeout(self.policy.command_timeout, async {
            if collect(stdout, stderr, &mut out, &mut err, cap).await? {
                return Ok(Collected::Overflow);
            }
            child.wait().await.map(Collected::Finished)
        })
        .await;

        let stdout_text = |limit: usize| String::from_utf8_lossy(&out[..out.len().min(limit)]).into_owned();

        match outcome {
            Ok(Ok(Collected::Finished(status))) => {
                let stdout = String::from_utf8_lossy(&out);
                let stderr = String::from_utf8_lossy(&err);
                if status.success() {
                    let error = (!stderr.is_empty()).then(|| stderr.to_string());
                    CommandOutput {
                        output: format!("{stdout}{stderr}"),
                        error,
                    }
                } else {
                    let code = status
                        .code()
                        .map_or_else(|| "signal".to_string(), |c| c.to_string());
                    debug!(command = %program, code = %code, "Command exited with failure");
                    let mut message = format!("Exit code {code}");
                    if !stderr.is_empty() {
                        message.push_str(": ");
                        message.push_str(stderr.trim_end());
                    }
                    CommandOutput::failure(stdout.into_owned(), message)
                }
            }
            Ok(Ok(Collected::Overflow)) => {
                let _ = child.kill().await;
                warn!(
                    command = %program,
                    max_size = cap,
                    "Command output exceeded limit, process killed"
                );
                CommandOutput::failure(
                    stdout_text(cap),
                    format!("Output exceeded limit of {cap} bytes; process killed"),
                )
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                warn!(command = %program, error = %e, "Command execution failed");
                CommandOutput::failure(stdout_text(cap), format!("Execution failed: {e}"))
            }
            Err(_) => {
                let _ = child.kill().await;
                warn!(
                    command = %program,
                    timeout_ms = %self.policy.command_timeout.as_millis(),
                    "Command timed out and was killed"
                );
                CommandOutput::failure(
                    stdout_text(cap),
                    format!("Command timed out after {:?}", self.policy.command_timeout),
                )
            }
        }
    }

    /// Reads a UTF-8 file inside the project root.
    ///
    /// # Errors
    ///
    /// Fails if the path leaves the root, is a symlink, or cannot be read.
    pub async fn read_file(&self, path: &str) -> WardenResult<String> {
        let full_path = self.checked_path(path)?;
        tokio::fs::read_to_string(&full_path).await.map_err(|e| {
            debug!(path = %path, error = %e, "File read failed");
            WardenError::filesystem(path, format!("Failed to read file: {e}"))
        })
    }

    /// Writes `content` to a file inside the project root, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Fails if the content exceeds the size limit, the path leaves the root
    /// or is a symlink, or the write fails.
    pub async fn write_file(&self, path: &str, content: &str) -> WardenResult<String> {
        if content.len() > self.policy.max_file_size {
            warn!(
                path = %path,
                size = content.len(),
                limit = self.policy.max_file_size,
                "File write blocked: size exceeds limit"
            );
            return Err(WardenError::filesystem(
                path,
                format!(
                    "File size {} exceeds limit {}",
                    content.len(),
                    self.policy.max_file_size
                ),
            ));
        }

        let full_path = self.checked_path(path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WardenError::filesystem(path, format!("Failed to create directories: {e}"))
            })?;
        }

        tokio::fs::write(&full_path, content).await.map_err(|e| {
            debug!(path = %path, error = %e, "File write failed");
            WardenError::filesystem(path, format!("Failed to write file: {e}"))
        })?;
        Ok(format!("Wrote {} bytes to {}", content.len(), path))
    }

    /// Lists a directory inside the project root as sorted `d name` /
    /// `- name` lines.
    ///
    /// # Errors
    ///
    /// Fails if the path leaves the root or cannot be read.
    pub async fn list_files(&self, path: &str) -> WardenResult<String> {
        let full_path = self.checked_path(path)?;
        let mut dir = tokio::fs::read_dir(&full_path).await.map_err(|e| {
            debug!(path = %path, error = %e, "Directory listing failed");
            WardenError::filesystem(path, format!("Failed to list directory: {e}"))
        })?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| WardenError::filesystem(path, format!("Error reading entries: {e}")))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            let prefix = if file_type.is_dir() { "d " } else { "- " };
            entries.push(format!("{prefix}{name}"));
        }

        entries.sort();
        Ok(entries.join("\n"))
    }

    /// Searches project files with a regex.
    ///
    /// # Errors
    ///
    /// Fails on an invalid pattern.
    pub async fn search_code(&self, query: SearchQuery) -> WardenResult<String> {
        let root = self.root.clone();
        let staging = self.policy.staging_dir.clone();
        tokio::task::spawn_blocking(move || search::search_code(&root, &staging, &query))
            .await
            .map_err(|e| WardenError::execution("search_code", format!("search aborted: {e}")))?
    }

    /// Appends a timestamped line to `.warden/activity.log`.
    ///
    /// # Errors
    ///
    /// Fails if the log cannot be opened or written.
    pub async fn log_activity(&self, message: &str) -> WardenResult<String> {
        let dir = self.root.join(STATE_DIR);
        let log_path = dir.join(ACTIVITY_LOG);
        let log_name = format!("{STATE_DIR}/{ACTIVITY_LOG}");
        let io_err = |e: io::Error| WardenError::filesystem(&log_name, e.to_string());

        tokio::fs::create_dir_all(&dir).await.map_err(io_err)?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
            .map_err(io_err)?;

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let line = format!("[{timestamp}] {}\n", message.replace('\n', " "));
        file.write_all(line.as_bytes()).await.map_err(io_err)?;
        info!(message = %message, "Activity logged");
        Ok(format!("Logged activity to {log_name}"))
    }

    /// Resolves `path` for a file operation, rejecting escapes and symlinks.
    fn checked_path(&self, path: &str) -> WardenResult<PathBuf> {
        let lexical = resolve_lexically(&self.root, path)?;
        reject_symlink(&lexical, path)?;
        resolve_existing(&self.root, path)
    }
}

/// Drains both pipes concurrently into `out` and `err`.
///
/// Returns `true` as soon as the combined size passes `cap`.
async fn collect<O, E>(
    mut stdout: O,
    mut stderr: E,
    out: &mut Vec<u8>,
    err: &mut Vec<u8>,
    cap: usize,
) -> io::Result<bool>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out_open = true;
    let mut err_open = true;
    let mut out_chunk = [0u8; 8192];
    let mut err_chunk = [0u8; 8192];

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_chunk), if out_open => {
                let n = read?;
                if n == 0 {
                    out_open = false;
                } else {
                    out.extend_from_slice(&out_chunk[..n]);
                }
            }
            read = stderr.read(&mut err_chunk), if err_open => {
                let n = read?;
                if n == 0 {
                    err_open = false;
                } else {
                    err.extend_from_slice(&err_chunk[..n]);
                }
            }
        }
        if out.len() + err.len() > cap {
            return Ok(true);
        }
    }
    Ok(false)
}
