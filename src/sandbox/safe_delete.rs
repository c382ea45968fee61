//! Reversible deletion.
//!
//! `rm` and friends never unlink anything. Targets are moved into a staging
//! directory under the project root, where they can be inspected or restored.
//!
//! Every target is checked before the first move: all must resolve inside the
//! root, none may be the staging directory or live under it, and all must
//! exist. Once checks pass, items are relocated one by one; a failure on a
//! later item is reported alongside the items that did move.

use super::paths::resolve_entry;
use super::tokenizer::unquote;
use crate::error::{WardenError, WardenResult};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Signature of the move primitive. Swappable so tests can simulate
/// cross-device failures.
pub type RenameFn = fn(&Path, &Path) -> io::Result<()>;

fn std_rename(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::rename(from, to)
}

/// How an item reached the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Renamed,
    /// Rename failed with `reason`; the item was copied then removed.
    Copied { reason: String },
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Renamed => write!(f, "renamed"),
            Self::Copied { reason } => write!(f, "copied after rename failed: {reason}"),
        }
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    /// Root-relative path of the original item.
    pub source: String,
    /// Absolute path inside the staging directory.
    pub destination: PathBuf,
    pub strategy: Strategy,
}

/// Result of a safe delete run.
#[derive(Debug, Clone, Default)]
pub struct DeleteReport {
    pub staging: PathBuf,
    staging_name: String,
    pub relocations: Vec<Relocation>,
    /// Items that passed checks but could not be moved.
    pub failures: Vec<String>,
}

impl DeleteReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Moved {} item(s) to {}/ (nothing was permanently deleted)",
            self.relocations.len(),
            self.staging_name
        )?;
        for item in &self.relocations {
            let name = item
                .destination
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            write!(
                f,
                "\n  {} -> {}/{} ({})",
                item.source, self.staging_name, name, item.strategy
            )?;
        }
        Ok(())
    }
}

/// Pulls delete targets out of the arguments following the command name.
///
/// Before `--`, flag-shaped tokens are skipped. After it, every token is a
/// target.
#[must_use]
pub fn extract_targets(args: &[String]) -> Vec<String> {
    let mut targets = Vec::new();
    let mut after_separator = false;
    for arg in args {
        if after_separator {
            targets.push(unquote(arg));
        } else if arg == "--" {
            after_separator = true;
        } else if !arg.starts_with('-') {
            targets.push(unquote(arg));
        }
    }
    targets
}

/// Flattens a root-relative path into a single file name.
fn staged_name(relative: &Path, timestamp: u128, index: usize) -> String {
    let flat = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("__");
    format!("{flat}.{timestamp}.{index}")
}

/// Checks that `name` is a single plain directory name.
///
/// The staging directory must sit directly under the project root, so
/// separators, `.`/`..` and absolute paths are refused.
///
/// # Errors
///
/// Returns a human-readable reason when `name` is not usable.
pub fn check_staging_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("staging directory name is empty".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("staging directory cannot be {name:?}"));
    }
    if name.contains('/') || name.contains('\\') || Path::new(name).is_absolute() {
        return Err(format!(
            "staging directory must be a plain name under the project root, got {name:?}"
        ));
    }
    Ok(())
}

/// Safe delete bound to a project root.
#[derive(Debug, Clone)]
pub struct SafeDelete {
    root: PathBuf,
    staging_dir: String,
    rename: RenameFn,
}

impl SafeDelete {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, staging_dir: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            staging_dir: staging_dir.into(),
            rename: std_rename,
        }
    }

    /// Replaces the move primitive.
    #[must_use]
    pub fn with_rename(mut self, rename: RenameFn) -> Self {
        self.rename = rename;
        self
    }

    #[must_use]
    pub fn staging_path(&self) -> PathBuf {
        self.root.join(&self.staging_dir)
    }

    /// Checks every target, then relocates them into the staging directory.
    ///
    /// `args` are the raw tokens after the command name.
    ///
    /// # Errors
    ///
    /// Fails without touching the filesystem if there are no targets, a
    /// target leaves the root, a target is the staging directory or inside
    /// it, or any target is missing.
    pub fn run(&self, args: &[String]) -> WardenResult<DeleteReport> {
        let targets = extract_targets(args);
        if targets.is_empty() {
            return Err(WardenError::validation(vec![
                "No delete targets given".to_string()
            ]));
        }

        let root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let mut resolved = Vec::with_capacity(targets.len());
        for target in &targets {
            resolved.push((target.as_str(), resolve_entry(&root, target)?));
        }

        let staging = root.join(&self.staging_dir);
        for (target, path) in &resolved {
            if *path == root {
                warn!(target = %target, "Security: refusing to delete project root");
                return Err(WardenError::filesystem(
                    *target,
                    "refusing to delete the project root",
                ));
            }
            if path.starts_with(&staging) {
                warn!(target = %target, "Security: refusing to delete staging directory");
                return Err(WardenError::filesystem(
                    *target,
                    format!("refusing to delete {} or anything inside it", self.staging_dir),
                ));
            }
        }

        let missing: Vec<&str> = resolved
            .iter()
            .filter(|(_, path)| std::fs::symlink_metadata(path).is_err())
            .map(|(target, _)| *target)
            .collect();
        if !missing.is_empty() {
            return Err(WardenError::filesystem(
                missing.join(", "),
                "target does not exist",
            ));
        }

        std::fs::create_dir_all(&staging).map_err(|e| {
            WardenError::filesystem(
                &self.staging_dir,
                format!("Failed to create staging directory: {e}"),
            )
        })?;

        let mut unique: Vec<PathBuf> = Vec::with_capacity(resolved.len());
        for (_, path) in resolved {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        let mut report = DeleteReport {
            staging: staging.clone(),
            staging_name: self.staging_dir.clone(),
            ..DeleteReport::default()
        };

        for (index, source) in unique.iter().enumerate() {
            let relative = source.strip_prefix(&root).unwrap_or(source);
            let source_display = relative.to_string_lossy().into_owned();
            let destination = staging.join(staged_name(relative, timestamp, index));

            match self.relocate(source, &destination) {
                Ok(strategy) => {
                    info!(
                        source = %source_display,
                        destination = %destination.display(),
                        strategy = %strategy,
                        "Staged for deletion"
                    );
                    report.relocations.push(Relocation {
                        source: source_display,
                        destination,
                        strategy,
                    });
                }
                Err(e) => {
                    warn!(source = %source_display, error = %e, "Failed to stage item");
                    report
                        .failures
                        .push(format!("Failed to relocate {source_display}: {e}"));
                }
            }
        }

        Ok(report)
    }

    fn relocate(&self, source: &Path, destination: &Path) -> io::Result<Strategy> {
        match (self.rename)(source, destination) {
            Ok(()) => Ok(Strategy::Renamed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(e),
            Err(e) => {
                debug!(
                    source = %source.display(),
                    error = %e,
                    "Rename failed, falling back to copy"
                );
                copy_recursive(source, destination)?;
                remove_recursive(source)?;
                Ok(Strategy::Copied {
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn copy_recursive(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = if relative.as_os_str().is_empty() {
            destination.to_path_buf()
        } else {
            destination.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    let link = std::fs::read_link(source)?;
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::fs::copy(source, target).map(|_| ())
}

fn remove_recursive(path: &Path) -> io::Result<()> {
    if std::fs::symlink_metadata(path)?.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
