//! Project-root path containment.
//!
//! Two levels of checking are used. [`resolve_lexically`] never touches the
//! filesystem and is what the validator and safe delete rely on, so a hostile
//! path is rejected before any I/O. [`resolve_existing`] additionally
//! canonicalizes through symlinks for the file tools.

use crate::error::{WardenError, WardenResult};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Returns `true` if any component of `path` is `..`.
///
/// Both `/` and `\` count as separators so Windows-style input is caught on
/// every platform.
#[must_use]
pub fn has_parent_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Normalizes `.` and `..` components without consulting the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves `input` against `root` and checks it stays inside.
///
/// Absolute inputs are taken as-is, relative ones are joined to `root`.
///
/// # Errors
///
/// Returns a filesystem error if the normalized path leaves `root`.
pub fn resolve_lexically(root: &Path, input: &str) -> WardenResult<PathBuf> {
    let candidate = Path::new(input);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = normalize(&joined);

    if !resolved.starts_with(root) {
        warn!(
            path = %input,
            resolved = %resolved.display(),
            root = %root.display(),
            "Security: path escapes project root"
        );
        return Err(WardenError::filesystem(
            input,
            "Path traversal: path resolves outside project root",
        ));
    }
    Ok(resolved)
}

/// Resolves `input` and follows symlinks on the existing part of the path.
///
/// For a path that does not exist yet, the deepest existing ancestor is
/// canonicalized and the remaining components are appended, so a new file
/// under a symlinked directory that points outside the root is still caught.
///
/// # Errors
///
/// Returns a filesystem error if the path leaves `root` lexically or after
/// symlink resolution.
pub fn resolve_existing(root: &Path, input: &str) -> WardenResult<PathBuf> {
    let lexical = resolve_lexically(root, input)?;
    let resolved = canonicalize_existing(&lexical, input)?;
    ensure_contained(root, resolved, input)
}

/// Like [`resolve_existing`], but the final component is not followed.
///
/// A symlink target resolves to the link itself, so it can be moved without
/// touching what it points at, while a symlinked parent directory that
/// leaves the root is still caught.
///
/// # Errors
///
/// Returns a filesystem error if the path leaves `root` lexically or through
/// a symlinked ancestor.
pub fn resolve_entry(root: &Path, input: &str) -> WardenResult<PathBuf> {
    let lexical = resolve_lexically(root, input)?;
    if lexical == root {
        return Ok(lexical);
    }
    let (Some(parent), Some(name)) = (lexical.parent(), lexical.file_name()) else {
        return Ok(lexical);
    };
    let mut resolved = canonicalize_existing(parent, input)?;
    resolved.push(name);
    ensure_contained(root, resolved, input)
}

/// Canonicalizes the deepest existing ancestor of `path` and appends the
/// components that do not exist yet.
fn canonicalize_existing(path: &Path, input: &str) -> WardenResult<PathBuf> {
    let mut existing = path;
    let mut tail = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .map_err(|e| WardenError::filesystem(input, format!("Failed to resolve path: {e}")))?;
    for name in tail.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn ensure_contained(root: &Path, resolved: PathBuf, input: &str) -> WardenResult<PathBuf> {
    if !resolved.starts_with(root) {
        warn!(
            path = %input,
            resolved = %resolved.display(),
            "Security: symlink resolves outside project root"
        );
        return Err(WardenError::filesystem(
            input,
            "Path traversal: path resolves outside project root",
        ));
    }
    Ok(resolved)
}

/// Rejects `path` if it is itself a symlink.
///
/// # Errors
///
/// Returns a filesystem error for symlinks; missing paths are accepted.
pub fn reject_symlink(path: &Path, shown: &str) -> WardenResult<()> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_symlink() => {
            warn!(path = %shown, "Security: symlink rejected");
            Err(WardenError::filesystem(
                shown,
                "Symlink not allowed: file operations on symlinks are rejected",
            ))
        }
        _ => Ok(()),
    }
}
