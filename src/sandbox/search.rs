//! Regex search across project files.

use crate::error::{WardenError, WardenResult};
use glob::Pattern;
use regex::{Regex, RegexBuilder};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Parameters for [`search_code`].
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub pattern: String,
    pub case_insensitive: bool,
    /// Glob matched against the file name only, e.g. `*.rs`.
    pub file_pattern: Option<String>,
}

impl SearchQuery {
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }
}

/// Upper bound on reported matches.
pub const MAX_MATCHES: usize = 500;

fn compile(query: &SearchQuery) -> WardenResult<Regex> {
    RegexBuilder::new(&query.pattern)
        .case_insensitive(query.case_insensitive)
        .build()
        .map_err(|e| {
            debug!(pattern = %query.pattern, error = %e, "Invalid regex pattern");
            WardenError::execution("search_code", format!("Invalid regex pattern: {e}"))
        })
}

/// Walks `root` and returns `path:line: text` for every matching line.
///
/// `.git` and the staging directory are skipped, as are files that are not
/// valid UTF-8. Symlinks are not followed.
///
/// # Errors
///
/// Returns an execution error if the pattern or the file glob is invalid.
pub fn search_code(root: &Path, staging_dir: &str, query: &SearchQuery) -> WardenResult<String> {
    let regex = compile(query)?;
    let file_glob = query
        .file_pattern
        .as_deref()
        .map(Pattern::new)
        .transpose()
        .map_err(|e| WardenError::execution("search_code", format!("Invalid file pattern: {e}")))?;

    let mut results = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || {
                let name = entry.file_name().to_string_lossy();
                name != ".git" && name != staging_dir
            }
        });

    'files: for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };

        if let Some(ref glob) = file_glob {
            let filename = relative
                .file_name()
                .map(|n| n.to_string_lossy())
                .unwrap_or_default();
            if !glob.matches(&filename) {
                continue;
            }
        }

        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };

        let relative_str = relative.to_string_lossy();
        for (line_num, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                results.push(format!("{}:{}: {}", relative_str, line_num + 1, line));
                if results.len() >= MAX_MATCHES {
                    debug!(limit = MAX_MATCHES, "Search truncated");
                    break 'files;
                }
            }
        }
    }

    Ok(results.join("\n"))
}
