//! Command and argument validation.
//!
//! Two passes guard every command:
//!
//! 1. [`validate_raw_command`] looks at the untokenized string for syntax
//!    that only means something to a shell (line breaks, `$(...)`, backticks,
//!    `$'...'`). These are rejected even though no shell is ever started, so
//!    the agent gets told early that it is writing shell code.
//! 2. [`validate_arguments`] checks each token for dangerous characters,
//!    length, path escapes, and for commands with a registered
//!    [`CommandSchema`], the subcommand and flag allow-lists.
//!
//! Both return every violated rule rather than stopping at the first.

use super::paths::{has_parent_segment, resolve_lexically};
use super::tokenizer::{is_fully_quoted, unquote};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Longest argument accepted, in characters.
pub const MAX_ARGUMENT_LENGTH: usize = 2048;

/// Characters rejected in unquoted arguments.
const DANGEROUS_CHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '<', '>', '#', '\n', '\r', '\0',
];

static SUBSHELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\([^)]*\)?").expect("invalid regex: subshell"));
static ANSI_C_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$'").expect("invalid regex: ansi-c quote"));
static NUMERIC_FLAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-\d+$").expect("invalid regex: numeric flag"));

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    /// Every violated rule, in check order.
    pub errors: Vec<String>,
    /// Unquoted arguments ready for argv. Empty unless `valid`.
    pub sanitized_args: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>, sanitized_args: Vec<String>) -> Self {
        let valid = errors.is_empty();
        Self {
            valid,
            errors,
            sanitized_args: if valid { sanitized_args } else { Vec::new() },
        }
    }

    /// Joins the errors into a single reason string.
    #[must_use]
    pub fn reason(&self) -> String {
        self.errors.join("; ")
    }
}

/// Closed allow-list of subcommands and flags for one program.
#[derive(Debug, Clone)]
pub struct CommandSchema {
    pub requires_subcommand: bool,
    pub subcommands: HashSet<&'static str>,
    pub flags: HashSet<&'static str>,
    /// Keep checking flags past a `--` separator.
    pub checks_after_separator: bool,
}

impl CommandSchema {
    fn new(requires_subcommand: bool, subcommands: &[&'static str], flags: &[&'static str]) -> Self {
        Self {
            requires_subcommand,
            subcommands: subcommands.iter().copied().collect(),
            flags: flags.iter().copied().collect(),
            checks_after_separator: false,
        }
    }

    /// For programs whose `--` does not end option parsing for the rest of
    /// the line.
    fn checking_after_separator(mut self) -> Self {
        self.checks_after_separator = true;
        self
    }

    /// Returns `true` if `flag` is permitted.
    ///
    /// `--name=value` is checked by its name, `-5` style counts are always
    /// accepted, and bundled short flags (`-la`) pass when each letter does.
    #[must_use]
    pub fn allows_flag(&self, flag: &str) -> bool {
        let name = flag.split_once('=').map_or(flag, |(name, _)| name);
        if self.flags.contains(name) || NUMERIC_FLAG.is_match(name) {
            return true;
        }
        if !name.starts_with("--") && name.len() > 2 {
            return name[1..].chars().all(|c| {
                let mut single = String::from("-");
                single.push(c);
                self.flags.contains(single.as_str())
            });
        }
        false
    }
}

/// Registered schemas keyed by program name.
pub static COMMAND_SCHEMAS: Lazy<HashMap<&'static str, CommandSchema>> = Lazy::new(|| {
    let mut schemas = HashMap::new();
    schemas.insert(
        "git",
        CommandSchema::new(
            true,
            &[
                "status", "log", "diff", "show", "branch", "add", "commit", "checkout", "switch",
                "restore", "fetch", "pull", "push", "merge", "rebase", "stash", "tag", "remote",
                "rev-parse", "ls-files", "blame", "init", "clone", "reset", "shortlog",
            ],
            &[
                "-a", "--all", "-m", "--message", "-b", "-v", "--verbose", "-q", "--quiet", "-p",
                "--patch", "-s", "--short", "-n", "-u", "--oneline", "--graph", "--decorate",
                "--stat", "--cached", "--staged", "--name-only", "--name-status", "--porcelain",
                "--no-edit", "--amend", "--set-upstream", "--force-with-lease", "--tags",
                "--format", "--pretty", "--since", "--until", "--author", "--depth", "--soft",
                "--mixed", "--abort", "--continue", "--list", "--color", "--no-color",
            ],
        ),
    );
    schemas.insert(
        "npm",
        CommandSchema::new(
            true,
            &[
                "install", "i", "ci", "run", "test", "start", "build", "ls", "list", "outdated",
                "audit", "init", "view", "info", "version", "uninstall", "update",
            ],
            &[
                "-D", "--save-dev", "-S", "--save", "-E", "--save-exact", "--production",
                "--silent", "--json", "--depth", "--legacy-peer-deps", "--dry-run", "--verbose",
                "--omit", "--prefer-offline", "-y", "--yes",
            ],
        ),
    );
    schemas.insert(
        "cargo",
        CommandSchema::new(
            true,
            &[
                "build", "check", "test", "run", "fmt", "clippy", "doc", "tree", "metadata",
                "bench", "clean", "update", "add",
            ],
            &[
                "--release", "--all-features", "--no-default-features", "--features", "-F",
                "--workspace", "-p", "--package", "--lib", "--bins", "--bin", "--tests",
                "--all-targets", "--no-deps", "-q", "--quiet", "-v", "--verbose", "--locked",
                "--offline", "--check", "--format-version", "--examples",
            ],
        ),
    );
    schemas.insert(
        "docker",
        CommandSchema::new(
            true,
            &["ps", "images", "logs", "inspect", "build", "version", "info", "pull"],
            &[
                "-a", "--all", "-q", "--quiet", "-f", "--follow", "--filter", "--format", "-t",
                "--tag", "--tail", "--no-cache", "--since",
            ],
        ),
    );
    schemas.insert(
        "ls",
        CommandSchema::new(
            false,
            &[],
            &[
                "-l", "-a", "-A", "-h", "-R", "-1", "-t", "-r", "-S", "-F", "-d", "--all",
                "--almost-all", "--human-readable", "--recursive", "--color",
            ],
        ),
    );
    // Read-only predicates. Actions that delete, run or write are left out.
    schemas.insert(
        "find",
        CommandSchema::new(
            false,
            &[],
            &[
                "-L", "-H", "-P", "-name", "-iname", "-path", "-ipath", "-wholename", "-regex",
                "-iregex", "-type", "-xtype", "-maxdepth", "-mindepth", "-size", "-mtime",
                "-mmin", "-atime", "-amin", "-ctime", "-cmin", "-newer", "-empty", "-perm",
                "-user", "-group", "-links", "-readable", "-writable", "-executable", "-prune",
                "-print", "-print0", "-printf", "-ls", "-not", "-o", "-a", "-or", "-and",
                "-depth", "-mount", "-xdev", "-follow", "-quit",
            ],
        )
        .checking_after_separator(),
    );
    schemas
});

/// Checks the raw command string for shell-only syntax.
///
/// # Examples
///
/// ```
/// use warden::sandbox::validator::validate_raw_command;
///
/// let result = validate_raw_command("echo $(whoami)");
/// assert!(!result.valid);
/// assert!(validate_raw_command("git status").valid);
/// ```
#[must_use]
pub fn validate_raw_command(raw: &str) -> ValidationResult {
    let mut errors = Vec::new();

    if raw.contains('\n') || raw.contains('\r') {
        errors.push("Multi-line commands are not allowed".to_string());
    }
    if SUBSHELL.is_match(raw) {
        errors.push("Subshell execution $(...) is not allowed".to_string());
    }
    if raw.contains('`') {
        errors.push("Backtick command substitution is not allowed".to_string());
    }
    if ANSI_C_QUOTE.is_match(raw) {
        errors.push("ANSI-C quoting $'...' is not allowed".to_string());
    }

    ValidationResult::from_errors(errors, Vec::new())
}

fn looks_like_path(arg: &str) -> bool {
    arg.contains('/') || arg.contains('\\') || arg.starts_with('.')
}

/// Parts of an argument that may name a path: the argument itself, the value
/// of `name=value` forms, and the value glued to a short flag (`-o/tmp/x`).
fn path_candidates(value: &str) -> Vec<&str> {
    let mut candidates = vec![value];
    if let Some((_, rhs)) = value.split_once('=') {
        candidates.push(rhs);
    }
    if value.starts_with('-') && !value.starts_with("--") {
        if let Some(attached) = value.get(2..).filter(|rest| !rest.is_empty()) {
            candidates.push(attached);
        }
    }
    candidates
}

fn check_paths(value: &str, project_root: &Path) -> Option<String> {
    for candidate in path_candidates(value) {
        if !looks_like_path(candidate) {
            continue;
        }
        if has_parent_segment(candidate) {
            return Some(format!("Path traversal detected: {value}"));
        }
        if Path::new(candidate).is_absolute()
            && resolve_lexically(project_root, candidate).is_err()
        {
            return Some(format!("Path outside project root: {value}"));
        }
    }
    None
}

/// Validates the arguments of `command` (the command name itself excluded).
///
/// `args` are raw tokens as produced by
/// [`tokenize`](super::tokenizer::tokenize), quotes included.
/// `project_root` must be absolute.
#[must_use]
pub fn validate_arguments(command: &str, args: &[String], project_root: &Path) -> ValidationResult {
    let mut errors = Vec::new();
    let mut sanitized = Vec::with_capacity(args.len());

    for raw in args {
        if raw.chars().count() > MAX_ARGUMENT_LENGTH {
            errors.push(format!(
                "Argument too long (max {MAX_ARGUMENT_LENGTH} characters)"
            ));
            continue;
        }

        if !is_fully_quoted(raw) && raw.contains(DANGEROUS_CHARS) {
            errors.push(format!("Dangerous characters in argument: {raw}"));
            continue;
        }

        let value = unquote(raw);
        if let Some(error) = check_paths(&value, project_root) {
            errors.push(error);
            continue;
        }
        sanitized.push(value);
    }

    if errors.is_empty() {
        if let Some(schema) = COMMAND_SCHEMAS.get(command) {
            errors.extend(check_schema(command, schema, &sanitized));
        }
    }

    ValidationResult::from_errors(errors, sanitized)
}

fn check_schema(command: &str, schema: &CommandSchema, args: &[String]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut subcommand_seen = !schema.requires_subcommand;

    for arg in args {
        if arg == "--" {
            if schema.checks_after_separator {
                continue;
            }
            break;
        }
        if arg.starts_with('-') && arg.len() > 1 {
            if !schema.allows_flag(arg) {
                errors.push(format!("Flag not allowed for {command}: {arg}"));
            }
            continue;
        }
        if !subcommand_seen {
            if !schema.subcommands.contains(arg.as_str()) {
                errors.push(format!("Invalid subcommand: {arg}"));
            }
            subcommand_seen = true;
        }
    }

    if !subcommand_seen {
        errors.push(format!("Missing subcommand for {command}"));
    }
    errors
}
