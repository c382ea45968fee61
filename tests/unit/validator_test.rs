//! Property and table tests for command validation.

use proptest::prelude::*;
use std::path::Path;
use warden::sandbox::tokenizer::{is_fully_quoted, tokenize, unquote};
use warden::sandbox::validator::{validate_arguments, validate_raw_command, MAX_ARGUMENT_LENGTH};

const ROOT: &str = "/srv/project";

fn dangerous_char() -> impl Strategy<Value = char> {
    prop::sample::select(vec![';', '&', '|', '$', '(', ')', '<', '>', '#'])
}

proptest! {
    #[test]
    fn unquoted_dangerous_characters_are_rejected(
        prefix in "[a-z]{0,8}",
        c in dangerous_char(),
        suffix in "[a-z]{0,8}",
    ) {
        let arg = format!("{prefix}{c}{suffix}");
        let result = validate_arguments("grep", &[arg], Path::new(ROOT));
        prop_assert!(!result.valid);
        prop_assert!(result.sanitized_args.is_empty());
    }

    #[test]
    fn single_quoted_arguments_pass_through(body in "[a-z;&|$<>#() ]{0,24}") {
        let token = format!("'{body}'");
        prop_assert!(is_fully_quoted(&token));
        let result = validate_arguments("grep", &[token], Path::new(ROOT));
        prop_assert!(result.valid, "{:?}", result.errors);
        prop_assert_eq!(&result.sanitized_args, &vec![body]);
    }

    #[test]
    fn plain_words_tokenize_and_validate(words in prop::collection::vec("[a-zA-Z0-9_]{1,10}", 1..6)) {
        let line = words.join(" ");
        let tokens = tokenize(&line);
        prop_assert_eq!(&tokens, &words);
        let result = validate_arguments("echo", &tokens, Path::new(ROOT));
        prop_assert!(result.valid);
        prop_assert_eq!(result.sanitized_args, words);
    }

    #[test]
    fn raw_check_flags_any_newline(a in "[a-z ]{0,10}", b in "[a-z ]{0,10}") {
        let result = validate_raw_command(&format!("{a}\n{b}"));
        prop_assert!(!result.valid);
        prop_assert!(result.errors.iter().any(|e| e.contains("Multi-line")));
    }

    #[test]
    fn parent_segments_are_always_rejected(depth in 1usize..5, name in "[a-z]{1,8}") {
        let arg = format!("{}{name}", "../".repeat(depth));
        let result = validate_arguments("cat", &[arg], Path::new(ROOT));
        prop_assert!(!result.valid);
    }

    #[test]
    fn unquote_removes_wrapping(body in "[a-z ]{0,16}") {
        prop_assert_eq!(unquote(&format!("\"{body}\"")), body);
    }
}

#[test]
fn test_length_boundary() {
    let exact = "x".repeat(MAX_ARGUMENT_LENGTH);
    let over = "x".repeat(MAX_ARGUMENT_LENGTH + 1);
    assert!(validate_arguments("echo", &[exact], Path::new(ROOT)).valid);
    assert!(!validate_arguments("echo", &[over], Path::new(ROOT)).valid);
}

#[test]
fn test_raw_reports_all_rules_independently() {
    let result = validate_raw_command("a $(b) `c` $'d'");
    assert_eq!(result.errors.len(), 3);
}

#[test]
fn test_npm_schema() {
    let root = Path::new(ROOT);
    let ok = tokenize("install -D typescript");
    assert!(validate_arguments("npm", &ok, root).valid);

    let bad = tokenize("publish");
    assert_eq!(
        validate_arguments("npm", &bad, root).errors,
        vec!["Invalid subcommand: publish"]
    );
}

#[test]
fn test_docker_schema_blocks_run() {
    let result = validate_arguments("docker", &tokenize("run --privileged alpine"), Path::new(ROOT));
    assert!(!result.valid);
    assert!(result.errors.contains(&"Invalid subcommand: run".to_string()));
    assert!(result
        .errors
        .contains(&"Flag not allowed for docker: --privileged".to_string()));
}
