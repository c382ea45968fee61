//! ExecutionSandbox behaviour through its public surface.

use crate::common::TestContext;
use pretty_assertions::assert_eq;
use std::io;
use tokio_test::{assert_err, assert_ok};
use warden::sandbox::SafeDelete;

#[tokio::test]
async fn test_rm_moves_file_to_staging() {
    let ctx = TestContext::new();
    ctx.create_file("sample.txt", "data");
    let sandbox = ctx.sandbox();

    let result = sandbox.execute_command("rm sample.txt").await;

    assert_eq!(result.error, None);
    assert!(!ctx.path().join("sample.txt").exists());
    let staged = ctx.staged();
    assert_eq!(staged.len(), 1);
    assert!(staged[0].starts_with("sample.txt."));
    assert!(staged[0].ends_with(".0"));
    assert!(result.output.contains(".not-needed"));
    assert!(result.output.contains("sample.txt ->"));
}

#[tokio::test]
async fn test_delete_aliases_are_case_insensitive() {
    let ctx = TestContext::new();
    ctx.create_file("a.txt", "a");
    ctx.create_file("b.txt", "b");
    let sandbox = ctx.sandbox();

    assert!(sandbox.execute_command("RM a.txt").await.is_success());
    assert!(sandbox.execute_command("unlink b.txt").await.is_success());
    assert_eq!(ctx.staged().len(), 2);
}

#[tokio::test]
async fn test_rm_recursive_directory_with_separator() {
    let ctx = TestContext::new();
    ctx.create_file("-odd/inner.txt", "x");
    ctx.create_file("build/out.o", "y");
    let sandbox = ctx.sandbox();

    let result = sandbox.execute_command("rm -rf build -- -odd").await;

    assert!(result.is_success(), "{result:?}");
    assert!(!ctx.path().join("build").exists());
    assert!(!ctx.path().join("-odd").exists());
    let staged = ctx.staged();
    assert!(staged.iter().any(|n| n.starts_with("build.")));
    assert!(staged.iter().any(|n| n.starts_with("-odd.")));
}

#[tokio::test]
async fn test_rm_missing_target_changes_nothing() {
    let ctx = TestContext::new();
    ctx.create_file("keep.txt", "x");
    let sandbox = ctx.sandbox();

    let result = sandbox.execute_command("rm keep.txt ghost.txt").await;

    assert_eq!(result.output, "");
    let error = result.error.unwrap();
    assert!(error.contains("ghost.txt"));
    assert!(ctx.path().join("keep.txt").exists());
    assert!(!ctx.path().join(".not-needed").exists());
}

#[tokio::test]
async fn test_rm_staging_is_refused() {
    let ctx = TestContext::new();
    ctx.create_file(".not-needed/old.txt.1.0", "x");
    let sandbox = ctx.sandbox();

    for command in ["rm -rf .not-needed", "rm .not-needed/old.txt.1.0"] {
        let result = sandbox.execute_command(command).await;
        assert!(result.error.unwrap().contains("refusing to delete"), "{command}");
    }
    assert_eq!(ctx.staged(), vec!["old.txt.1.0"]);
}

#[tokio::test]
async fn test_rm_outside_root_is_refused() {
    let ctx = TestContext::new();
    let sandbox = ctx.sandbox();
    let result = sandbox.execute_command("rm /etc/hosts").await;
    assert!(result.error.unwrap().contains("outside project root"));
}

#[tokio::test]
async fn test_flag_value_outside_root_is_refused() {
    let ctx = TestContext::new();
    let outside = tempfile::tempdir().unwrap();
    ctx.create_file("secret.txt", "s");
    let sandbox = ctx.sandbox();

    let command = format!(
        "mv secret.txt --target-directory={}",
        outside.path().display()
    );
    let result = sandbox.execute_command(&command).await;

    let error = result.error.unwrap();
    assert!(error.contains("outside project root"), "{error}");
    assert!(ctx.path().join("secret.txt").exists());
    assert!(!outside.path().join("secret.txt").exists());
}

#[tokio::test]
async fn test_find_delete_is_rejected() {
    let ctx = TestContext::new();
    ctx.create_file("keep.txt", "x");
    let result = ctx.sandbox().execute_command("find . -delete").await;
    assert_eq!(result.error.as_deref(), Some("Flag not allowed for find: -delete"));
    assert!(ctx.path().join("keep.txt").exists());
}

#[test]
fn test_cross_device_fallback_through_sandbox_engine() {
    let ctx = TestContext::new();
    ctx.create_file("logs/a.log", "1");
    let deleter = SafeDelete::new(ctx.path(), ".not-needed")
        .with_rename(|_, _| Err(io::Error::from_raw_os_error(18)));

    let report = assert_ok!(deleter.run(&["logs".to_string()]));
    assert!(report.to_string().contains("copied after rename failed"));
    assert!(!ctx.path().join("logs").exists());
}

#[tokio::test]
async fn test_git_hack_is_rejected() {
    let ctx = TestContext::new();
    let result = ctx.sandbox().execute_command("git hack").await;
    assert_eq!(result.output, "");
    assert_eq!(result.error.as_deref(), Some("Invalid subcommand: hack"));
}

#[tokio::test]
async fn test_subshell_rejected_before_tokenizing() {
    let ctx = TestContext::new();
    let result = ctx.sandbox().execute_command("echo $(whoami)").await;
    assert_eq!(result.output, "");
    assert_eq!(
        result.error.as_deref(),
        Some("Subshell execution $(...) is not allowed")
    );
}

#[tokio::test]
async fn test_validation_reasons_joined() {
    let ctx = TestContext::new();
    let result = ctx.sandbox().execute_command("cat ../a b;c").await;
    assert_eq!(
        result.error.as_deref(),
        Some("Path traversal detected: ../a; Dangerous characters in argument: b;c")
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_clean_run_has_no_error() {
    let ctx = TestContext::new();
    ctx.create_file("a.txt", "hello\n");
    let result = ctx.sandbox().execute_command("cat a.txt").await;
    assert_eq!(result.output, "hello\n");
    assert_eq!(result.error, None);
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_run_keeps_partial_stdout() {
    let ctx = TestContext::new();
    ctx.create_file("a.txt", "hello\n");
    let result = ctx.sandbox().execute_command("cat a.txt missing.txt").await;
    assert_eq!(result.output, "hello\n");
    let error = result.error.unwrap();
    assert!(error.starts_with("Exit code 1"), "{error}");
    assert!(error.contains("missing.txt"));
}

#[tokio::test]
async fn test_file_tools_reject_escape() {
    let ctx = TestContext::new();
    let sandbox = ctx.sandbox();
    assert_err!(sandbox.read_file("../../etc/passwd").await);
    assert_err!(sandbox.write_file("/tmp/escape.txt", "x").await);
}

#[cfg(unix)]
#[tokio::test]
async fn test_file_tools_reject_symlinks() {
    let ctx = TestContext::new();
    let target = ctx.create_file("real.txt", "secret");
    std::os::unix::fs::symlink(&target, ctx.path().join("link.txt")).unwrap();
    let sandbox = ctx.sandbox();

    let err = assert_err!(sandbox.read_file("link.txt").await);
    assert!(err.to_string().contains("Symlink"));
    let err = assert_err!(sandbox.write_file("link.txt", "overwrite").await);
    assert!(err.is_security_related());
    assert_eq!(std::fs::read_to_string(target).unwrap(), "secret");
}
