//! Integration tests for the `dartsync` CLI binary.
//!
//! These cover argument parsing, help output, shell completions, and error
//! handling without reaching the Autodarts cloud.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command for the `dartsync` binary with env isolation.
///
/// Clears all `DARTSYNC_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn dartsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("dartsync");
    cmd.env("HOME", "/tmp/dartsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/dartsync-cli-test-nonexistent")
        .env_remove("DARTSYNC_PROFILE")
        .env_remove("DARTSYNC_BOARD")
        .env_remove("DARTSYNC_OUTPUT")
        .env_remove("DARTSYNC_TIMEOUT")
        .env_remove("DARTSYNC_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = dartsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    dartsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Autodarts")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("status"))
            .and(predicate::str::contains("match")),
    );
}

#[test]
fn test_version_flag() {
    dartsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dartsync"));
}

#[test]
fn test_match_help_lists_actions() {
    dartsync_cmd().args(["match", "--help"]).assert().success().stdout(
        predicate::str::contains("throw")
            .and(predicate::str::contains("next-leg"))
            .and(predicate::str::contains("undo")),
    );
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    dartsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dartsync"));
}

#[test]
fn test_completions_zsh() {
    dartsync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_fish() {
    dartsync_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── Argument errors ─────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    dartsync_cmd()
        .arg("bogus")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_invalid_output_format() {
    dartsync_cmd()
        .args(["status", "--output", "xml"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_throw_requires_segment() {
    dartsync_cmd()
        .args(["match", "throw"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_throw_rejects_unknown_segment_before_login() {
    let output = dartsync_cmd()
        .args(["match", "throw", "T25"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("segment"), "Expected segment error:\n{text}");
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_config_path_prints_location() {
    dartsync_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_status_without_config() {
    let output = dartsync_cmd().arg("status").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("config init"),
        "Expected a hint to run config init:\n{text}"
    );
}

// Config directory follows XDG_CONFIG_HOME on Linux only.
#[test]
#[cfg(target_os = "linux")]
fn test_unknown_profile_lists_available() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("dartsync");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        r#"
default_profile = "home"

[profiles.home]
email = "me@example.com"
password = "hunter2"
board_id = "B1"
"#,
    )
    .unwrap();

    let output = dartsync_cmd()
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["status", "--profile", "club"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("home"), "Expected available profiles:\n{text}");
}

// Config directory follows XDG_CONFIG_HOME on Linux only.
#[test]
#[cfg(target_os = "linux")]
fn test_config_show_masks_password() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("dartsync");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        r#"
[profiles.home]
email = "me@example.com"
password = "hunter2"
board_id = "B1"
"#,
    )
    .unwrap();

    dartsync_cmd()
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["config", "show", "--output", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("me@example.com")
                .and(predicate::str::contains("****"))
                .and(predicate::str::contains("hunter2").not()),
        );
}
