//! Integration tests for the `proxly` binary.
//!
//! Argument parsing, help output, completions and the errors raised
//! before any cluster is contacted.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// The `proxly` binary with no `PROXLY_*` variables and a config
/// directory that does not exist.
fn proxly_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("proxly");
    cmd.env("HOME", "/tmp/proxly-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/proxly-cli-test-nonexistent")
        .env_remove("PROXLY_PROFILE")
        .env_remove("PROXLY_URL")
        .env_remove("PROXLY_NODE")
        .env_remove("PROXLY_OUTPUT")
        .env_remove("PROXLY_INSECURE")
        .env_remove("PROXLY_TIMEOUT")
        .env_remove("PROXLY_PROXY")
        .env_remove("PROXLY_PASSWORD")
        .env_remove("PROXLY_TOKEN_SECRET");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_usage() {
    let output = proxly_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn help_lists_resource_commands() {
    proxly_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Proxmox VE")
            .and(predicate::str::contains("guest"))
            .and(predicate::str::contains("storage"))
            .and(predicate::str::contains("token")),
    );
}

#[test]
fn version_flag() {
    proxly_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("proxly "));
}

#[test]
fn completions_for_common_shells() {
    for shell in ["bash", "zsh", "fish"] {
        let output = proxly_cmd().args(["completions", shell]).output().unwrap();
        assert!(output.status.success(), "{shell} completions failed");
        assert!(
            String::from_utf8_lossy(&output.stdout).contains("proxly"),
            "{shell} completions do not mention the binary"
        );
    }
}

// ── Errors before connecting ────────────────────────────────────────

#[test]
fn invalid_subcommand() {
    let output = proxly_cmd().arg("frobnicate").output().unwrap();
    assert!(!output.status.success());
    let text = combined_output(&output);
    assert!(text.contains("unrecognized") || text.contains("frobnicate"), "{text}");
}

#[test]
fn list_without_config_is_a_usage_error() {
    let output = proxly_cmd().args(["group", "list"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("config"));
}

#[test]
fn url_without_credentials_is_an_auth_error() {
    let output = proxly_cmd()
        .args(["--url", "https://pve.invalid:8006", "--username", "root@pam", "cluster", "version"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}

#[test]
fn config_show_without_config_succeeds() {
    proxly_cmd().args(["config", "show"]).assert().success();
}

#[test]
fn invalid_output_format() {
    let output = proxly_cmd()
        .args(["--output", "xml", "group", "list"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("possible values"));
}

#[test]
fn guest_ids_must_be_numbers() {
    let output = proxly_cmd().args(["guest", "get", "web-01"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn use_unknown_profile_fails() {
    proxly_cmd()
        .args(["config", "use", "lab"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("lab"));
}

// ── Subcommand discovery ────────────────────────────────────────────

#[test]
fn guest_subcommands_exist() {
    proxly_cmd().args(["guest", "--help"]).assert().success().stdout(
        predicate::str::contains("set")
            .and(predicate::str::contains("clone"))
            .and(predicate::str::contains("next-id"))
            .and(predicate::str::contains("shutdown")),
    );
}

#[test]
fn task_subcommands_exist() {
    proxly_cmd().args(["task", "--help"]).assert().success().stdout(
        predicate::str::contains("wait")
            .and(predicate::str::contains("log"))
            .and(predicate::str::contains("stop")),
    );
}

#[test]
fn config_subcommands_exist() {
    proxly_cmd().args(["config", "--help"]).assert().success().stdout(
        predicate::str::contains("init")
            .and(predicate::str::contains("profiles"))
            .and(predicate::str::contains("set-secret")),
    );
}
