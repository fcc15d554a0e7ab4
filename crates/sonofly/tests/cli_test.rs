//! Integration tests for the `sonofly` CLI binary.
//!
//! Argument parsing, help output, completions, config handling, cached
//! device listing and error exit codes. Nothing here talks to the cloud.
#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Command for the `sonofly` binary with env isolation.
///
/// Clears `SONOFLY_*` variables and points platform dirs at a path that
/// does not exist, so tests never touch the user's real configuration.
fn sonofly_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("sonofly");
    cmd.env("HOME", "/tmp/sonofly-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/sonofly-cli-test-nonexistent")
        .env("XDG_CACHE_HOME", "/tmp/sonofly-cli-test-nonexistent")
        .env_remove("SONOFLY_CONFIG")
        .env_remove("SONOFLY_ACCOUNT")
        .env_remove("SONOFLY_OUTPUT")
        .env_remove("SONOFLY_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Temp dir holding `config.toml` with `body` plus a `cache/` root.
struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        let config = format!(
            "[defaults]\nuse_keyring = false\ncache_dir = \"{}\"\n\n{body}",
            cache.display()
        );
        fs::write(dir.path().join("config.toml"), config).unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn seed_cache(&self, username: &str, devices: &serde_json::Value) {
        let key = format!("sonofly/{username}.json");
        let path = self.dir.path().join("cache").join(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let record = serde_json::json!({
            "version": 1,
            "key": key,
            "saved_at": "2024-05-01T12:00:00Z",
            "data": devices,
        });
        fs::write(path, record.to_string()).unwrap();
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = sonofly_cmd();
        cmd.arg("--config").arg(self.config());
        cmd
    }
}

const HOME_ACCOUNT: &str = "[accounts.home]\nusername = \"me@example.com\"\npassword = \"hunter2\"\nmode = \"local\"\n";

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = sonofly_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    sonofly_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("eWeLink")
            .and(predicate::str::contains("send"))
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("run")),
    );
}

#[test]
fn test_version_flag() {
    sonofly_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sonofly"));
}

#[test]
fn test_completions_bash() {
    sonofly_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

// ── send ────────────────────────────────────────────────────────────

#[test]
fn test_send_rejects_bad_identifier_length() {
    let output = sonofly_cmd().args(["send", "12345", "-p", "switch=on"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Invalid device identifier"));
}

#[test]
fn test_send_rejects_malformed_param() {
    let output = sonofly_cmd()
        .args(["send", "1000abcd12", "-p", "switch"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("KEY=VALUE"));
}

#[test]
fn test_send_to_unconfigured_camera() {
    let ws = Workspace::new("");
    let output = ws.cmd().args(["send", "abc123", "--cmd", "up"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("camera 'abc123' not found"));
}

// ── devices ─────────────────────────────────────────────────────────

#[test]
fn test_devices_without_accounts() {
    let ws = Workspace::new("");
    let output = ws.cmd().arg("devices").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("No accounts configured"));
}

#[test]
fn test_devices_unknown_account() {
    let ws = Workspace::new(HOME_ACCOUNT);
    let output = ws.cmd().args(["--account", "cottage", "devices"]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("cottage"));
}

#[test]
fn test_devices_lists_cache() {
    let ws = Workspace::new(HOME_ACCOUNT);
    ws.seed_cache(
        "me@example.com",
        &serde_json::json!([
            {"deviceid": "1000abcd12", "name": "Kitchen", "online": true, "params": {"switch": "on"}},
            {"deviceid": "1000abcd13", "name": "Hall"}
        ]),
    );

    ws.cmd()
        .args(["-o", "plain", "devices"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1000abcd12").and(predicate::str::contains("1000abcd13")));

    let output = ws.cmd().args(["-o", "json", "devices"]).output().unwrap();
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed[0]["account"], "me@example.com");
    assert_eq!(listed[0]["deviceid"], "1000abcd12");
    assert_eq!(listed[0]["params"]["switch"], "on");
    assert_eq!(listed[1]["name"], "Hall");
}

#[test]
fn test_devices_with_no_cache_is_empty() {
    let ws = Workspace::new(HOME_ACCOUNT);
    ws.cmd()
        .args(["-o", "json", "devices"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

// ── config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_follows_flag() {
    let ws = Workspace::new("");
    ws.cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(ws.config().display().to_string()));
}

#[test]
fn test_config_show_masks_password() {
    let ws = Workspace::new(HOME_ACCOUNT);
    ws.cmd().args(["config", "show"]).assert().success().stdout(
        predicate::str::contains("me@example.com")
            .and(predicate::str::contains("****"))
            .and(predicate::str::contains("hunter2").not()),
    );
}

#[test]
fn test_config_import_legacy_yaml() {
    let ws = Workspace::new("");
    fs::write(
        ws.path().join("legacy.yaml"),
        "username: old@example.com\npassword: pw\nmode: cloud\n",
    )
    .unwrap();

    ws.cmd().args(["config", "import"]).assert().success();
    ws.cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("old@example.com"));

    // Second import is a no-op once an account exists.
    ws.cmd()
        .args(["config", "import"])
        .assert()
        .success()
        .stderr(predicate::str::contains("nothing imported"));
}

#[test]
fn test_config_import_without_legacy_file() {
    let ws = Workspace::new("");
    let output = ws.cmd().args(["config", "import"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("no usable legacy config"));
}

// ── run ─────────────────────────────────────────────────────────────

#[test]
fn test_run_without_accounts_fails_fast() {
    let ws = Workspace::new("");
    let output = ws.cmd().args(["run", "--no-stdin"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(combined_output(&output).contains("No accounts configured"));
}
