//! Integration tests for commands that run without a cluster.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// A `permit` invocation isolated from the caller's configuration.
fn permit(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("permit").unwrap();
    cmd.current_dir(config_dir.path())
        .arg("--config-dir")
        .arg(config_dir.path())
        .env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// Config Commands
// ============================================================================

#[test]
fn config_show_prints_defaults_as_toml() {
    let dir = TempDir::new().unwrap();

    permit(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[issuer]"))
        .stdout(predicate::str::contains("approval = \"self\""))
        .stdout(predicate::str::contains("page_size = 100"));
}

#[test]
fn config_show_prints_json() {
    let dir = TempDir::new().unwrap();

    permit(&dir)
        .args(["config", "show", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"signer_name\""))
        .stdout(predicate::str::contains("kubernetes.io/kube-apiserver-client"));
}

#[test]
fn config_show_rejects_unknown_format() {
    let dir = TempDir::new().unwrap();

    permit(&dir)
        .args(["config", "show", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown format"));
}

#[test]
fn config_file_in_config_dir_is_applied() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("config.toml"),
        "[issuer]\napproval = \"external\"\napproval_timeout_secs = 300\n",
    )
    .unwrap();

    permit(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("approval = \"external\""))
        .stdout(predicate::str::contains("approval_timeout_secs = 300"));
}

#[test]
fn project_file_overrides_config_dir() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.toml"), "[cluster]\nname = \"staging\"\n").unwrap();
    fs::write(dir.path().join("permit.toml"), "[cluster]\nname = \"production\"\n").unwrap();

    permit(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("name = \"production\""));
}

#[test]
fn context_flag_overrides_configuration() {
    let dir = TempDir::new().unwrap();

    permit(&dir)
        .args(["--context", "kind-dev", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("context = \"kind-dev\""));
}

#[test]
fn invalid_configuration_fails_before_connecting() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.toml"), "[store]\npage_size = 0\n").unwrap();

    permit(&dir)
        .args(["namespaces"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("store.page_size"));
}

#[test]
fn version_ignores_broken_configuration() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.toml"), "[store]\npage_size = 0\n").unwrap();

    permit(&dir).arg("version").assert().success();
}
