//! CLI argument parsing tests.
//!
//! Nothing here needs a cluster: every case either exits before connecting
//! or fails during parsing.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;

fn permit() -> Command {
    Command::cargo_bin("permit").unwrap()
}

// ============================================================================
// Commands That Work Without a Cluster
// ============================================================================

#[test]
fn version_command_succeeds() {
    permit()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("permit"));
}

#[test]
fn version_flag_shows_version() {
    permit()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("permit"));
}

#[test]
fn help_flag_shows_usage() {
    permit()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Kubernetes"))
        .stdout(predicate::str::contains("grant"));
}

// ============================================================================
// Required Arguments
// ============================================================================

#[test]
fn user_create_requires_name() {
    permit()
        .args(["user", "create"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn provision_requires_a_namespace_selection() {
    permit()
        .args(["user", "provision", "alice", "--template", "developer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn provision_rejects_both_namespace_selections() {
    permit()
        .args([
            "user",
            "provision",
            "alice",
            "--template",
            "developer",
            "--namespaces",
            "dev",
            "--all-namespaces",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn grant_requires_a_role() {
    permit()
        .args(["grant", "alice", "-n", "dev"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn grant_role_requires_namespace() {
    permit()
        .args(["grant", "alice", "--role", "deployer"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--namespace"));
}

#[test]
fn role_create_requires_a_rule() {
    permit()
        .args(["role", "create", "deployer", "-n", "dev"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--rule"));
}

#[test]
fn role_list_namespace_conflicts_with_cluster() {
    permit()
        .args(["role", "list", "-n", "dev", "--cluster"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

// ============================================================================
// Value Parsing
// ============================================================================

#[test]
fn unknown_template_is_rejected() {
    permit()
        .args([
            "user",
            "provision",
            "alice",
            "--template",
            "superuser",
            "--namespaces",
            "dev",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn unknown_cluster_access_is_rejected() {
    permit()
        .args([
            "user",
            "provision",
            "alice",
            "--template",
            "operation",
            "--all-namespaces",
            "--cluster-access",
            "root",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn malformed_rule_is_rejected() {
    permit()
        .args(["role", "create", "deployer", "--rule", "pods"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GROUPS:RESOURCES:VERBS"));
}

#[test]
fn unknown_log_format_is_rejected() {
    permit()
        .args(["--log-format", "xml", "version"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
