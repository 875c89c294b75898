//! Binary-level checks: exit codes and doctor output.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn malformed_invocation_exits_three() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("superclaude")
        .unwrap()
        .args(["run", "/implement missing-namespace"])
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invocation error"));
}

#[test]
fn unknown_namespace_exits_three() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("superclaude")
        .unwrap()
        .args(["run", "/zz:implement task"])
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("unknown namespace"));
}

#[test]
fn doctor_reports_providers_and_tiers() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("superclaude")
        .unwrap()
        .arg("doctor")
        .arg("--dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("providers:"))
        .stdout(predicate::str::contains("anthropic"))
        .stdout(predicate::str::contains("deep_thinking"));
}
