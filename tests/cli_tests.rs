//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn node_cmd() -> Command {
    Command::cargo_bin("edge-node").unwrap()
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    node_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Edge Node"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("peers"))
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    node_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("edge-node"))
        .stdout(predicate::str::contains("Build Information"))
        .stdout(predicate::str::contains("Git Hash"))
        .stdout(predicate::str::contains("Target"));
}

#[test]
fn test_short_version_flag() {
    node_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("edge-node"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_default() {
    node_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[node]"))
        .stdout(predicate::str::contains("[discovery]"))
        .stdout(predicate::str::contains("[gossip]"))
        .stdout(predicate::str::contains("[execution]"))
        .stdout(predicate::str::contains("[logging]"))
        .stdout(predicate::str::contains("_edge-node._tcp.local."));
}

#[test]
fn test_config_validate_default() {
    node_cmd()
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    node_cmd()
        .args(["config", "validate", "--config", "/nonexistent/path/node.toml"])
        .assert()
        .failure()
        .code(10)
        .stderr(predicate::str::contains("not found"));
}

// ─────────────────────────────────────────────────────────────────
// Deploy Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_deploy_help() {
    node_cmd()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--wasm"))
        .stdout(predicate::str::contains("--name"))
        .stdout(predicate::str::contains("http://localhost:8080"));
}

#[test]
fn test_deploy_missing_file() {
    node_cmd()
        .args(["deploy", "--wasm", "/nonexistent/f.wasm", "--name", "f"])
        .assert()
        .failure()
        .code(20)
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_deploy_unreachable_node() {
    let temp_dir = TempDir::new().unwrap();
    let wasm = temp_dir.path().join("f.wasm");
    fs::write(&wasm, b"\0asm\x01\0\0\0").unwrap();

    // Port 1 is privileged and never serves HTTP in the test environment
    node_cmd()
        .args(["deploy", "--name", "f", "--addr", "http://127.0.0.1:1", "--wasm"])
        .arg(&wasm)
        .assert()
        .failure()
        .code(60)
        .stderr(predicate::str::contains("Failed to connect"));
}

// ─────────────────────────────────────────────────────────────────
// Run Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_run_help() {
    node_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Run a node"))
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_run_with_invalid_config() {
    node_cmd()
        .args(["run", "--config", "/nonexistent/node.toml"])
        .assert()
        .failure();
}

#[test]
fn test_run_rejects_port_zero() {
    node_cmd()
        .args(["run", "--port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("between 1 and 65535"));
}

// ─────────────────────────────────────────────────────────────────
// Verbosity Flag Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flag() {
    node_cmd().args(["-v", "version"]).assert().success();
}

#[test]
fn test_very_verbose_flag() {
    node_cmd().args(["-vv", "version"]).assert().success();
}

#[test]
fn test_quiet_flag() {
    node_cmd().args(["--quiet", "version"]).assert().success();
}

// ─────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_command() {
    node_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    node_cmd().assert().failure();
}
