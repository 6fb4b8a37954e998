//! Configuration system tests
//!
//! Loads, validates and overrides configuration through the CLI

mod common;

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("node.toml");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

fn node_cmd() -> Command {
    Command::cargo_bin("edge-node").unwrap()
}

fn validate(path: &str) -> assert_cmd::assert::Assert {
    node_cmd()
        .args(["config", "validate", "--config", path])
        .assert()
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_config_uses_defaults() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    validate(fixture.path()).success();
}

#[test]
fn test_valid_fixture() {
    validate(common::valid_config_fixture().to_str().unwrap())
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
port = 9100
bind_address = "127.0.0.1"
name = "edge-lab-01"

[discovery]
service_type = "_edge-node._tcp.local."
lookup_window_ms = 500

[gossip]
topic = "edge-node/functions"
listen_port = 4001
heartbeat_interval_ms = 500
idle_connection_timeout_secs = 30

[execution]
timeout_ms = 2000
worker_threads = 4

[logging]
level = "debug"
file = "/tmp/edge-node.log"
max_file_size_mb = 50
max_files = 3
json_format = true
"#,
    );

    validate(fixture.path()).success();
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_fixture() {
    validate(common::invalid_config_fixture().to_str().unwrap())
        .failure()
        .stderr(predicate::str::contains("E102"));
}

#[test]
fn test_invalid_service_type() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[discovery]
service_type = "edge-node"
"#,
    );

    validate(fixture.path())
        .failure()
        .stderr(predicate::str::contains("_name._tcp.local."));
}

#[test]
fn test_invalid_bind_address() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
bind_address = "everywhere"
"#,
    );

    validate(fixture.path()).failure();
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
level = "invalid_level"
"#,
    );

    validate(fixture.path()).failure();
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node
port = 8080
"#,
    );

    validate(fixture.path())
        .failure()
        .code(10)
        .stderr(predicate::str::contains("E101"));
}

// ─────────────────────────────────────────────────────────────────
// Config Show Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_custom() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
port = 9321
name = "edge-custom"

[execution]
timeout_ms = 750
"#,
    );

    node_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("9321"))
        .stdout(predicate::str::contains("edge-custom"))
        .stdout(predicate::str::contains("timeout_ms = 750"));
}

// ─────────────────────────────────────────────────────────────────
// Config Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_init_creates_valid_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("node.toml");
    let path = config_path.to_str().unwrap();

    node_cmd()
        .args(["config", "init", "--path", path])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file created"));

    assert!(config_path.exists());
    validate(path).success();
}

#[test]
fn test_config_init_refuses_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[node]\n");

    node_cmd()
        .args(["config", "init", "--path", fixture.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_init_force_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[node]\nname = \"stale-node\"\n");

    node_cmd()
        .args(["config", "init", "--path", fixture.path(), "--force"])
        .assert()
        .success();

    let content = fs::read_to_string(fixture.path()).unwrap();
    assert!(!content.contains("stale-node"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Variable Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[node]
port = 9000
"#,
    );

    node_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .env("EDGE_PORT", "9555")
        .env("EDGE_GOSSIP_TOPIC", "lab/functions")
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 9555"))
        .stdout(predicate::str::contains("lab/functions"));
}

#[test]
fn test_env_override_is_validated() {
    node_cmd()
        .args(["config", "validate"])
        .env("EDGE_LOG_LEVEL", "shouting")
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────
// Path Expansion Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_tilde_expansion() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
file = "~/edge-node/logs/node.log"
"#,
    );

    let output = node_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(!stdout.contains("file = \"~"));
}
