//! Build script for the edge node
//!
//! Embeds git revision, build time, target and compiler version so that
//! `edge-node version` can report exactly what is running on a node.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_branch = command_output("git", &["rev-parse", "--abbrev-ref", "HEAD"]);
    let git_dirty = match Command::new("git").args(["status", "--porcelain"]).output() {
        Ok(out) if out.status.success() => (!out.stdout.is_empty()).to_string(),
        _ => "unknown".to_string(),
    };

    let vars = [
        ("EDGE_GIT_HASH", git_hash),
        ("EDGE_GIT_BRANCH", git_branch),
        ("EDGE_GIT_DIRTY", git_dirty),
        (
            "EDGE_BUILD_TIMESTAMP",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        ("EDGE_TARGET", env_or_unknown("TARGET")),
        ("EDGE_PROFILE", env_or_unknown("PROFILE")),
        ("EDGE_HOST", env_or_unknown("HOST")),
        ("EDGE_RUSTC_VERSION", command_output("rustc", &["--version"])),
    ];

    for (key, value) in &vars {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

fn env_or_unknown(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| "unknown".to_string())
}

/// Trimmed stdout of a successful command, or "unknown"
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
