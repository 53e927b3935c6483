// Integration tests for CLI commands
// These exercise argument parsing and the failure paths that happen before
// any record store connection is attempted.

use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

fn ipgate() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ipgate"))
}

#[test]
fn test_cli_help() {
    let output = ipgate()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Chat-gated IP whitelist"));
    assert!(stdout.contains("serve"));
    assert!(stdout.contains("agent"));
    assert!(stdout.contains("chat"));
    assert!(stdout.contains("whitelist"));
    assert!(stdout.contains("status"));
    assert!(stdout.contains("version"));
}

#[test]
fn test_cli_version() {
    let output = ipgate()
        .arg("version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ipgate"));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_whitelist_subcommand_help() {
    let output = ipgate()
        .args(["whitelist", "--help"])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("list"));
    assert!(stdout.contains("remove"));
    assert!(stdout.contains("flush"));
}

#[test]
fn test_whitelist_remove_requires_ip() {
    let output = ipgate()
        .args(["whitelist", "remove"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("required") || stderr.contains("<IP>"));
}

#[test]
fn test_status_rejects_invalid_ip() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.toml");

    let output = ipgate()
        .args(["status", "not-an-ip", "--config"])
        .arg(&config)
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error"));
    // Rejected before the config is touched
    assert!(!config.exists());
}

#[test]
fn test_status_with_malformed_config() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "this is [not toml").unwrap();

    let output = ipgate()
        .args(["status", "203.0.113.7", "--config"])
        .arg(temp_file.path())
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error"));
}

#[test]
fn test_invalid_command() {
    let output = ipgate()
        .arg("invalid-command")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unrecognized") || stderr.contains("invalid"));
}
