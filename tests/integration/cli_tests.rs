//! Integration tests for the CLI binary.
//!
//! Verifies that the `esqlite` binary responds to basic flags and that keys
//! and passphrases round-trip through its subcommands.
//!
//! This test is registered as a [[test]] in the encrypted-sqlite-cli crate
//! so that CARGO_BIN_EXE_esqlite is available.

use std::process::{Command, Output};

/// Get a Command pointing to the `esqlite` binary.
fn esqlite_binary() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_esqlite"));
    cmd.env_remove("MCP_SQLITE_ENCRYPTION_KEY");
    cmd
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn generated_key() -> String {
    let output = esqlite_binary()
        .arg("generate-key")
        .output()
        .expect("failed to execute esqlite generate-key");
    assert!(output.status.success());
    stdout_of(&output).trim().to_string()
}

#[test]
fn cli_responds_to_help() {
    let output = esqlite_binary()
        .arg("--help")
        .output()
        .expect("failed to execute esqlite --help");

    assert!(
        output.status.success(),
        "esqlite --help should exit with success, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = stdout_of(&output);
    assert!(
        stdout.contains("generate-key") && stdout.contains("keychain"),
        "esqlite --help should list subcommands, got: {stdout}"
    );
}

#[test]
fn cli_responds_to_version() {
    let output = esqlite_binary()
        .arg("--version")
        .output()
        .expect("failed to execute esqlite --version");

    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(
        stdout.contains("esqlite") && stdout.contains("0.1"),
        "esqlite --version should contain version info, got: {stdout}"
    );
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let output = esqlite_binary()
        .arg("--nonexistent-flag")
        .output()
        .expect("failed to execute esqlite");

    assert!(
        !output.status.success(),
        "esqlite with unknown flag should exit with error"
    );
}

#[test]
fn generate_key_prints_distinct_32_byte_keys() {
    let a = generated_key();
    let b = generated_key();
    assert_ne!(a, b);
    // 32 bytes of standard Base64 with padding.
    assert_eq!(a.len(), 44);
    assert!(a.ends_with('='));
}

#[test]
fn encrypt_then_decrypt_with_explicit_key() {
    let key = generated_key();

    let output = esqlite_binary()
        .args(["encrypt", "hunter2-passphrase", "--key", &key])
        .output()
        .expect("failed to execute esqlite encrypt");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let encrypted = stdout_of(&output).trim().to_string();
    assert!(encrypted.starts_with("encrypted:"));

    let output = esqlite_binary()
        .args(["decrypt", &encrypted, "--key", &key])
        .output()
        .expect("failed to execute esqlite decrypt");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("18 characters"), "got: {stdout}");
    assert!(!stdout.contains("hunter2-passphrase"), "plaintext leaked: {stdout}");

    let output = esqlite_binary()
        .args(["decrypt", &encrypted, "--key", &key, "--reveal"])
        .output()
        .expect("failed to execute esqlite decrypt --reveal");
    assert!(stdout_of(&output).contains("hunter2-passphrase"));
}

#[test]
fn decrypt_with_wrong_key_fails() {
    let key = generated_key();
    let other = generated_key();

    let output = esqlite_binary()
        .args(["encrypt", "secret", "--key", &key])
        .output()
        .unwrap();
    let encrypted = stdout_of(&output).trim().to_string();

    let output = esqlite_binary()
        .args(["decrypt", &encrypted, "--key", &other])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn encrypt_rejects_weak_key() {
    // 32 zero bytes.
    let weak = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    let output = esqlite_binary()
        .args(["encrypt", "secret", "--key", weak])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn encrypt_uses_environment_key() {
    let key = generated_key();
    let output = esqlite_binary()
        .env("MCP_SQLITE_ENCRYPTION_KEY", &key)
        .args(["encrypt", "from-env"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let encrypted = stdout_of(&output).trim().to_string();

    let output = esqlite_binary()
        .args(["decrypt", &encrypted, "--key", &key, "--reveal"])
        .output()
        .unwrap();
    assert!(stdout_of(&output).contains("from-env"));
}

#[test]
fn check_connection_lists_tables() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("check.db");
    std::fs::File::create(&db).unwrap();

    let output = esqlite_binary()
        .arg("check-connection")
        .arg(&db)
        .arg("cli-pass")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout_of(&output).contains("Connection: ok"));
}

#[test]
fn check_connection_missing_file() {
    let tmp = tempfile::tempdir().unwrap();
    let output = esqlite_binary()
        .arg("check-connection")
        .arg(tmp.path().join("absent.db"))
        .arg("pass")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}
