//! macOS Keychain adapter backed by `/usr/bin/security`.
//!
//! Every operation spawns the `security` tool synchronously and blocks until it
//! exits. There is no timeout: a hung `security` process hangs the caller.
//!
//! `load`, `store` and `delete` do not re-check availability; callers ask
//! [`KeyStore::is_available`] once and skip the store when it is false.

use std::process::{Command, Output, Stdio};

use crate::error::{Result, SqliteMcpError};
use crate::keystore::{KeyStore, KEYCHAIN_ACCOUNT, KEYCHAIN_SERVICE};

const SECURITY_CMD: &str = "/usr/bin/security";

/// `security` exit code for "The specified item could not be found in the keychain."
pub const EXIT_ITEM_NOT_FOUND: i32 = 44;

/// Generic-password entry in the login keychain.
#[derive(Debug, Clone)]
pub struct MacKeychain {
    command: String,
    service: String,
    account: String,
}

impl Default for MacKeychain {
    fn default() -> Self {
        Self::new()
    }
}

impl MacKeychain {
    pub fn new() -> Self {
        Self {
            command: SECURITY_CMD.to_string(),
            service: KEYCHAIN_SERVICE.to_string(),
            account: KEYCHAIN_ACCOUNT.to_string(),
        }
    }

    /// Drive a different `security`-compatible executable.
    pub fn with_command(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::new()
        }
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        log::debug!("running {} {}", self.command, args.first().unwrap_or(&""));
        Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SqliteMcpError::KeyStore(format!("failed to run {}: {e}", self.command)))
    }
}

impl KeyStore for MacKeychain {
    fn name(&self) -> &'static str {
        "macos-keychain"
    }

    fn is_available(&self) -> bool {
        // `security help` exits 0 or 2 (no sub-command) when the tool works.
        match self.run(&["help"]) {
            Ok(output) => matches!(output.status.code(), Some(0) | Some(2)),
            Err(_) => false,
        }
    }

    fn load(&self) -> Result<Option<String>> {
        let output = self.run(&[
            "find-generic-password",
            "-a",
            &self.account,
            "-s",
            &self.service,
            "-w",
        ])?;
        interpret_find_output(output.status.code(), &output.stdout, &output.stderr)
    }

    fn store(&self, key_base64: &str) -> Result<()> {
        if key_base64.is_empty() {
            return Err(SqliteMcpError::InvalidInput("key must not be empty".into()));
        }

        self.delete()?;

        let output = self.run(&[
            "add-generic-password",
            "-a",
            &self.account,
            "-s",
            &self.service,
            "-w",
            key_base64,
            "-U",
        ])?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SqliteMcpError::KeyStore(format!(
                "storing key failed (exit code {}): {}",
                exit_code_label(output.status.code()),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    fn delete(&self) -> Result<()> {
        let output = self.run(&[
            "delete-generic-password",
            "-a",
            &self.account,
            "-s",
            &self.service,
        ])?;
        interpret_delete_status(output.status.code(), &output.stderr)
    }
}

/// Map the result of `find-generic-password -w` to a key.
///
/// Exit 44 and empty output are "no key"; any other failure is an error
/// carrying stderr.
pub fn interpret_find_output(
    code: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<Option<String>> {
    match code {
        Some(0) => {
            let key = String::from_utf8_lossy(stdout).trim().to_string();
            Ok(if key.is_empty() { None } else { Some(key) })
        }
        Some(EXIT_ITEM_NOT_FOUND) => Ok(None),
        other => Err(SqliteMcpError::KeyStore(format!(
            "loading key failed (exit code {}): {}",
            exit_code_label(other),
            String::from_utf8_lossy(stderr).trim()
        ))),
    }
}

/// Map the exit status of `delete-generic-password`. A missing item is fine.
pub fn interpret_delete_status(code: Option<i32>, stderr: &[u8]) -> Result<()> {
    match code {
        Some(0) | Some(EXIT_ITEM_NOT_FOUND) => Ok(()),
        other => Err(SqliteMcpError::KeyStore(format!(
            "deleting key failed (exit code {}): {}",
            exit_code_label(other),
            String::from_utf8_lossy(stderr).trim()
        ))),
    }
}

fn exit_code_label(code: Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}
