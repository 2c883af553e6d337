//! Encrypted SQLite MCP Server.
//!
//! Implements a stdio-based Model Context Protocol server that exposes
//! SQLCipher databases to AI agents via JSON-RPC 2.0.
//!
//! # Protocol
//!
//! Reads newline-delimited JSON-RPC 2.0 requests from stdin and writes
//! responses to stdout. Each request and response is a single line. Logs go
//! to stderr.
//!
//! # Default database
//!
//! `--args '{"db_path": "...", "passphrase": "...", "cipherProfile": {...}}'`
//! sets a database used by every tool call that does not name its own. The
//! passphrase may be an `encrypted:` value; it is decrypted on each call with
//! the key from the platform key store or `MCP_SQLITE_ENCRYPTION_KEY`.

mod protocol;
mod server;
mod tools;

use std::io;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use encrypted_sqlite::{ConnectionSettings, KeyResolver};

use crate::server::McpServer;

#[derive(Parser)]
#[command(
    name = "encrypted-sqlite-mcp",
    about = "MCP server exposing an encrypted SQLite database over stdio",
    version
)]
struct Cli {
    /// Default database as JSON: {"db_path", "passphrase", "cipherProfile"?}
    #[arg(long = "args", value_name = "JSON", value_parser = parse_default_settings)]
    default_settings: Option<ConnectionSettings>,

    /// Log filter for stderr output (overrides RUST_LOG), e.g. "debug"
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

fn parse_default_settings(raw: &str) -> Result<ConnectionSettings, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))?;
    ConnectionSettings::from_json(&value).map_err(|e| e.to_string())
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    // Stdout is reserved for JSON-RPC frames.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if let Some(settings) = &cli.default_settings {
        tracing::info!(path = %settings.database_path.display(), "default database configured");
    }

    let server = McpServer::new(cli.default_settings, KeyResolver::from_platform());
    let stdin = io::stdin();
    let stdout = io::stdout();
    server
        .run(stdin.lock(), stdout.lock())
        .context("failed to read from stdin")
}
