//! encrypted-sqlite: encrypted SQLite access for AI agents.
//!
//! Provides the AES-256-GCM passphrase envelope, platform key store access,
//! cipher-profile aware database configuration, SQL identifier validation and
//! a per-call SQL client with table/column/index introspection. The
//! `encrypted-sqlite-mcp` binary exposes these operations over JSON-RPC.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod identifier;
pub mod keystore;

// Re-export primary types
pub use config::{CipherProfile, CipherProfileOverrides, ConnectionSettings, DatabaseConfig};
pub use crypto::envelope::{PassphraseEnvelope, ENCRYPTED_PREFIX};
pub use crypto::key_source::{KeyOrigin, KeyResolver, ENCRYPTION_KEY_ENV};
pub use db::QueryResult;
pub use error::{Result, SqliteMcpError};
pub use keystore::{platform_key_store, KeyStore, MacKeychain, MemoryKeyStore, NoKeyStore};
