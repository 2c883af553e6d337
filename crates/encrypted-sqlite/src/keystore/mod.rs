//! Platform key store access for the passphrase encryption key.
//!
//! The encryption key is kept outside the host configuration, either in the
//! environment or in a platform secret store. This module hides the secret
//! store behind the [`KeyStore`] trait:
//!
//! - [`MacKeychain`]: macOS Keychain via the `security` command-line tool.
//! - [`NoKeyStore`]: platforms without a supported secret store.
//! - [`MemoryKeyStore`]: in-process store, used by tests and embedders.

pub mod macos;
pub mod memory;

pub use macos::MacKeychain;
pub use memory::MemoryKeyStore;

use crate::error::{Result, SqliteMcpError};

/// Keychain service name under which the key is stored.
pub const KEYCHAIN_SERVICE: &str = "mcp-sqlite";

/// Keychain account name under which the key is stored.
pub const KEYCHAIN_ACCOUNT: &str = "encryption-key";

/// Storage for the Base64-encoded encryption key.
pub trait KeyStore {
    /// Short human-readable name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Whether the backing store can be used on this machine.
    fn is_available(&self) -> bool;

    /// Load the stored key. `Ok(None)` when the store holds no entry.
    ///
    /// Callers check [`is_available`](Self::is_available) first; an
    /// unavailable store may return an error here.
    fn load(&self) -> Result<Option<String>>;

    /// Store a key, replacing any existing entry.
    fn store(&self, key_base64: &str) -> Result<()>;

    /// Delete the stored key. Deleting a missing entry succeeds.
    fn delete(&self) -> Result<()>;

    /// Whether a non-empty key is currently stored. Load errors count as "no".
    fn has_key(&self) -> bool {
        self.is_available() && matches!(self.load(), Ok(Some(ref k)) if !k.is_empty())
    }
}

/// Key store for platforms without a supported secret store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoKeyStore;

impl KeyStore for NoKeyStore {
    fn name(&self) -> &'static str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn load(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn store(&self, _key_base64: &str) -> Result<()> {
        Err(SqliteMcpError::Unsupported(
            "no platform key store is available on this system".into(),
        ))
    }

    fn delete(&self) -> Result<()> {
        Ok(())
    }
}

/// The key store for the current platform.
pub fn platform_key_store() -> Box<dyn KeyStore> {
    if cfg!(target_os = "macos") {
        Box::new(MacKeychain::new())
    } else {
        Box::new(NoKeyStore)
    }
}
