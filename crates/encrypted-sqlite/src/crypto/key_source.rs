//! Encryption key resolution.
//!
//! Lookup order:
//! 1. the platform key store, if available and populated;
//! 2. the `MCP_SQLITE_ENCRYPTION_KEY` environment variable.
//!
//! The key is looked up on every call, never cached.

use zeroize::Zeroizing;

use crate::crypto::envelope::{is_encrypted, PassphraseEnvelope};
use crate::error::{Result, SqliteMcpError};
use crate::keystore::{platform_key_store, KeyStore};

/// Environment variable holding the Base64-encoded 256-bit key.
pub const ENCRYPTION_KEY_ENV: &str = "MCP_SQLITE_ENCRYPTION_KEY";

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    KeyStore(&'static str),
    Environment,
}

impl std::fmt::Display for KeyOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyOrigin::KeyStore(name) => write!(f, "key store ({name})"),
            KeyOrigin::Environment => write!(f, "environment"),
        }
    }
}

/// Resolves the passphrase encryption key from a key store and the environment.
pub struct KeyResolver {
    store: Box<dyn KeyStore>,
    env_var: String,
}

impl std::fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolver")
            .field("store", &self.store.name())
            .field("env_var", &self.env_var)
            .finish()
    }
}

impl KeyResolver {
    pub fn new(store: Box<dyn KeyStore>) -> Self {
        Self {
            store,
            env_var: ENCRYPTION_KEY_ENV.to_string(),
        }
    }

    /// Resolver backed by the current platform's key store.
    pub fn from_platform() -> Self {
        Self::new(platform_key_store())
    }

    /// Read the key from a different environment variable.
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = name.into();
        self
    }

    pub fn key_store(&self) -> &dyn KeyStore {
        self.store.as_ref()
    }

    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    /// Find the Base64 key material and report where it came from.
    ///
    /// The store's availability is probed once per lookup.
    pub fn resolve_key_material(&self) -> Result<(Zeroizing<String>, KeyOrigin)> {
        let store_available = self.store.is_available();
        if store_available {
            match self.store.load() {
                Ok(Some(key)) if !key.trim().is_empty() => {
                    log::debug!("encryption key loaded from {}", self.store.name());
                    return Ok((Zeroizing::new(key), KeyOrigin::KeyStore(self.store.name())));
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("loading key from {} failed, trying environment: {e}", self.store.name());
                }
            }
        }

        match std::env::var(&self.env_var) {
            Ok(key) if !key.trim().is_empty() => {
                log::debug!("encryption key loaded from ${}", self.env_var);
                Ok((Zeroizing::new(key), KeyOrigin::Environment))
            }
            _ => Err(SqliteMcpError::KeyNotFound(
                self.missing_key_guidance(store_available),
            )),
        }
    }

    /// Build an envelope from the resolved key.
    pub fn envelope(&self) -> Result<PassphraseEnvelope> {
        let (material, _) = self.resolve_key_material()?;
        PassphraseEnvelope::from_key_material(&material)
    }

    /// Return `value` unchanged unless it carries the `encrypted:` marker, in
    /// which case it is decrypted with the resolved key.
    pub fn decrypt_if_needed(&self, value: &str) -> Result<Zeroizing<String>> {
        if !is_encrypted(value) {
            return Ok(Zeroizing::new(value.to_string()));
        }

        let envelope = self.envelope().map_err(|e| match e {
            SqliteMcpError::KeyNotFound(guidance) => SqliteMcpError::PassphraseDecryption(format!(
                "Encrypted passphrase detected but no encryption key is available. {guidance}"
            )),
            other => SqliteMcpError::PassphraseDecryption(format!(
                "Failed to decrypt passphrase: {other}"
            )),
        })?;

        let plaintext = envelope.decrypt(value).map_err(|e| {
            SqliteMcpError::PassphraseDecryption(format!(
                "Failed to decrypt passphrase: {e}. Check that {} or the {} entry holds the key the passphrase was encrypted with",
                self.env_var,
                self.store.name()
            ))
        })?;

        if plaintext.is_empty() {
            return Err(SqliteMcpError::PassphraseDecryption(
                "Decrypted passphrase is empty".into(),
            ));
        }
        Ok(plaintext)
    }

    fn missing_key_guidance(&self, store_available: bool) -> String {
        if store_available {
            format!(
                "Encryption key not found. Store one in the {} key store:\n  \
                 esqlite keychain store --generate\n\
                 or set the environment variable:\n  \
                 export {}=\"<key>\"",
                self.store.name(),
                self.env_var
            )
        } else {
            format!(
                "Encryption key not found. Set the environment variable:\n  \
                 export {}=\"$(esqlite generate-key)\"",
                self.env_var
            )
        }
    }
}
