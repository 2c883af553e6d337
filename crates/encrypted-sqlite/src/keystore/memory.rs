//! In-memory key store.

use std::sync::Mutex;

use crate::error::{Result, SqliteMcpError};
use crate::keystore::KeyStore;

/// Key store that keeps the key in process memory.
///
/// Behaves like a platform store: it can be marked unavailable, and it can be
/// made to fail on load to exercise error paths.
#[derive(Debug)]
pub struct MemoryKeyStore {
    key: Mutex<Option<String>>,
    available: bool,
    load_failure: Option<String>,
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKeyStore {
    /// An available, empty store.
    pub fn new() -> Self {
        Self {
            key: Mutex::new(None),
            available: true,
            load_failure: None,
        }
    }

    /// An available store already holding `key_base64`.
    pub fn with_key(key_base64: impl Into<String>) -> Self {
        Self {
            key: Mutex::new(Some(key_base64.into())),
            ..Self::new()
        }
    }

    /// A store that reports itself unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// An available store whose `load` always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            load_failure: Some(message.into()),
            ..Self::new()
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.key.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyStore for MemoryKeyStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn load(&self) -> Result<Option<String>> {
        if !self.available {
            return Ok(None);
        }
        if let Some(message) = &self.load_failure {
            return Err(SqliteMcpError::KeyStore(message.clone()));
        }
        Ok(self.slot().clone().filter(|k| !k.is_empty()))
    }

    fn store(&self, key_base64: &str) -> Result<()> {
        if !self.available {
            return Err(SqliteMcpError::Unsupported(
                "memory key store is unavailable".into(),
            ));
        }
        if key_base64.is_empty() {
            return Err(SqliteMcpError::InvalidInput("key must not be empty".into()));
        }
        *self.slot() = Some(key_base64.to_string());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        *self.slot() = None;
        Ok(())
    }
}
