//! Database connection configuration.
//!
//! [`ConnectionSettings`] is what a caller supplies: a path, a passphrase that
//! may still carry the `encrypted:` marker, and a cipher profile.
//! [`DatabaseConfig`] is what a connection is opened with: the same values
//! with the passphrase decrypted. A `DatabaseConfig` lives for one call.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::crypto::key_source::KeyResolver;
use crate::error::{Result, SqliteMcpError};

/// Accepted spellings of the database path argument, highest priority first.
pub const DB_PATH_ALIASES: [&str; 3] = ["db_path", "dbPath", "db_Path"];

/// Argument name of the passphrase.
pub const PASSPHRASE_KEY: &str = "passphrase";

/// Argument name of the cipher profile override object.
pub const CIPHER_PROFILE_KEY: &str = "cipherProfile";

/// Look up the first alias present in `args` with a non-null value.
pub fn lookup_alias<'a>(args: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|alias| args.get(*alias))
        .find(|value| !value.is_null())
}

// ── Cipher profile ───────────────────────────────────────────────────────────

/// Parameters needed to open an SQLCipher database file consistently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherProfile {
    pub name: String,
    pub page_size: u32,
    pub kdf_iterations: u32,
    pub hmac_algorithm: String,
    pub kdf_algorithm: String,
}

impl Default for CipherProfile {
    fn default() -> Self {
        Self::sqlcipher4_defaults()
    }
}

impl CipherProfile {
    /// The SQLCipher 4 default settings.
    pub fn sqlcipher4_defaults() -> Self {
        Self {
            name: "SQLCipher 4 defaults".to_string(),
            page_size: 4096,
            kdf_iterations: 256_000,
            hmac_algorithm: "HMAC_SHA512".to_string(),
            kdf_algorithm: "PBKDF2_HMAC_SHA512".to_string(),
        }
    }

    /// Return a copy with every present override applied.
    pub fn apply(&self, overrides: &CipherProfileOverrides) -> Result<Self> {
        let profile = Self {
            name: overrides.name.clone().unwrap_or_else(|| self.name.clone()),
            page_size: overrides.page_size.unwrap_or(self.page_size),
            kdf_iterations: overrides.kdf_iterations.unwrap_or(self.kdf_iterations),
            hmac_algorithm: overrides
                .hmac_algorithm
                .clone()
                .unwrap_or_else(|| self.hmac_algorithm.clone()),
            kdf_algorithm: overrides
                .kdf_algorithm
                .clone()
                .unwrap_or_else(|| self.kdf_algorithm.clone()),
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Parse a `cipherProfile` JSON object and apply it on top of `self`.
    pub fn apply_json(&self, value: &Value) -> Result<Self> {
        if !value.is_object() {
            return Err(SqliteMcpError::invalid_params(
                "cipherProfile must be an object",
            ));
        }
        let overrides: CipherProfileOverrides = serde_json::from_value(value.clone())
            .map_err(|e| SqliteMcpError::invalid_params(format!("Invalid cipherProfile: {e}")))?;
        self.apply(&overrides)
    }

    fn validate(&self) -> Result<()> {
        if !(512..=65_536).contains(&self.page_size) || !self.page_size.is_power_of_two() {
            return Err(SqliteMcpError::invalid_params(format!(
                "cipherProfile.pageSize must be a power of two between 512 and 65536, got {}",
                self.page_size
            )));
        }
        if self.kdf_iterations == 0 {
            return Err(SqliteMcpError::invalid_params(
                "cipherProfile.kdfIterations must be positive",
            ));
        }
        Ok(())
    }

    /// Value for `PRAGMA cipher_hmac_algorithm`.
    pub fn hmac_pragma(&self) -> &'static str {
        let normalized = self.hmac_algorithm.to_ascii_uppercase();
        if normalized.contains("SHA256") {
            "HMAC_SHA256"
        } else if normalized.contains("SHA1") {
            "HMAC_SHA1"
        } else {
            "HMAC_SHA512"
        }
    }

    /// Value for `PRAGMA cipher_kdf_algorithm`.
    pub fn kdf_pragma(&self) -> &'static str {
        let normalized = self.kdf_algorithm.to_ascii_uppercase();
        if normalized.contains("256") {
            "PBKDF2_HMAC_SHA256"
        } else if normalized.contains("SHA1") {
            "PBKDF2_HMAC_SHA1"
        } else {
            "PBKDF2_HMAC_SHA512"
        }
    }
}

/// Partial cipher profile. Absent fields keep the base profile's value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherProfileOverrides {
    pub name: Option<String>,
    #[serde(alias = "page_size")]
    pub page_size: Option<u32>,
    #[serde(alias = "kdf_iterations")]
    pub kdf_iterations: Option<u32>,
    #[serde(alias = "hmac_algorithm")]
    pub hmac_algorithm: Option<String>,
    #[serde(alias = "kdf_algorithm")]
    pub kdf_algorithm: Option<String>,
}

// ── Connection settings ──────────────────────────────────────────────────────

/// Caller-supplied connection settings. The passphrase may be encrypted.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub database_path: PathBuf,
    pub passphrase: Zeroizing<String>,
    pub cipher_profile: CipherProfile,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("database_path", &self.database_path)
            .field("passphrase", &"<redacted>")
            .field("cipher_profile", &self.cipher_profile)
            .finish()
    }
}

impl ConnectionSettings {
    pub fn new(
        database_path: impl Into<PathBuf>,
        passphrase: impl Into<String>,
        cipher_profile: CipherProfile,
    ) -> Self {
        Self {
            database_path: database_path.into(),
            passphrase: Zeroizing::new(passphrase.into()),
            cipher_profile,
        }
    }

    /// Parse a complete settings object such as the `--args` startup value:
    /// `{db_path|dbPath|db_Path, passphrase, cipherProfile?}`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let args = value
            .as_object()
            .ok_or_else(|| SqliteMcpError::invalid_params("configuration must be a JSON object"))?;
        Self::resolve(args, None)
    }

    /// Resolve settings for one call.
    ///
    /// Each of path, passphrase and cipher profile is taken from `args` when
    /// present, otherwise from `default`. Without a default, path and
    /// passphrase are required.
    pub fn resolve(args: &Map<String, Value>, default: Option<&ConnectionSettings>) -> Result<Self> {
        let database_path = match lookup_alias(args, &DB_PATH_ALIASES) {
            Some(value) => PathBuf::from(non_empty_str(value, DB_PATH_ALIASES[0])?),
            None => default
                .map(|d| d.database_path.clone())
                .ok_or_else(|| SqliteMcpError::missing(DB_PATH_ALIASES[0]))?,
        };

        let passphrase = match args.get(PASSPHRASE_KEY).filter(|v| !v.is_null()) {
            Some(value) => Zeroizing::new(non_empty_str(value, PASSPHRASE_KEY)?.to_string()),
            None => default
                .map(|d| d.passphrase.clone())
                .ok_or_else(|| SqliteMcpError::missing(PASSPHRASE_KEY))?,
        };

        let base = default
            .map(|d| d.cipher_profile.clone())
            .unwrap_or_default();
        let cipher_profile = match args.get(CIPHER_PROFILE_KEY).filter(|v| !v.is_null()) {
            Some(value) => base.apply_json(value)?,
            None => base,
        };

        Ok(Self {
            database_path,
            passphrase,
            cipher_profile,
        })
    }

    /// Decrypt the passphrase if needed and produce a config ready to open.
    pub fn into_database_config(self, resolver: &KeyResolver) -> Result<DatabaseConfig> {
        DatabaseConfig::with_decrypted_passphrase(
            self.database_path,
            &self.passphrase,
            self.cipher_profile,
            resolver,
        )
    }
}

fn non_empty_str<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s),
        Some(_) => Err(SqliteMcpError::invalid_params(format!(
            "{name} must not be empty"
        ))),
        None => Err(SqliteMcpError::invalid_params(format!(
            "{name} must be a string"
        ))),
    }
}

// ── Database config ──────────────────────────────────────────────────────────

/// Everything needed to open one connection. The passphrase is plaintext and
/// zeroized on drop.
pub struct DatabaseConfig {
    pub database_path: PathBuf,
    pub passphrase: Zeroizing<String>,
    pub cipher_profile: CipherProfile,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("database_path", &self.database_path)
            .field("passphrase", &"<redacted>")
            .field("cipher_profile", &self.cipher_profile)
            .finish()
    }
}

impl DatabaseConfig {
    /// Build a config from an already-plaintext passphrase.
    pub fn new(
        database_path: impl Into<PathBuf>,
        passphrase: Zeroizing<String>,
        cipher_profile: CipherProfile,
    ) -> Self {
        Self {
            database_path: database_path.into(),
            passphrase,
            cipher_profile,
        }
    }

    /// Build a config, decrypting `passphrase` first when it carries the
    /// `encrypted:` marker.
    pub fn with_decrypted_passphrase(
        database_path: impl Into<PathBuf>,
        passphrase: &str,
        cipher_profile: CipherProfile,
        resolver: &KeyResolver,
    ) -> Result<Self> {
        let plaintext = resolver.decrypt_if_needed(passphrase)?;
        Ok(Self::new(database_path, plaintext, cipher_profile))
    }

    pub fn path(&self) -> &Path {
        &self.database_path
    }
}
