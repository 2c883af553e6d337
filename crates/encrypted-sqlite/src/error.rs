//! Error types for encrypted-sqlite.
//!
//! All errors are strongly typed and propagated without panicking.
//! Key material and plaintext passphrases are never included in error messages.

/// Error type covering envelope, key store, configuration and database operations.
#[derive(Debug, thiserror::Error)]
pub enum SqliteMcpError {
    /// A caller-supplied argument is missing, malformed or out of range.
    #[error("{0}")]
    InvalidParams(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No encryption key in the key store or the environment. The message
    /// carries operator guidance.
    #[error("{0}")]
    KeyNotFound(String),

    /// GCM tag verification failed: wrong key or tampered ciphertext.
    #[error("Authentication failed: wrong key or tampered ciphertext")]
    AuthenticationFailed,

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// An `encrypted:` passphrase could not be turned into plaintext.
    #[error("{0}")]
    PassphraseDecryption(String),

    /// The platform secret store command failed.
    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SqliteMcpError {
    /// Shorthand for [`SqliteMcpError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// Shorthand for a missing required argument.
    pub fn missing(key: &str) -> Self {
        Self::InvalidParams(format!("Missing required parameter: {key}"))
    }

    /// Whether this error stems from caller input rather than the engine or
    /// the credential subsystem.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::InvalidParams(_) | Self::InvalidInput(_))
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, SqliteMcpError>;
