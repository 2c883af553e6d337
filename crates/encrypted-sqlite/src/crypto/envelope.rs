//! Passphrase envelope using AES-256-GCM.
//!
//! Database passphrases can be stored in host configuration as
//! `encrypted:<base64>` instead of plaintext. The payload layout is:
//!
//! ```text
//! [ nonce (12 bytes) | ciphertext | tag (16 bytes) ]
//! ```
//!
//! A fresh random nonce is drawn for every call to [`PassphraseEnvelope::encrypt`];
//! a nonce must never repeat under the same key.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use zeroize::Zeroizing;

use crate::crypto::random::{random_key_32, random_nonce_12};
use crate::error::{Result, SqliteMcpError};

/// Marker that identifies an encrypted passphrase.
pub const ENCRYPTED_PREFIX: &str = "encrypted:";

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Standard-alphabet Base64 that decodes with or without `=` padding.
/// Output is always padded.
pub const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Symmetric envelope bound to one 256-bit key.
///
/// The key is zeroized on drop.
pub struct PassphraseEnvelope {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for PassphraseEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseEnvelope")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl PassphraseEnvelope {
    /// Build an envelope from Base64-encoded key material.
    ///
    /// Rejects input that is empty, not Base64, not exactly 32 bytes, or weak
    /// (see [`is_weak_key`]).
    pub fn from_key_material(key_base64: &str) -> Result<Self> {
        let trimmed = key_base64.trim();
        if trimmed.is_empty() {
            return Err(SqliteMcpError::InvalidKey("key must not be empty".into()));
        }

        let decoded = Zeroizing::new(
            BASE64_LENIENT
                .decode(trimmed)
                .map_err(|_| SqliteMcpError::InvalidKey("key is not valid Base64".into()))?,
        );

        if decoded.len() != KEY_LEN {
            return Err(SqliteMcpError::InvalidKey(format!(
                "key must be exactly {KEY_LEN} bytes (256 bits), got {} bytes",
                decoded.len()
            )));
        }

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&decoded);
        Self::from_bytes(key)
    }

    /// Build an envelope from raw key bytes, applying the same weak-key check.
    pub fn from_bytes(key: Zeroizing<[u8; KEY_LEN]>) -> Result<Self> {
        if is_weak_key(&key[..]) {
            return Err(SqliteMcpError::InvalidKey(
                "key is too weak, use a randomly generated key".into(),
            ));
        }
        Ok(Self { key })
    }

    /// Encrypt a passphrase. Returns `encrypted:<base64(nonce ‖ ciphertext ‖ tag)>`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Err(SqliteMcpError::InvalidInput(
                "passphrase must not be empty".into(),
            ));
        }

        let nonce_bytes = random_nonce_12();
        let cipher = self.cipher()?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| SqliteMcpError::EncryptionFailed(format!("encrypt: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(payload)))
    }

    /// Decrypt a value produced by [`encrypt`](Self::encrypt). The prefix is optional.
    pub fn decrypt(&self, value: &str) -> Result<Zeroizing<String>> {
        let encoded = strip_prefix(value.trim());
        if encoded.is_empty() {
            return Err(SqliteMcpError::InvalidInput(
                "encrypted passphrase must not be empty".into(),
            ));
        }

        let payload = BASE64_LENIENT
            .decode(encoded)
            .map_err(|_| SqliteMcpError::MalformedCiphertext("payload is not valid Base64".into()))?;

        if payload.len() < NONCE_LEN {
            return Err(SqliteMcpError::MalformedCiphertext(format!(
                "payload is {} bytes, shorter than the {NONCE_LEN}-byte nonce",
                payload.len()
            )));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let cipher = self.cipher()?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| SqliteMcpError::AuthenticationFailed)?,
        );

        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| SqliteMcpError::MalformedCiphertext("plaintext is not UTF-8".into()))?;
        Ok(Zeroizing::new(text.to_owned()))
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key[..])
            .map_err(|e| SqliteMcpError::EncryptionFailed(format!("cipher init: {e}")))
    }
}

/// Generate a new random 256-bit key, Base64-encoded.
pub fn generate_key() -> String {
    let key = Zeroizing::new(random_key_32());
    STANDARD.encode(&key[..])
}

/// Whether `value` carries the `encrypted:` marker. Does not decode anything.
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Remove the `encrypted:` marker if present.
pub fn strip_prefix(value: &str) -> &str {
    value.strip_prefix(ENCRYPTED_PREFIX).unwrap_or(value)
}

/// Weak-key heuristic: all-zero, or one byte value makes up more than 75%
/// of the key.
pub fn is_weak_key(key: &[u8]) -> bool {
    if key.iter().all(|&b| b == 0) {
        return true;
    }

    let mut counts = [0usize; 256];
    for &b in key {
        counts[b as usize] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(0);
    max_count * 4 > key.len() * 3
}
