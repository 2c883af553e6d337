//! Cryptographic primitives for encrypted-sqlite.
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption of database passphrases
//! - Encryption key resolution from the platform key store or the environment
//! - Cryptographically secure random number generation

pub mod envelope;
pub mod key_source;
pub mod random;
