//! Integration test: passphrase envelope properties.
//!
//! Round trips across many inputs, nonce freshness, tamper detection, key
//! validation and key resolution through an in-memory key store.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use encrypted_sqlite::crypto::envelope::{generate_key, is_encrypted, NONCE_LEN, TAG_LEN};
use encrypted_sqlite::{
    KeyOrigin, KeyResolver, MemoryKeyStore, NoKeyStore, PassphraseEnvelope, SqliteMcpError,
    ENCRYPTED_PREFIX,
};

fn envelope() -> PassphraseEnvelope {
    PassphraseEnvelope::from_key_material(&generate_key()).unwrap()
}

fn payload(encrypted: &str) -> Vec<u8> {
    STANDARD
        .decode(encrypted.strip_prefix(ENCRYPTED_PREFIX).unwrap())
        .unwrap()
}

#[test]
fn roundtrip_across_inputs() {
    let env = envelope();
    let inputs = [
        "a",
        "correct horse battery staple",
        "pass'with\"quotes;--",
        "ünïcödé パスワード 🔐",
        &"x".repeat(4096),
    ];
    for input in inputs {
        let encrypted = env.encrypt(input).unwrap();
        assert!(is_encrypted(&encrypted));
        assert_eq!(env.decrypt(&encrypted).unwrap().as_str(), input);
        assert_eq!(payload(&encrypted).len(), NONCE_LEN + input.len() + TAG_LEN);
    }
}

#[test]
fn nonces_never_repeat() {
    let env = envelope();
    let nonces: HashSet<Vec<u8>> = (0..500)
        .map(|_| payload(&env.encrypt("same passphrase").unwrap())[..NONCE_LEN].to_vec())
        .collect();
    assert_eq!(nonces.len(), 500);
}

#[test]
fn any_flipped_byte_fails_authentication() {
    let env = envelope();
    let encrypted = env.encrypt("tamper-evident").unwrap();
    let original = payload(&encrypted);

    for i in 0..original.len() {
        let mut tampered = original.clone();
        tampered[i] ^= 0x01;
        let value = format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(&tampered));
        assert!(
            matches!(env.decrypt(&value), Err(SqliteMcpError::AuthenticationFailed)),
            "flipping byte {i} was not detected"
        );
    }
}

#[test]
fn wrong_key_fails_authentication() {
    let encrypted = envelope().encrypt("secret").unwrap();
    assert!(matches!(
        envelope().decrypt(&encrypted),
        Err(SqliteMcpError::AuthenticationFailed)
    ));
}

#[test]
fn weak_and_malformed_keys_are_rejected() {
    let zeros = STANDARD.encode([0u8; 32]);
    let repeated = STANDARD.encode([7u8; 32]);
    let short = STANDARD.encode([1u8, 2, 3, 4]);
    for key in [zeros.as_str(), repeated.as_str(), short.as_str(), "", "not base64!"] {
        assert!(
            matches!(
                PassphraseEnvelope::from_key_material(key),
                Err(SqliteMcpError::InvalidKey(_))
            ),
            "key {key:?} was accepted"
        );
    }
}

#[test]
fn key_errors_do_not_echo_key_material() {
    let short = STANDARD.encode(b"sixteen byte key");
    let err = PassphraseEnvelope::from_key_material(&short).unwrap_err();
    assert!(!err.to_string().contains(&short));
}

#[test]
fn unmarked_values_pass_through_resolution() {
    let resolver = KeyResolver::new(Box::new(NoKeyStore)).with_env_var("ESQ_PROP_UNSET_KEY");
    let out = resolver.decrypt_if_needed("plain-passphrase").unwrap();
    assert_eq!(out.as_str(), "plain-passphrase");
}

#[test]
fn key_store_takes_precedence_over_environment() {
    let stored = generate_key();
    let env_key = generate_key();
    std::env::set_var("ESQ_PROP_PRECEDENCE_KEY", &env_key);

    let resolver = KeyResolver::new(Box::new(MemoryKeyStore::with_key(stored.clone())))
        .with_env_var("ESQ_PROP_PRECEDENCE_KEY");
    let (material, origin) = resolver.resolve_key_material().unwrap();
    assert_eq!(material.as_str(), stored);
    assert_eq!(origin, KeyOrigin::KeyStore("memory"));

    let encrypted = PassphraseEnvelope::from_key_material(&stored)
        .unwrap()
        .encrypt("stored-key-secret")
        .unwrap();
    assert_eq!(
        resolver.decrypt_if_needed(&encrypted).unwrap().as_str(),
        "stored-key-secret"
    );

    std::env::remove_var("ESQ_PROP_PRECEDENCE_KEY");
}

#[test]
fn missing_key_gives_guidance() {
    let resolver = KeyResolver::new(Box::new(NoKeyStore)).with_env_var("ESQ_PROP_MISSING_KEY");
    let encrypted = envelope().encrypt("secret").unwrap();
    let err = resolver.decrypt_if_needed(&encrypted).unwrap_err();
    assert!(matches!(err, SqliteMcpError::PassphraseDecryption(_)));
    assert!(err.to_string().contains("ESQ_PROP_MISSING_KEY"));
}
