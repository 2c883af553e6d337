//! `esqlite`: command-line companion for the encrypted SQLite MCP server.
//!
//! Generates passphrase encryption keys, produces and checks `encrypted:`
//! passphrase values, manages the key in the platform key store and verifies
//! that a database opens the same way the server opens it.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};

use encrypted_sqlite::crypto::envelope::{generate_key, is_encrypted, BASE64_LENIENT};
use encrypted_sqlite::{
    db, platform_key_store, CipherProfile, DatabaseConfig, KeyResolver, PassphraseEnvelope,
    ENCRYPTION_KEY_ENV,
};

// ── CLI definition ────────────────────────────────────────────────────────────

/// esqlite: keys and passphrases for encrypted SQLite databases.
#[derive(Parser, Debug)]
#[command(
    name = "esqlite",
    about = "Key and passphrase tooling for the encrypted SQLite MCP server",
    version,
    long_about = "Generate encryption keys, encrypt database passphrases for host \
                  configuration files, manage the key in the macOS Keychain and \
                  check that a database opens with a given passphrase."
)]
struct Cli {
    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a new random 256-bit key (Base64)
    GenerateKey,

    /// Encrypt a database passphrase into an `encrypted:` value
    Encrypt {
        /// Plaintext passphrase
        passphrase: String,

        /// Base64 key to use instead of the key store / environment
        #[arg(long)]
        key: Option<String>,
    },

    /// Check that an `encrypted:` value decrypts with the available key
    Decrypt {
        /// Encrypted passphrase value
        value: String,

        /// Base64 key to use instead of the key store / environment
        #[arg(long)]
        key: Option<String>,

        /// Print the full plaintext instead of a masked preview
        #[arg(long)]
        reveal: bool,
    },

    /// Manage the encryption key in the platform key store
    Keychain {
        #[command(subcommand)]
        subcommand: KeychainCommands,
    },

    /// Open a database the way the server does and list its tables
    CheckConnection {
        /// Path to the database file
        db_path: PathBuf,

        /// Passphrase, plaintext or `encrypted:` value
        passphrase: String,

        /// Cipher profile overrides as JSON, e.g. '{"pageSize":1024}'
        #[arg(long)]
        cipher_profile: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum KeychainCommands {
    /// Store a key (given, or freshly generated with --generate)
    Store {
        /// Base64 key to store
        key: Option<String>,

        /// Generate a new key and store it
        #[arg(long, conflicts_with = "key")]
        generate: bool,
    },

    /// Show whether a key is stored and its fingerprint
    Status,

    /// Remove the stored key
    Delete,
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let verbose = cli.verbose;

    let result = match cli.command {
        Commands::GenerateKey => cmd_generate_key(),
        Commands::Encrypt { passphrase, key } => cmd_encrypt(&passphrase, key.as_deref(), verbose),
        Commands::Decrypt { value, key, reveal } => {
            cmd_decrypt(&value, key.as_deref(), reveal, verbose)
        }
        Commands::Keychain { subcommand } => match subcommand {
            KeychainCommands::Store { key, generate } => {
                cmd_keychain_store(key.as_deref(), generate)
            }
            KeychainCommands::Status => cmd_keychain_status(),
            KeychainCommands::Delete => cmd_keychain_delete(),
        },
        Commands::CheckConnection {
            db_path,
            passphrase,
            cipher_profile,
        } => cmd_check_connection(db_path, &passphrase, cipher_profile.as_deref(), verbose),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

// ── Command implementations ───────────────────────────────────────────────────

/// `esqlite generate-key`
fn cmd_generate_key() -> Result<()> {
    println!("{}", generate_key());
    Ok(())
}

/// `esqlite encrypt PASSPHRASE [--key KEY]`
fn cmd_encrypt(passphrase: &str, key: Option<&str>, verbose: bool) -> Result<()> {
    if passphrase.is_empty() {
        bail!("passphrase cannot be empty");
    }
    if is_encrypted(passphrase) {
        bail!("passphrase is already encrypted");
    }

    let envelope = envelope_for(key, verbose)?;
    let value = envelope
        .encrypt(passphrase)
        .context("failed to encrypt passphrase")?;
    println!("{value}");
    Ok(())
}

/// `esqlite decrypt VALUE [--key KEY] [--reveal]`
fn cmd_decrypt(value: &str, key: Option<&str>, reveal: bool, verbose: bool) -> Result<()> {
    if !is_encrypted(value) {
        bail!("value has no `encrypted:` marker; nothing to decrypt");
    }

    let envelope = envelope_for(key, verbose)?;
    let plaintext = envelope
        .decrypt(value)
        .context("failed to decrypt passphrase")?;

    println!("Decryption: ok");
    println!("  Length:  {} characters", plaintext.chars().count());
    if reveal {
        println!("  Value:   {}", plaintext.as_str());
    } else {
        println!("  Preview: {}", mask(&plaintext));
    }
    Ok(())
}

/// `esqlite keychain store [KEY] [--generate]`
fn cmd_keychain_store(key: Option<&str>, generate: bool) -> Result<()> {
    let store = platform_key_store();
    if !store.is_available() {
        bail!(
            "{} is not available on this platform; export {} instead",
            store.name(),
            ENCRYPTION_KEY_ENV
        );
    }

    let key = match (key, generate) {
        (Some(k), false) => k.trim().to_string(),
        (None, true) => generate_key(),
        _ => bail!("pass a key or use --generate"),
    };
    PassphraseEnvelope::from_key_material(&key).context("refusing to store key")?;

    store
        .store(&key)
        .with_context(|| format!("failed to store key in {}", store.name()))?;

    println!("Stored encryption key in {}", store.name());
    println!("  Fingerprint: {}", fingerprint(&key)?);
    if generate {
        println!("  Key:         {key}");
        println!("Keep a copy of this key; encrypted passphrases cannot be recovered without it.");
    }
    Ok(())
}

/// `esqlite keychain status`
fn cmd_keychain_status() -> Result<()> {
    let store = platform_key_store();
    println!("Key store: {}", store.name());

    if !store.is_available() {
        println!("  Available: no");
    } else {
        println!("  Available: yes");
        match store.load() {
            Ok(Some(key)) => {
                println!("  Stored key: yes");
                println!("  Fingerprint: {}", fingerprint(&key)?);
            }
            Ok(None) => println!("  Stored key: no"),
            Err(e) => println!("  Stored key: unknown ({e})"),
        }
    }

    match std::env::var(ENCRYPTION_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => {
            let fp = fingerprint(&key).unwrap_or_else(|_| "invalid key".to_string());
            println!("Environment: {ENCRYPTION_KEY_ENV} is set ({fp})");
        }
        _ => println!("Environment: {ENCRYPTION_KEY_ENV} is not set"),
    }
    Ok(())
}

/// `esqlite keychain delete`
fn cmd_keychain_delete() -> Result<()> {
    let store = platform_key_store();
    if !store.is_available() {
        bail!("{} is not available on this platform", store.name());
    }
    store
        .delete()
        .with_context(|| format!("failed to delete key from {}", store.name()))?;
    println!("Deleted encryption key from {}", store.name());
    Ok(())
}

/// `esqlite check-connection DB_PATH PASSPHRASE [--cipher-profile JSON]`
fn cmd_check_connection(
    db_path: PathBuf,
    passphrase: &str,
    cipher_profile: Option<&str>,
    verbose: bool,
) -> Result<()> {
    if !db_path.exists() {
        bail!("database file not found: {}", db_path.display());
    }

    let profile = match cipher_profile {
        Some(raw) => {
            let overrides: serde_json::Value =
                serde_json::from_str(raw).context("--cipher-profile is not valid JSON")?;
            CipherProfile::default().apply_json(&overrides)?
        }
        None => CipherProfile::default(),
    };
    if verbose {
        println!(
            "Cipher profile: {} (page size {}, {} KDF iterations)",
            profile.name, profile.page_size, profile.kdf_iterations
        );
    }

    let resolver = KeyResolver::from_platform();
    let config = DatabaseConfig::with_decrypted_passphrase(db_path, passphrase, profile, &resolver)?;
    let tables = db::with_connection(&config, |conn| db::list_tables(conn))
        .with_context(|| format!("failed to open {}", config.path().display()))?;

    println!("Connection: ok ({})", config.path().display());
    if tables.is_empty() {
        println!("  No tables");
    }
    for table in &tables {
        if verbose {
            println!("  {} ({} columns)", table.name, table.columns.len());
        } else {
            println!("  {}", table.name);
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Envelope from an explicit `--key`, or from the key store / environment.
fn envelope_for(key: Option<&str>, verbose: bool) -> Result<PassphraseEnvelope> {
    if let Some(key) = key {
        return PassphraseEnvelope::from_key_material(key).context("invalid --key");
    }

    let resolver = KeyResolver::from_platform();
    let (material, origin) = resolver
        .resolve_key_material()
        .map_err(|e| anyhow!("{e}"))?;
    if verbose {
        eprintln!("Using key from {origin}");
    }
    log::debug!("encryption key resolved from {origin}");
    PassphraseEnvelope::from_key_material(&material).context("stored key is invalid")
}

/// Short SHA-256 fingerprint of the decoded key bytes.
fn fingerprint(key_base64: &str) -> Result<String> {
    let bytes = BASE64_LENIENT
        .decode(key_base64.trim())
        .context("key is not valid Base64")?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("sha256:{}", hex::encode(&digest[..8])))
}

/// First and last character with the middle starred out.
fn mask(plaintext: &str) -> String {
    let chars: Vec<char> = plaintext.chars().collect();
    match chars.len() {
        0 => String::new(),
        1..=4 => "*".repeat(chars.len()),
        n => format!("{}{}{}", chars[0], "*".repeat(n - 2), chars[n - 1]),
    }
}
