//! Per-call SQLCipher connections.
//!
//! Every tool call opens its own connection with [`with_connection`] and the
//! connection is dropped when the closure returns, on success and on error.
//! Opening never creates a database file.
//!
//! Open sequence: open → key → cipher profile → verify → configure.

pub mod metadata;
pub mod query;

pub use metadata::{
    describe_columns, get_table_schema, list_indexes, list_tables, ColumnInfo, ForeignKeyInfo,
    IndexInfo, TableInfo, TableSchema,
};
pub use query::{delete_rows, execute_sql, insert_or_update, select_table, QueryResult};

use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use zeroize::Zeroizing;

use crate::config::{CipherProfile, DatabaseConfig};
use crate::error::Result;

/// How long a statement waits on a locked database before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Open and key a connection for `config`.
pub fn open_connection(config: &DatabaseConfig) -> Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    log::debug!("opening {}", config.path().display());
    let conn = Connection::open_with_flags(config.path(), flags)?;

    apply_key(&conn, &config.passphrase)?;
    apply_cipher_profile(&conn, &config.cipher_profile)?;
    verify_key(&conn)?;

    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Run `action` against a fresh connection, closing it afterwards.
pub fn with_connection<T, F>(config: &DatabaseConfig, action: F) -> Result<T>
where
    F: FnOnce(&mut Connection) -> Result<T>,
{
    let mut conn = open_connection(config)?;
    action(&mut conn)
}

fn apply_key(conn: &Connection, passphrase: &str) -> Result<()> {
    // The statement text holds the passphrase, so it is zeroized on drop too.
    let escaped = Zeroizing::new(passphrase.replace('\'', "''"));
    let pragma = Zeroizing::new(format!("PRAGMA key = '{}';", escaped.as_str()));
    conn.execute_batch(&pragma)?;
    Ok(())
}

// Cipher settings must be applied after keying and before the first page read.
// Plain SQLite ignores these PRAGMAs.
fn apply_cipher_profile(conn: &Connection, profile: &CipherProfile) -> Result<()> {
    conn.pragma_update(None, "cipher_page_size", profile.page_size)?;
    conn.pragma_update(None, "kdf_iter", profile.kdf_iterations)?;
    conn.pragma_update(None, "cipher_hmac_algorithm", profile.hmac_pragma())?;
    conn.pragma_update(None, "cipher_kdf_algorithm", profile.kdf_pragma())?;
    Ok(())
}

fn verify_key(conn: &Connection) -> Result<()> {
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
        .map_err(|e| {
            log::warn!("key verification failed, passphrase or cipher profile is likely wrong");
            e
        })?;
    Ok(())
}
