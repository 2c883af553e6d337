//! Integration test: full database workflow through the library.
//!
//! Tests the lifecycle a host drives through the MCP tools:
//! 1. Resolve connection settings with an encrypted passphrase
//! 2. Create a schema with raw SQL
//! 3. Upsert rows, then update some of them
//! 4. Page and filter through the data
//! 5. Introspect tables, columns, indexes and foreign keys
//! 6. Delete rows and confirm the result

use serde_json::{json, Map, Value};
use zeroize::Zeroizing;

use encrypted_sqlite::crypto::envelope::generate_key;
use encrypted_sqlite::db::{self, QueryResult};
use encrypted_sqlite::{
    CipherProfile, ConnectionSettings, DatabaseConfig, KeyResolver, MemoryKeyStore,
    PassphraseEnvelope, SqliteMcpError,
};

fn rows(value: Value) -> Vec<Map<String, Value>> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

fn filters(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

#[test]
fn full_workflow_encrypted_passphrase_to_delete() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("workflow.db");
    std::fs::File::create(&path).unwrap();

    // ── Step 1: Resolve settings with an encrypted passphrase ───────────
    let key = generate_key();
    let encrypted = PassphraseEnvelope::from_key_material(&key)
        .unwrap()
        .encrypt("workflow passphrase")
        .unwrap();
    let resolver = KeyResolver::new(Box::new(MemoryKeyStore::with_key(key)))
        .with_env_var("ESQ_WORKFLOW_UNSET_KEY");

    let args = filters(json!({"dbPath": path, "passphrase": encrypted}));
    let settings = ConnectionSettings::resolve(&args, None).unwrap();
    let config = settings.into_database_config(&resolver).unwrap();
    assert_eq!(config.passphrase.as_str(), "workflow passphrase");

    // ── Step 2: Create schema ───────────────────────────────────────────
    db::with_connection(&config, |conn| {
        db::execute_sql(
            conn,
            "CREATE TABLE teams (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
        )?;
        db::execute_sql(
            conn,
            "CREATE TABLE members (
                id INTEGER PRIMARY KEY,
                team_id INTEGER REFERENCES teams(id) ON DELETE CASCADE,
                email TEXT NOT NULL,
                active INTEGER DEFAULT 1,
                avatar BLOB
            )",
        )?;
        db::execute_sql(conn, "CREATE INDEX idx_members_email ON members(email)")?;
        Ok(())
    })
    .unwrap();

    // ── Step 3: Upsert then update ──────────────────────────────────────
    let pk = vec!["id".to_string()];
    let affected = db::with_connection(&config, |conn| {
        db::insert_or_update(
            conn,
            "teams",
            &pk,
            &rows(json!([{"id": 1, "name": "core"}, {"id": 2, "name": "infra"}])),
        )
    })
    .unwrap();
    assert_eq!(affected, 2);

    let members: Vec<Value> = (1..=25)
        .map(|i| json!({"id": i, "team_id": 1 + i % 2, "email": format!("m{i}@example.com"), "active": true}))
        .collect();
    db::with_connection(&config, |conn| {
        db::insert_or_update(conn, "members", &pk, &rows(Value::Array(members)))
    })
    .unwrap();

    db::with_connection(&config, |conn| {
        db::insert_or_update(
            conn,
            "members",
            &pk,
            &rows(json!([{"id": 3, "email": "renamed@example.com", "active": false}])),
        )
    })
    .unwrap();

    // ── Step 4: Page and filter ─────────────────────────────────────────
    let page = db::with_connection(&config, |conn| {
        db::select_table(conn, "members", &[], &Map::new(), 10, 20)
    })
    .unwrap();
    assert_eq!(page.row_count(), 5);

    let renamed = db::with_connection(&config, |conn| {
        db::select_table(
            conn,
            "members",
            &["email".to_string(), "active".to_string()],
            &filters(json!({"id": 3})),
            200,
            0,
        )
    })
    .unwrap();
    match renamed {
        QueryResult::Rows { columns, rows } => {
            assert_eq!(columns, ["email", "active"]);
            assert_eq!(rows[0]["email"], "renamed@example.com");
            assert_eq!(rows[0]["active"], 0);
        }
        other => panic!("expected rows, got {other:?}"),
    }

    let no_avatar = db::with_connection(&config, |conn| {
        db::select_table(conn, "members", &[], &filters(json!({"avatar": null})), 200, 0)
    })
    .unwrap();
    assert_eq!(no_avatar.row_count(), 25);

    // ── Step 5: Introspect ──────────────────────────────────────────────
    let tables = db::with_connection(&config, |conn| db::list_tables(conn)).unwrap();
    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["members", "teams"]);

    let schema =
        db::with_connection(&config, |conn| db::get_table_schema(conn, "members")).unwrap();
    assert_eq!(schema.columns.len(), 5);
    assert!(schema.columns.iter().any(|c| c.name == "id" && c.primary_key));
    assert_eq!(schema.foreign_keys.len(), 1);
    assert_eq!(schema.foreign_keys[0].table, "teams");
    assert_eq!(schema.foreign_keys[0].on_delete, "CASCADE");
    assert!(schema.create_sql.unwrap().contains("CREATE TABLE members"));

    let indexes = db::with_connection(&config, |conn| db::list_indexes(conn, "members")).unwrap();
    let email_idx = indexes
        .iter()
        .find(|i| i.name == "idx_members_email")
        .unwrap();
    assert!(!email_idx.unique);
    assert_eq!(email_idx.columns, ["email"]);

    // ── Step 6: Delete ──────────────────────────────────────────────────
    let deleted = db::with_connection(&config, |conn| {
        db::delete_rows(conn, "members", &filters(json!({"team_id": 2})))
    })
    .unwrap();
    assert!(deleted > 0);

    let remaining = db::with_connection(&config, |conn| {
        db::execute_sql(conn, "SELECT count(*) AS n FROM members")
    })
    .unwrap();
    match remaining {
        QueryResult::Rows { rows, .. } => assert_eq!(rows[0]["n"], json!(25 - deleted as i64)),
        other => panic!("expected rows, got {other:?}"),
    }
}

#[test]
fn failed_batch_rolls_back() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("rollback.db");
    std::fs::File::create(&path).unwrap();
    let config = DatabaseConfig::new(
        &path,
        Zeroizing::new("rollback".to_string()),
        CipherProfile::default(),
    );

    db::with_connection(&config, |conn| {
        db::execute_sql(conn, "CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT NOT NULL)")
    })
    .unwrap();

    let pk = vec!["id".to_string()];
    let result = db::with_connection(&config, |conn| {
        db::insert_or_update(
            conn,
            "t",
            &pk,
            &rows(json!([{"id": 1, "v": "ok"}, {"id": 2, "v": null}])),
        )
    });
    assert!(matches!(result, Err(SqliteMcpError::Database(_))));

    let count = db::with_connection(&config, |conn| {
        db::select_table(conn, "t", &[], &Map::new(), 200, 0)
    })
    .unwrap();
    assert_eq!(count.row_count(), 0);
}

#[test]
fn missing_database_is_not_created() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("absent.db");
    let config = DatabaseConfig::new(
        &path,
        Zeroizing::new("pass".to_string()),
        CipherProfile::default(),
    );
    assert!(db::with_connection(&config, |conn| db::list_tables(conn)).is_err());
    assert!(!path.exists());
}
