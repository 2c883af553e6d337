//! Table, column, index and foreign key introspection.
//!
//! PRAGMA failures caused by virtual tables whose module or tokenizer is not
//! compiled in ("no such module", "unknown tokenizer") produce empty metadata
//! instead of an error.

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use crate::error::Result;
use crate::identifier::{quote, validate_identifier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub not_null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    /// `c` for CREATE INDEX, `u` for UNIQUE constraints, `pk` for primary keys.
    pub origin: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyInfo {
    pub id: i64,
    pub seq: i64,
    pub table: String,
    pub from: String,
    /// Null when the reference targets the parent's primary key implicitly.
    pub to: Option<String>,
    pub on_update: String,
    pub on_delete: String,
    #[serde(rename = "match")]
    pub match_clause: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub create_sql: Option<String>,
}

/// Every user table with its columns, ordered by name.
pub fn list_tables(conn: &Connection) -> Result<Vec<TableInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    names
        .into_iter()
        .map(|name| {
            let columns = describe_columns(conn, &name)?;
            Ok(TableInfo { name, columns })
        })
        .collect()
}

pub fn describe_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    validate_identifier(table, "table")?;
    let sql = format!("PRAGMA table_info({})", quote(table));
    let columns = pragma_rows(conn, &sql, |row| {
        Ok(ColumnInfo {
            cid: row.get("cid")?,
            name: row.get("name")?,
            column_type: row.get("type")?,
            not_null: row.get::<_, i64>("notnull")? != 0,
            default_value: row.get("dflt_value")?,
            primary_key: row.get::<_, i64>("pk")? > 0,
        })
    })?;
    Ok(columns)
}

pub fn list_indexes(conn: &Connection, table: &str) -> Result<Vec<IndexInfo>> {
    validate_identifier(table, "table")?;
    let sql = format!("PRAGMA index_list({})", quote(table));
    let listed = pragma_rows(conn, &sql, |row| {
        Ok((
            row.get::<_, String>("name")?,
            row.get::<_, i64>("unique")? != 0,
            row.get::<_, String>("origin")?,
        ))
    })?;

    let mut indexes = Vec::with_capacity(listed.len());
    for (name, unique, origin) in listed {
        let sql = format!("PRAGMA index_info({})", quote(&name));
        // Expression index columns have no name.
        let columns = pragma_rows(conn, &sql, |row| row.get::<_, Option<String>>("name"))?
            .into_iter()
            .flatten()
            .collect();
        indexes.push(IndexInfo {
            name,
            unique,
            origin,
            columns,
        });
    }
    Ok(indexes)
}

pub fn list_foreign_keys(conn: &Connection, table: &str) -> Result<Vec<ForeignKeyInfo>> {
    validate_identifier(table, "table")?;
    let sql = format!("PRAGMA foreign_key_list({})", quote(table));
    pragma_rows(conn, &sql, |row| {
        Ok(ForeignKeyInfo {
            id: row.get("id")?,
            seq: row.get("seq")?,
            table: row.get("table")?,
            from: row.get("from")?,
            to: row.get("to")?,
            on_update: row.get("on_update")?,
            on_delete: row.get("on_delete")?,
            match_clause: row.get("match")?,
        })
    })
}

/// Columns, indexes, foreign keys and the CREATE statement of one table.
pub fn get_table_schema(conn: &Connection, table: &str) -> Result<TableSchema> {
    validate_identifier(table, "table")?;
    let create_sql = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?
        .flatten();

    Ok(TableSchema {
        table_name: table.to_string(),
        columns: describe_columns(conn, table)?,
        indexes: list_indexes(conn, table)?,
        foreign_keys: list_foreign_keys(conn, table)?,
        create_sql,
    })
}

fn pragma_rows<T, F>(conn: &Connection, sql: &str, map: F) -> Result<Vec<T>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let run = || -> rusqlite::Result<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], map)?.collect();
        rows
    };
    match run() {
        Ok(rows) => Ok(rows),
        Err(e) if is_ignorable_pragma_error(&e) => {
            log::debug!("ignoring `{sql}` failure: {e}");
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn is_ignorable_pragma_error(err: &rusqlite::Error) -> bool {
    let message = err.to_string().to_lowercase();
    message.contains("unknown tokenizer") || message.contains("no such module")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE authors (id INTEGER PRIMARY KEY, email TEXT UNIQUE NOT NULL);
             CREATE TABLE books (
                 id INTEGER PRIMARY KEY,
                 author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
                 title TEXT DEFAULT 'untitled'
             );
             CREATE INDEX idx_books_author ON books(author_id, title);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_list_tables_sorted_with_columns() {
        let conn = schema_db();
        let tables = list_tables(&conn).unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["authors", "books"]);
        assert_eq!(tables[1].columns.len(), 3);
    }

    #[test]
    fn test_describe_columns() {
        let conn = schema_db();
        let cols = describe_columns(&conn, "books").unwrap();
        assert_eq!(cols[0].name, "id");
        assert!(cols[0].primary_key);
        assert!(cols[1].not_null);
        assert_eq!(cols[2].default_value.as_deref(), Some("'untitled'"));

        let value = serde_json::to_value(&cols[0]).unwrap();
        assert_eq!(
            value,
            json!({"cid": 0, "name": "id", "type": "INTEGER", "not_null": false, "primary_key": true})
        );
    }

    #[test]
    fn test_unknown_table_has_no_columns() {
        let conn = schema_db();
        assert!(describe_columns(&conn, "ghost").unwrap().is_empty());
    }

    #[test]
    fn test_list_indexes() {
        let conn = schema_db();
        let indexes = list_indexes(&conn, "books").unwrap();
        let idx = indexes.iter().find(|i| i.name == "idx_books_author").unwrap();
        assert!(!idx.unique);
        assert_eq!(idx.origin, "c");
        assert_eq!(idx.columns, ["author_id", "title"]);

        let indexes = list_indexes(&conn, "authors").unwrap();
        assert!(indexes.iter().any(|i| i.unique && i.origin == "u" && i.columns == ["email"]));
    }

    #[test]
    fn test_table_schema() {
        let conn = schema_db();
        let schema = get_table_schema(&conn, "books").unwrap();
        assert_eq!(schema.table_name, "books");
        assert_eq!(schema.foreign_keys.len(), 1);
        let fk = &schema.foreign_keys[0];
        assert_eq!(fk.table, "authors");
        assert_eq!(fk.from, "author_id");
        assert_eq!(fk.to.as_deref(), Some("id"));
        assert_eq!(fk.on_delete, "CASCADE");
        assert!(schema.create_sql.unwrap().starts_with("CREATE TABLE books"));

        let value = serde_json::to_value(get_table_schema(&conn, "books").unwrap()).unwrap();
        assert_eq!(value["foreign_keys"][0]["match"], json!("NONE"));
    }

    #[test]
    fn test_schema_of_missing_table() {
        let conn = schema_db();
        let schema = get_table_schema(&conn, "ghost").unwrap();
        assert!(schema.columns.is_empty());
        assert!(schema.create_sql.is_none());
    }

    #[test]
    fn test_rejects_invalid_table_name() {
        let conn = schema_db();
        assert!(describe_columns(&conn, "books\")--").unwrap_err().is_caller_error());
        assert!(get_table_schema(&conn, "").is_err());
    }

    #[test]
    fn test_ignorable_errors() {
        let conn = Connection::open_in_memory().unwrap();
        let err = conn.execute_batch("CREATE VIRTUAL TABLE v USING no_such_thing(x)").unwrap_err();
        assert!(is_ignorable_pragma_error(&err));
        let err = conn.execute_batch("SELECT * FROM missing_table").unwrap_err();
        assert!(!is_ignorable_pragma_error(&err));
    }
}
