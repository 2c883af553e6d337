//! Row reads and writes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Statement};
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{Result, SqliteMcpError};
use crate::identifier::{quote, validate_identifier, validate_identifiers};

/// Rows returned by `get_table_data` when no limit is given.
pub const DEFAULT_LIMIT: i64 = 200;

/// Upper bound on `limit`.
pub const MAX_LIMIT: i64 = 10_000;

/// Result of a statement: rows, or the number of rows changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Rows {
        columns: Vec<String>,
        rows: Vec<Map<String, Value>>,
    },
    Affected {
        affected_rows: usize,
    },
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        match self {
            QueryResult::Rows { rows, .. } => rows.len(),
            QueryResult::Affected { .. } => 0,
        }
    }
}

/// Check paging arguments. Out-of-range values are rejected, never clamped.
pub fn validate_paging(limit: i64, offset: i64) -> Result<()> {
    if limit < 0 {
        return Err(SqliteMcpError::invalid_params(format!(
            "limit must be between 0 and {MAX_LIMIT}, got {limit}"
        )));
    }
    if limit > MAX_LIMIT {
        return Err(SqliteMcpError::invalid_params(format!(
            "limit must not exceed {MAX_LIMIT}, got {limit}"
        )));
    }
    if offset < 0 {
        return Err(SqliteMcpError::invalid_params(format!(
            "offset must not be negative, got {offset}"
        )));
    }
    Ok(())
}

/// `SELECT <columns> FROM <table> [WHERE ...] LIMIT ? OFFSET ?`.
pub fn select_table(
    conn: &Connection,
    table: &str,
    columns: &[String],
    filters: &Map<String, Value>,
    limit: i64,
    offset: i64,
) -> Result<QueryResult> {
    validate_identifier(table, "table")?;
    validate_identifiers(columns, "columns")?;
    validate_paging(limit, offset)?;

    let projection = if columns.is_empty() {
        "*".to_string()
    } else {
        columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
    };

    let (where_clause, mut params) = where_clause(filters)?;
    let sql = format!(
        "SELECT {projection} FROM {}{where_clause} LIMIT ? OFFSET ?",
        quote(table)
    );
    params.push(SqlValue::Integer(limit));
    params.push(SqlValue::Integer(offset));

    let mut stmt = conn.prepare(&sql)?;
    collect_rows(&mut stmt, params)
}

/// Run one arbitrary SQL statement.
///
/// Statements that produce columns return rows; everything else returns the
/// number of rows changed.
pub fn execute_sql(conn: &Connection, sql: &str) -> Result<QueryResult> {
    let sql = sql.trim();
    if sql.is_empty() {
        return Err(SqliteMcpError::invalid_params(
            "SQL statement cannot be null or empty",
        ));
    }

    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() > 0 {
        collect_rows(&mut stmt, Vec::new())
    } else {
        let affected_rows = stmt.execute([])?;
        Ok(QueryResult::Affected { affected_rows })
    }
}

/// Upsert `rows` keyed by `primary_keys`. All rows are written in one
/// transaction; a failing row rolls back the whole batch.
pub fn insert_or_update(
    conn: &mut Connection,
    table: &str,
    primary_keys: &[String],
    rows: &[Map<String, Value>],
) -> Result<usize> {
    validate_identifier(table, "table")?;
    if primary_keys.is_empty() {
        return Err(SqliteMcpError::invalid_params(
            "primary_keys must be provided for insert_or_update",
        ));
    }
    validate_identifiers(primary_keys, "primary_keys")?;
    for row in rows {
        if row.is_empty() {
            return Err(SqliteMcpError::invalid_params(
                "Row data must contain at least one column",
            ));
        }
        for column in row.keys() {
            validate_identifier(column, "row columns")?;
        }
    }

    let tx = conn.transaction()?;
    let mut affected = 0;
    for row in rows {
        let sql = upsert_sql(table, primary_keys, row);
        let values = row.values().map(to_sql_value).collect::<Vec<_>>();
        affected += tx.execute(&sql, params_from_iter(values))?;
    }
    tx.commit()?;
    Ok(affected)
}

/// `DELETE FROM <table> WHERE ...`. At least one filter is required.
pub fn delete_rows(conn: &Connection, table: &str, filters: &Map<String, Value>) -> Result<usize> {
    validate_identifier(table, "table")?;
    if filters.is_empty() {
        return Err(SqliteMcpError::invalid_params(
            "filters are required for delete_rows",
        ));
    }
    let (where_clause, params) = where_clause(filters)?;
    let sql = format!("DELETE FROM {}{where_clause}", quote(table));
    Ok(conn.execute(&sql, params_from_iter(params))?)
}

fn upsert_sql(table: &str, primary_keys: &[String], row: &Map<String, Value>) -> String {
    let columns = row.keys().map(|c| quote(c)).collect::<Vec<_>>();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let conflict = primary_keys.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");
    let assignments = row
        .keys()
        .filter(|c| !primary_keys.contains(*c))
        .map(|c| format!("{0} = excluded.{0}", quote(c)))
        .collect::<Vec<_>>();

    let action = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders}) ON CONFLICT({conflict}) {action}",
        quote(table),
        columns.join(", ")
    )
}

/// Equality filters joined with AND. A null filter value matches NULL.
fn where_clause(filters: &Map<String, Value>) -> Result<(String, Vec<SqlValue>)> {
    if filters.is_empty() {
        return Ok((String::new(), Vec::new()));
    }
    let mut terms = Vec::with_capacity(filters.len());
    let mut params = Vec::with_capacity(filters.len());
    for (column, value) in filters {
        validate_identifier(column, "filter column")?;
        if value.is_null() {
            terms.push(format!("{} IS NULL", quote(column)));
        } else {
            terms.push(format!("{} = ?", quote(column)));
            params.push(to_sql_value(value));
        }
    }
    Ok((format!(" WHERE {}", terms.join(" AND ")), params))
}

fn collect_rows(stmt: &mut Statement<'_>, params: Vec<SqlValue>) -> Result<QueryResult> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = Vec::new();
    let mut cursor = stmt.query(params_from_iter(params))?;
    while let Some(row) = cursor.next()? {
        let mut object = Map::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            object.insert(name.clone(), to_json_value(row.get_ref(i)?));
        }
        rows.push(object);
    }
    Ok(QueryResult::Rows { columns, rows })
}

/// Bind a JSON value. Booleans become 0/1; arrays and objects are stored as
/// their JSON text.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Convert a column value. BLOBs are Base64-encoded; non-finite reals are null.
pub fn to_json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(STANDARD.encode(b)),
    }
}
