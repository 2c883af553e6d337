//! Tool registry, typed tool arguments and tool execution.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use encrypted_sqlite::config::{lookup_alias, DB_PATH_ALIASES};
use encrypted_sqlite::db::{self, query};
use encrypted_sqlite::identifier::{validate_identifier, validate_identifiers};
use encrypted_sqlite::{DatabaseConfig, Result, SqliteMcpError};

use crate::protocol::text_content;

// ── Registry ──────────────────────────────────────────────────────────────────

struct ToolDef {
    name: &'static str,
    description: &'static str,
    properties: fn() -> Value,
    /// Required arguments, each with its accepted spellings (canonical first).
    required: &'static [&'static [&'static str]],
}

static TOOLS: [ToolDef; 7] = [
    ToolDef {
        name: "list_tables",
        description: "List all tables in the database with their columns.",
        properties: no_properties,
        required: &[],
    },
    ToolDef {
        name: "get_table_data",
        description: "Read rows from a table with optional column selection, equality filters, limit and offset.",
        properties: get_table_data_properties,
        required: &[&["table"]],
    },
    ToolDef {
        name: "execute_sql",
        description: "Execute a single SQL statement (SELECT, INSERT, UPDATE, DELETE or DDL).",
        properties: execute_sql_properties,
        required: &[&["sql"]],
    },
    ToolDef {
        name: "insert_or_update",
        description: "Insert rows, updating existing rows on primary key conflict (upsert).",
        properties: insert_or_update_properties,
        required: &[&["table"], &["primary_keys", "primaryKeys"], &["rows"]],
    },
    ToolDef {
        name: "delete_rows",
        description: "Delete rows from a table matching all given filters.",
        properties: delete_rows_properties,
        required: &[&["table"], &["filters"]],
    },
    ToolDef {
        name: "get_table_schema",
        description: "Show columns, indexes, foreign keys and the CREATE statement of a table.",
        properties: table_properties,
        required: &[&["table"]],
    },
    ToolDef {
        name: "list_indexes",
        description: "List the indexes of a table with their columns.",
        properties: table_properties,
        required: &[&["table"]],
    },
];

fn find_tool(name: &str) -> Option<&'static ToolDef> {
    TOOLS.iter().find(|def| def.name == name)
}

/// Tool descriptors for `tools/list`.
///
/// `db_path` and `passphrase` are required only when no default database is
/// configured.
pub fn tool_definitions(has_default: bool) -> Value {
    let tools: Vec<Value> = TOOLS
        .iter()
        .map(|def| {
            let mut properties = connection_properties(has_default);
            if let Value::Object(extra) = (def.properties)() {
                properties.extend(extra);
            }

            let mut required: Vec<&str> = def.required.iter().map(|names| names[0]).collect();
            if !has_default {
                required.push(DB_PATH_ALIASES[0]);
                required.push("passphrase");
            }

            let mut schema = json!({"type": "object", "properties": properties});
            if !required.is_empty() {
                schema["required"] = json!(required);
            }
            json!({
                "name": def.name,
                "description": def.description,
                "inputSchema": schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn connection_properties(has_default: bool) -> Map<String, Value> {
    let (path_desc, pass_desc) = if has_default {
        (
            "Path to the database file (overrides the configured default)",
            "Database passphrase, plain or `encrypted:` (overrides the configured default)",
        )
    } else {
        (
            "Path to the database file",
            "Database passphrase, plain or `encrypted:`",
        )
    };
    let props = json!({
        "db_path": {"type": "string", "description": path_desc},
        "passphrase": {"type": "string", "description": pass_desc},
        "cipherProfile": {
            "type": "object",
            "description": "Cipher settings overriding the SQLCipher 4 defaults",
            "properties": {
                "name": {"type": "string"},
                "pageSize": {"type": "integer"},
                "kdfIterations": {"type": "integer"},
                "hmacAlgorithm": {"type": "string"},
                "kdfAlgorithm": {"type": "string"}
            }
        }
    });
    match props {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn no_properties() -> Value {
    json!({})
}

fn table_properties() -> Value {
    json!({
        "table": {"type": "string", "description": "Table name"}
    })
}

fn get_table_data_properties() -> Value {
    json!({
        "table": {"type": "string", "description": "Table name"},
        "columns": {"type": "array", "items": {"type": "string"}, "description": "Columns to return (default: all)"},
        "filters": {"type": "object", "description": "Equality filters as column/value pairs"},
        "limit": {"type": "integer", "description": format!("Maximum rows to return (default: {}, max: {})", query::DEFAULT_LIMIT, query::MAX_LIMIT)},
        "offset": {"type": "integer", "description": "Rows to skip (default: 0)"}
    })
}

fn execute_sql_properties() -> Value {
    json!({
        "sql": {"type": "string", "description": "SQL statement"}
    })
}

fn insert_or_update_properties() -> Value {
    json!({
        "table": {"type": "string", "description": "Table name"},
        "primary_keys": {"type": "array", "items": {"type": "string"}, "description": "Conflict target columns"},
        "rows": {"type": "array", "items": {"type": "object"}, "description": "Rows as column/value objects"}
    })
}

fn delete_rows_properties() -> Value {
    json!({
        "table": {"type": "string", "description": "Table name"},
        "filters": {"type": "object", "description": "Equality filters as column/value pairs (at least one)"}
    })
}

// ── Typed arguments ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TableArgs {
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetTableDataArgs {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub filters: Option<Map<String, Value>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl GetTableDataArgs {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(query::DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExecuteSqlArgs {
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InsertOrUpdateArgs {
    pub table: String,
    #[serde(alias = "primaryKeys")]
    pub primary_keys: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeleteRowsArgs {
    pub table: String,
    pub filters: Map<String, Value>,
}

/// One validated tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ListTables,
    GetTableData(GetTableDataArgs),
    ExecuteSql(ExecuteSqlArgs),
    InsertOrUpdate(InsertOrUpdateArgs),
    DeleteRows(DeleteRowsArgs),
    GetTableSchema(TableArgs),
    ListIndexes(TableArgs),
}

impl ToolCall {
    /// Decode and validate the arguments of tool `name`. Connection arguments
    /// are left to config resolution.
    pub fn parse(name: &str, args: &Map<String, Value>) -> Result<Self> {
        let def = find_tool(name)
            .ok_or_else(|| SqliteMcpError::invalid_params(format!("Unknown tool: {name}")))?;
        for spellings in def.required {
            if lookup_alias(args, spellings).is_none() {
                return Err(SqliteMcpError::missing(spellings[0]));
            }
        }

        let call = match def.name {
            "list_tables" => ToolCall::ListTables,
            "get_table_data" => ToolCall::GetTableData(decode(name, args)?),
            "execute_sql" => ToolCall::ExecuteSql(decode(name, args)?),
            "insert_or_update" => ToolCall::InsertOrUpdate(decode(name, args)?),
            "delete_rows" => ToolCall::DeleteRows(decode(name, args)?),
            "get_table_schema" => ToolCall::GetTableSchema(decode(name, args)?),
            "list_indexes" => ToolCall::ListIndexes(decode(name, args)?),
            other => {
                return Err(SqliteMcpError::invalid_params(format!("Unknown tool: {other}")))
            }
        };
        call.validate()?;
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ListTables => "list_tables",
            ToolCall::GetTableData(_) => "get_table_data",
            ToolCall::ExecuteSql(_) => "execute_sql",
            ToolCall::InsertOrUpdate(_) => "insert_or_update",
            ToolCall::DeleteRows(_) => "delete_rows",
            ToolCall::GetTableSchema(_) => "get_table_schema",
            ToolCall::ListIndexes(_) => "list_indexes",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            ToolCall::ListTables => Ok(()),
            ToolCall::GetTableData(a) => {
                query::validate_paging(a.limit(), a.offset())?;
                validate_identifier(&a.table, "table")?;
                validate_identifiers(a.columns.as_deref().unwrap_or_default(), "columns")?;
                let filter_columns: Vec<&String> =
                    a.filters.iter().flat_map(|f| f.keys()).collect();
                validate_identifiers(&filter_columns, "filter column")
            }
            ToolCall::ExecuteSql(a) => {
                if a.sql.trim().is_empty() {
                    return Err(SqliteMcpError::invalid_params(
                        "SQL statement cannot be null or empty",
                    ));
                }
                Ok(())
            }
            ToolCall::InsertOrUpdate(a) => {
                validate_identifier(&a.table, "table")?;
                if a.primary_keys.is_empty() {
                    return Err(SqliteMcpError::invalid_params(
                        "primary_keys must be provided for insert_or_update",
                    ));
                }
                validate_identifiers(&a.primary_keys, "primary_keys")
            }
            ToolCall::DeleteRows(a) => {
                validate_identifier(&a.table, "table")?;
                if a.filters.is_empty() {
                    return Err(SqliteMcpError::invalid_params(
                        "filters are required for delete_rows",
                    ));
                }
                Ok(())
            }
            ToolCall::GetTableSchema(a) | ToolCall::ListIndexes(a) => {
                validate_identifier(&a.table, "table")
            }
        }
    }
}

fn decode<T: DeserializeOwned>(tool: &str, args: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|e| {
        SqliteMcpError::invalid_params(format!("Invalid arguments for {tool}: {e}"))
    })
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// Run `call` on a connection opened for this call only.
pub fn execute(call: &ToolCall, config: &DatabaseConfig) -> Result<Value> {
    db::with_connection(config, |conn| match call {
        ToolCall::ListTables => {
            let tables = db::list_tables(conn)?;
            let text = serde_json::to_string(&json!({ "tables": tables }))?;
            Ok(text_content(text))
        }
        ToolCall::GetTableData(a) => {
            let result = db::select_table(
                conn,
                &a.table,
                a.columns.as_deref().unwrap_or_default(),
                a.filters.as_ref().unwrap_or(&Map::new()),
                a.limit(),
                a.offset(),
            )?;
            Ok(serde_json::to_value(result)?)
        }
        ToolCall::ExecuteSql(a) => Ok(serde_json::to_value(db::execute_sql(conn, &a.sql)?)?),
        ToolCall::InsertOrUpdate(a) => {
            let affected = db::insert_or_update(conn, &a.table, &a.primary_keys, &a.rows)?;
            Ok(json!({ "affected_rows": affected }))
        }
        ToolCall::DeleteRows(a) => {
            let affected = db::delete_rows(conn, &a.table, &a.filters)?;
            Ok(json!({ "affected_rows": affected }))
        }
        ToolCall::GetTableSchema(a) => Ok(serde_json::to_value(db::get_table_schema(conn, &a.table)?)?),
        ToolCall::ListIndexes(a) => {
            let indexes = db::list_indexes(conn, &a.table)?;
            Ok(json!({ "table": a.table, "indexes": indexes }))
        }
    })
}
