//! JSON-RPC 2.0 framing: message classification, error codes and response
//! builders.

use serde_json::{json, Map, Value};

use encrypted_sqlite::SqliteMcpError;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// A failure that becomes a JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    pub fn into_response(self, id: Value) -> Value {
        rpc_error(id, self.code, self.message)
    }
}

impl From<SqliteMcpError> for RpcError {
    fn from(err: SqliteMcpError) -> Self {
        let code = if err.is_caller_error() {
            INVALID_PARAMS
        } else {
            INTERNAL_ERROR
        };
        Self::new(code, err.to_string())
    }
}

// ── Response builders ─────────────────────────────────────────────────────────

pub fn ok_result(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message.into()
        }
    })
}

/// Wrap a payload as a single text content block.
pub fn text_content(text: impl Into<String>) -> Value {
    json!({
        "content": [{"type": "text", "text": text.into()}]
    })
}

// ── Message classification ────────────────────────────────────────────────────

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Carries an id and expects exactly one response.
    Request {
        id: Value,
        method: String,
        params: Map<String, Value>,
    },
    /// No id: never answered.
    Notification { method: Option<String> },
}

/// Classify a parsed JSON value.
///
/// On failure returns the id to answer with (null when none is recoverable)
/// and the error.
pub fn classify(value: Value) -> Result<Message, (Value, RpcError)> {
    let Value::Object(mut object) = value else {
        return Err((Value::Null, RpcError::invalid_request("Invalid Request: expected an object")));
    };

    let id = object.remove("id").unwrap_or(Value::Null);
    let method = object
        .get("method")
        .and_then(Value::as_str)
        .map(str::to_string);

    if id.is_null() {
        return Ok(Message::Notification { method });
    }
    if !(id.is_string() || id.is_number()) {
        return Err((
            Value::Null,
            RpcError::invalid_request("Invalid Request: id must be a string or a number"),
        ));
    }

    let Some(method) = method else {
        return Err((id, RpcError::invalid_request("Invalid Request: missing method")));
    };

    let params = match object.remove("params") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(params)) => params,
        Some(_) => {
            return Err((id, RpcError::invalid_params("params must be an object")));
        }
    };

    Ok(Message::Request { id, method, params })
}
