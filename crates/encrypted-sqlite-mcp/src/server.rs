//! Request dispatcher.
//!
//! Reads one JSON-RPC message per line, handles it to completion and writes
//! at most one response line before reading the next. Stdout carries nothing
//! but response frames.

use std::io::{self, BufRead, Write};

use serde_json::{json, Map, Value};

use encrypted_sqlite::{ConnectionSettings, KeyResolver};

use crate::protocol::{self, ok_result, Message, RpcError, PARSE_ERROR};
use crate::tools::{self, ToolCall};

/// Protocol version reported when the client does not send one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

pub const SERVER_NAME: &str = "encrypted-sqlite-mcp";

pub struct McpServer {
    /// Process-wide default connection, fixed before the read loop starts.
    default_settings: Option<ConnectionSettings>,
    resolver: KeyResolver,
}

impl McpServer {
    pub fn new(default_settings: Option<ConnectionSettings>, resolver: KeyResolver) -> Self {
        Self {
            default_settings,
            resolver,
        }
    }

    /// Serve `input` until EOF. Only read errors are returned; a line that is
    /// not UTF-8 is answered with a parse error like any other bad frame.
    pub fn run<R: BufRead, W: Write>(&self, mut input: R, mut output: W) -> io::Result<()> {
        tracing::info!("server started, waiting for requests");
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let response = match std::str::from_utf8(&buf) {
                Ok(line) => self.handle_line(line),
                Err(e) => {
                    tracing::warn!("message is not valid UTF-8: {e}");
                    Some(protocol::rpc_error(
                        Value::Null,
                        PARSE_ERROR,
                        format!("Parse error: message is not valid UTF-8 ({e})"),
                    ))
                }
            };
            if let Some(response) = response {
                self.send(&mut output, &response);
            }
        }
        tracing::info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle one raw line. `None` means nothing is written.
    pub fn handle_line(&self, line: &str) -> Option<Value> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => self.handle_message(value),
            Err(e) => {
                tracing::warn!("unparseable message: {e}");
                Some(protocol::rpc_error(Value::Null, PARSE_ERROR, format!("Parse error: {e}")))
            }
        }
    }

    /// Handle one parsed message. Notifications never produce a response.
    pub fn handle_message(&self, value: Value) -> Option<Value> {
        match protocol::classify(value) {
            Ok(Message::Notification { method }) => {
                self.handle_notification(method.as_deref());
                None
            }
            Ok(Message::Request { id, method, params }) => {
                tracing::debug!(%method, "request");
                let response = match self.dispatch(&method, &params) {
                    Ok(result) => ok_result(id, result),
                    Err(err) => {
                        tracing::warn!(%method, code = err.code, "request failed: {}", err.message);
                        err.into_response(id)
                    }
                };
                Some(response)
            }
            Err((id, err)) => {
                tracing::warn!("invalid request: {}", err.message);
                Some(err.into_response(id))
            }
        }
    }

    fn handle_notification(&self, method: Option<&str>) {
        match method {
            Some("initialized") | Some("notifications/initialized") => {
                tracing::info!("client initialized");
            }
            Some(other) => tracing::debug!(method = other, "ignoring notification"),
            None => tracing::debug!("ignoring notification without method"),
        }
    }

    fn dispatch(&self, method: &str, params: &Map<String, Value>) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.handle_initialize(params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools::tool_definitions(self.default_settings.is_some())),
            "tools/call" => self.handle_tools_call(params),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            "resources/list" => Ok(json!({ "resources": [] })),
            other => Err(RpcError::method_not_found(other)),
        }
    }

    // ── initialize ────────────────────────────────────────────────────────────

    fn handle_initialize(&self, params: &Map<String, Value>) -> Value {
        let protocol_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);
        json!({
            "protocolVersion": protocol_version,
            "version": env!("CARGO_PKG_VERSION"),
            "serverName": SERVER_NAME,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {"listChanged": false},
                "prompts": {},
                "resources": {},
                "logging": {},
                "elicitation": {"listChanged": false},
                "roots": {"listChanged": false}
            }
        })
    }

    // ── tools/call ────────────────────────────────────────────────────────────

    fn handle_tools_call(&self, params: &Map<String, Value>) -> Result<Value, RpcError> {
        let name = match params.get("name") {
            Some(Value::String(name)) => name.as_str(),
            Some(_) => return Err(RpcError::invalid_params("name must be a string")),
            None => return Err(RpcError::invalid_params("Missing required parameter: name")),
        };
        let empty = Map::new();
        let args = match params.get("arguments") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(args)) => args,
            Some(_) => return Err(RpcError::invalid_params("arguments must be an object")),
        };

        let call = ToolCall::parse(name, args)?;
        let config = ConnectionSettings::resolve(args, self.default_settings.as_ref())?
            .into_database_config(&self.resolver)?;
        tracing::debug!(tool = call.name(), path = %config.path().display(), "calling tool");
        Ok(tools::execute(&call, &config)?)
    }

    // ── Output ────────────────────────────────────────────────────────────────

    /// Write a response, retrying once with a generic internal error. A second
    /// failure leaves the request unanswered; the loop keeps going.
    fn send<W: Write>(&self, output: &mut W, response: &Value) {
        let Err(e) = write_frame(output, response) else {
            return;
        };
        tracing::error!("failed to write response: {e}");

        let id = response.get("id").cloned().unwrap_or(Value::Null);
        let fallback = RpcError::internal("Internal error").into_response(id);
        if let Err(e) = write_frame(output, &fallback) {
            tracing::error!("failed to write fallback error response: {e}");
        }
    }
}

fn write_frame<W: Write>(output: &mut W, frame: &Value) -> io::Result<()> {
    serde_json::to_writer(&mut *output, frame)?;
    output.write_all(b"\n")?;
    output.flush()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
