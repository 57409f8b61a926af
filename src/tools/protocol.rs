//! Line-oriented JSON protocol spoken to tool-server subprocesses.
//!
//! The transport is the child process's stdio: one JSON object per line in
//! each direction. After spawn the server announces itself with an
//! unprompted `{"event":"ready"}` banner; every subsequent exchange is a
//! request/response pair correlated by numeric id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation produced by a worker during its turn.
///
/// Ephemeral: consumed by the connection layer and discarded once the
/// matching [`ToolResult`] exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Name of the tool on the serving process (e.g. "web_search").
    #[serde(alias = "tool_name")]
    pub tool_name: String,
    /// Tool arguments, passed through verbatim.
    #[serde(default)]
    pub arguments: HashMap<String, Value>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: HashMap::new(),
        }
    }

    /// Add one argument (builder style).
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Outcome class of a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Timeout,
    Error,
}

/// Result of one tool call, owned by the worker turn that issued it.
///
/// Timeouts and malformed responses are carried here as degraded results,
/// not raised as errors; the worker decides how to proceed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// The originating call.
    pub call: ToolCall,
    pub status: ToolStatus,
    /// Server payload on success, diagnostic text otherwise.
    pub payload: Value,
}

impl ToolResult {
    pub fn ok(call: ToolCall, payload: Value) -> Self {
        Self {
            call,
            status: ToolStatus::Ok,
            payload,
        }
    }

    pub fn timeout(call: ToolCall, diagnostic: impl Into<String>) -> Self {
        Self {
            call,
            status: ToolStatus::Timeout,
            payload: Value::String(diagnostic.into()),
        }
    }

    pub fn error(call: ToolCall, diagnostic: impl Into<String>) -> Self {
        Self {
            call,
            status: ToolStatus::Error,
            payload: Value::String(diagnostic.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }

    /// Payload rendered as text for the reasoner transcript.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Outbound wire message: one request line.
#[derive(Debug, Serialize)]
pub(crate) struct ToolRequest<'a> {
    pub id: u64,
    pub tool: &'a str,
    pub arguments: &'a HashMap<String, Value>,
}

impl ToolRequest<'_> {
    /// Serialize to a single newline-terminated line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Inbound wire message: one response line.
#[derive(Debug, Deserialize)]
pub(crate) struct ToolResponse {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub payload: Value,
}

impl ToolResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Unprompted server event, currently only the ready banner.
#[derive(Debug, Deserialize)]
pub(crate) struct ServerEvent {
    pub event: String,
}

impl ServerEvent {
    pub fn is_ready(&self) -> bool {
        self.event == "ready"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line_shape() {
        let call = ToolCall::new("web_search").with_arg("query", "Acme funding");
        let request = ToolRequest {
            id: 7,
            tool: &call.tool_name,
            arguments: &call.arguments,
        };
        let line = request.to_line().unwrap();
        assert!(line.ends_with('\n'));

        let parsed: Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["tool"], "web_search");
        assert_eq!(parsed["arguments"]["query"], "Acme funding");
    }

    #[test]
    fn test_response_parsing() {
        let response: ToolResponse =
            serde_json::from_str(r#"{"id":3,"status":"ok","payload":{"hits":2}}"#).unwrap();
        assert_eq!(response.id, 3);
        assert!(response.is_ok());
        assert_eq!(response.payload["hits"], 2);

        // Payload is optional on error responses
        let bare: ToolResponse = serde_json::from_str(r#"{"id":4,"status":"error"}"#).unwrap();
        assert!(!bare.is_ok());
        assert!(bare.payload.is_null());
    }

    #[test]
    fn test_ready_banner() {
        let event: ServerEvent = serde_json::from_str(r#"{"event":"ready"}"#).unwrap();
        assert!(event.is_ready());

        let other: ServerEvent = serde_json::from_str(r#"{"event":"log"}"#).unwrap();
        assert!(!other.is_ready());
    }

    #[test]
    fn test_result_payload_text() {
        let call = ToolCall::new("fetch_url");
        let textual = ToolResult::ok(call.clone(), Value::String("page body".to_string()));
        assert_eq!(textual.payload_text(), "page body");

        let structured = ToolResult::ok(call.clone(), serde_json::json!({"title": "Acme"}));
        assert_eq!(structured.payload_text(), r#"{"title":"Acme"}"#);

        let degraded = ToolResult::timeout(call, "call timed out");
        assert!(!degraded.is_ok());
        assert_eq!(degraded.status, ToolStatus::Timeout);
    }
}
