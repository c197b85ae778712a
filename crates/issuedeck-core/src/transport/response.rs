//! Normalizing captured process output into a result.

use crate::error::{IssuedeckError, Result};
use serde_json::{Map, Value};

/// Turn the outcome of one request process into a value or an error.
///
/// - non-zero exit: `Transport` with the captured diagnostic stream
/// - zero exit, empty output: an empty object (a "no content" success)
/// - zero exit, malformed output: `Decode` with the raw payload
/// - decoded error body: `Protocol` with the joined messages
pub(crate) fn interpret_output(
    success: bool,
    exit_code: Option<i32>,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<Value> {
    if !success {
        return Err(IssuedeckError::Transport {
            exit_code,
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        });
    }

    let raw = String::from_utf8_lossy(stdout);
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let value: Value = serde_json::from_str(&raw).map_err(|e| IssuedeckError::Decode {
        reason: e.to_string(),
        raw: raw.to_string(),
    })?;

    match protocol_error(&value) {
        Some(message) => Err(IssuedeckError::Protocol { message }),
        None => Ok(value),
    }
}

/// Collect the messages of a structured error body.
///
/// Recognizes `errorMessages` (list of strings) and `errors` (field to
/// message). Returns `None` when the body carries no error entries.
pub fn protocol_error(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    let mut messages: Vec<String> = Vec::new();

    if let Some(Value::Array(items)) = object.get("errorMessages") {
        messages.extend(items.iter().map(value_text));
    }

    if let Some(Value::Object(fields)) = object.get("errors") {
        let mut fields: Vec<_> = fields.iter().collect();
        fields.sort_by(|a, b| a.0.cmp(b.0));
        messages.extend(
            fields
                .into_iter()
                .map(|(field, message)| format!("{}: {}", field, value_text(message))),
        );
    }

    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
