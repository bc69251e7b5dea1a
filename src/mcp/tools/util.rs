//! Shared utilities for tool handlers.

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::mcp::context::ToolContext;

/// Build a success response: `{"success": true, "result": ..., ...extra}`.
///
/// `result` is omitted when `None`. Pretty-printed with two-space indent.
#[must_use]
pub fn success_response(result: Option<Value>, extra: Map<String, Value>) -> String {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(true));
    if let Some(result) = result {
        body.insert("result".into(), result);
    }
    body.extend(extra);
    to_pretty(&Value::Object(body))
}

/// Build a failure response: `{"success": false, "error": ...}`.
#[must_use]
pub fn error_response(error: impl Into<String>) -> String {
    let mut body = Map::new();
    body.insert("success".into(), Value::Bool(false));
    body.insert("error".into(), Value::String(error.into()));
    to_pretty(&Value::Object(body))
}

fn to_pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Collect `key: value` pairs into a JSON object.
#[must_use]
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
}

/// Deserialize tool arguments into a typed input.
///
/// # Errors
///
/// Returns `invalid_params` naming the tool when the arguments do not fit.
pub fn parse_input<T: DeserializeOwned>(
    tool: &str,
    arguments: Option<JsonObject>,
) -> Result<(T, Value), rmcp::ErrorData> {
    let raw = Value::Object(arguments.unwrap_or_default());
    let input = serde_json::from_value(raw.clone()).map_err(|err| {
        rmcp::ErrorData::invalid_params(format!("invalid {tool} parameters: {err}"), None)
    })?;
    Ok((input, raw))
}

/// Audit the call and wrap the JSON body as text content.
#[must_use]
pub fn finish_call(ctx: &ToolContext, tool: &str, parameters: Value, body: String) -> CallToolResult {
    ctx.record_tool_call(tool, parameters, &body);
    CallToolResult::success(vec![Content::text(body)])
}

/// Truncate `text` to at most `max_len` bytes, breaking at the nearest
/// preceding char boundary so the result is always valid UTF-8.
/// Appends `"..."` when truncation occurs and `max_len >= 3`.
#[must_use]
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_owned();
    }

    let limit = if max_len < 3 {
        max_len
    } else {
        max_len - 3
    };
    let boundary = text
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= limit)
        .last()
        .unwrap_or(0);

    if max_len < 3 {
        text[..boundary].to_owned()
    } else {
        format!("{}...", &text[..boundary])
    }
}
