//! `todo_write` tool: replace the agent's task list.
//!
//! The whole list is validated before it replaces the previous one; a
//! rejected list leaves the previous one in place.

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::mcp::context::ToolContext;
use crate::mcp::handler::CoderServer;
use crate::mcp::tools::util::{error_response, fields, finish_call, parse_input, success_response};
use crate::AppError;

/// Tool name.
pub const NAME: &str = "todo_write";

const REQUIRED_FIELDS: [&str; 4] = ["id", "content", "status", "priority"];

/// Progress of a todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not started.
    Pending,
    /// Being worked on; at most one item at a time.
    InProgress,
    /// Done.
    Completed,
}

impl TodoStatus {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Importance of a todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    /// Do first.
    High,
    /// Normal.
    Medium,
    /// Nice to have.
    Low,
}

impl TodoPriority {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// One validated todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// Caller-chosen identifier.
    pub id: String,
    /// Task description.
    pub content: String,
    /// Progress.
    pub status: TodoStatus,
    /// Importance.
    pub priority: TodoPriority,
}

#[derive(Debug, Deserialize)]
struct TodoWriteInput {
    todos: Vec<Value>,
}

/// Validate a raw todo list.
///
/// Checks, in order: at most one `in_progress` item; every item carries
/// all required fields; every status and priority is in range.
///
/// # Errors
///
/// Returns `AppError::Tool` with the first violation found.
pub fn validate_todos(items: &[Value]) -> crate::Result<Vec<TodoItem>> {
    let in_progress = items
        .iter()
        .filter(|item| item.get("status").and_then(Value::as_str) == Some("in_progress"))
        .count();
    if in_progress > 1 {
        return Err(AppError::Tool(
            "Only one task can be in_progress at a time".into(),
        ));
    }

    items.iter().map(validate_item).collect()
}

fn validate_item(item: &Value) -> crate::Result<TodoItem> {
    let missing = || AppError::Tool("Each todo must have id, content, status, and priority".into());
    let object = item.as_object().ok_or_else(missing)?;
    if !REQUIRED_FIELDS.iter().all(|key| object.contains_key(*key)) {
        return Err(missing());
    }

    let status_raw = &object["status"];
    let status = status_raw
        .as_str()
        .and_then(TodoStatus::parse)
        .ok_or_else(|| AppError::Tool(format!("Invalid status: {}", plain(status_raw))))?;

    let priority_raw = &object["priority"];
    let priority = priority_raw
        .as_str()
        .and_then(TodoPriority::parse)
        .ok_or_else(|| AppError::Tool(format!("Invalid priority: {}", plain(priority_raw))))?;

    Ok(TodoItem {
        id: plain(&object["id"]),
        content: plain(&object["content"]),
        status,
        priority,
    })
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Validate and store `items`, returning how many were stored.
///
/// # Errors
///
/// Returns `AppError::Tool` describing the first violation.
pub fn todo_write(ctx: &ToolContext, items: &[Value]) -> crate::Result<usize> {
    let todos = validate_todos(items)?;
    let count = todos.len();
    ctx.replace_todos(todos)?;
    info!(count, "todo list updated");
    Ok(count)
}

/// Handle the `todo_write` tool call.
///
/// # Errors
///
/// Returns `invalid_params` when `todos` is missing or not a list.
#[allow(clippy::unused_async)] // Route signature requires a future.
pub async fn handle(
    context: ToolCallContext<'_, CoderServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let server = context.service;
    let ctx = server.context();
    let (input, raw): (TodoWriteInput, _) = parse_input(NAME, context.arguments)?;

    let body = match todo_write(ctx, &input.todos) {
        Ok(count) => success_response(
            Some(Value::String(format!("Updated {count} todos"))),
            fields([("count", Value::from(count))]),
        ),
        Err(AppError::Tool(msg)) => error_response(msg),
        Err(err) => error_response(format!("Error updating todos: {err}")),
    };
    Ok(finish_call(ctx, NAME, raw, body))
}
