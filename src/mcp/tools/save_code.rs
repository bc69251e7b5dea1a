//! `save_code` tool: persist the final solution.
//!
//! Writes `<task>_code.py` (or `code.py` for inline tasks) into the working
//! directory.

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use serde_json::Value;
use tracing::info;

use crate::mcp::context::ToolContext;
use crate::mcp::handler::CoderServer;
use crate::mcp::tools::util::{error_response, fields, finish_call, parse_input, success_response};

/// Tool name.
pub const NAME: &str = "save_code";

#[derive(Debug, serde::Deserialize)]
struct SaveCodeInput {
    code: String,
}

/// File name for saved code: `<basename>_code.py` or `code.py`.
#[must_use]
pub fn solution_file_name(task_basename: Option<&str>) -> String {
    match task_basename {
        Some(basename) => format!("{basename}_code.py"),
        None => "code.py".to_owned(),
    }
}

/// Write `code` to the solution file and remember it.
///
/// # Errors
///
/// Returns `AppError::PathViolation` or `AppError::Io` when the file
/// cannot be written.
pub async fn save_code(ctx: &ToolContext, code: &str) -> crate::Result<String> {
    let file_name = solution_file_name(ctx.task_basename());
    let path = ctx.workspace().resolve(&file_name)?;
    tokio::fs::write(&path, code).await?;
    ctx.set_solution(code.to_owned())?;
    info!(path = %path.display(), bytes = code.len(), "solution saved");
    Ok(file_name)
}

/// Handle the `save_code` tool call.
///
/// # Errors
///
/// Returns `invalid_params` when `code` is missing.
pub async fn handle(
    context: ToolCallContext<'_, CoderServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let server = context.service;
    let ctx = server.context();
    let (input, raw): (SaveCodeInput, _) = parse_input(NAME, context.arguments)?;

    let body = match save_code(ctx, &input.code).await {
        Ok(file_name) => success_response(
            Some(Value::String(format!("Code saved to {file_name}"))),
            fields([("file_path", Value::String(file_name))]),
        ),
        Err(err) => error_response(format!("Error saving code: {err}")),
    };
    Ok(finish_call(ctx, NAME, raw, body))
}
