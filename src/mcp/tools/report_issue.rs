//! `report_issue` tool: note an environment or task problem.
//!
//! Issues are kept in memory and merged into the run log when the run
//! finishes.

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use serde_json::Value;
use tracing::info;

use crate::mcp::context::ToolContext;
use crate::mcp::handler::CoderServer;
use crate::mcp::tools::util::{error_response, fields, finish_call, parse_input, success_response};

/// Tool name.
pub const NAME: &str = "report_issue";

#[derive(Debug, serde::Deserialize)]
struct ReportIssueInput {
    text: String,
}

/// Record one issue.
///
/// # Errors
///
/// Returns `AppError::Tool` if the issue log is unavailable.
pub fn report_issue(ctx: &ToolContext, text: &str) -> crate::Result<()> {
    ctx.push_issue(text.to_owned())?;
    info!(len = text.len(), "issue reported");
    Ok(())
}

/// Handle the `report_issue` tool call.
///
/// # Errors
///
/// Returns `invalid_params` when `text` is missing.
#[allow(clippy::unused_async)] // Route signature requires a future.
pub async fn handle(
    context: ToolCallContext<'_, CoderServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let server = context.service;
    let ctx = server.context();
    let (input, raw): (ReportIssueInput, _) = parse_input(NAME, context.arguments)?;

    let body = match report_issue(ctx, &input.text) {
        Ok(()) => success_response(
            Some(Value::String(
                "Issue reported and will be included in the log".into(),
            )),
            fields([("reported", Value::Bool(true))]),
        ),
        Err(err) => error_response(format!("Error reporting issue: {err}")),
    };
    Ok(finish_call(ctx, NAME, raw, body))
}
