//! `python_exec` tool: run code in the persistent interpreter session.
//!
//! Variables, imports and definitions persist between calls. Startup and
//! infrastructure failures come back as failure records, never as protocol
//! errors, so the agent can read them and adapt.

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use tracing::{info, info_span, warn, Instrument};

use crate::kernel::launcher::INSTALL_HINT;
use crate::kernel::{format_result, ExecutionOutcome, ExecutionRecord};
use crate::mcp::context::ToolContext;
use crate::mcp::handler::CoderServer;
use crate::mcp::tools::util::{finish_call, parse_input};
use crate::AppError;

/// Tool name.
pub const NAME: &str = "python_exec";

#[derive(Debug, serde::Deserialize)]
struct PythonExecInput {
    code: String,
}

/// Execute `code` in the shared session and format the outcome.
pub async fn python_exec(ctx: &ToolContext, code: &str) -> ExecutionRecord {
    let config = match ctx.session_config() {
        Ok(config) => config,
        Err(err) => return ExecutionRecord::failure(startup_message(&err)),
    };

    let mut session = match ctx.registry().acquire(&config).await {
        Ok(session) => session,
        Err(err) => {
            warn!(%err, "failed to acquire interpreter session");
            return ExecutionRecord::failure(startup_message(&err));
        }
    };

    let span = info_span!("python_exec", session_id = %session.id());
    let outcome = session
        .execute(code, ctx.poll_timeout(), ctx.execution_timeout())
        .instrument(span)
        .await;
    drop(session);

    match outcome {
        Ok(result) => {
            match result.outcome {
                ExecutionOutcome::Completed => {}
                ExecutionOutcome::PollTimedOut => {
                    info!("execution still running after poll timeout, returning partial output");
                }
                ExecutionOutcome::DeadlineExceeded => {
                    warn!("execution exceeded total bound; session will be replaced");
                }
                ExecutionOutcome::ChannelClosed => {
                    warn!("interpreter exited during execution");
                }
            }
            format_result(&result)
        }
        Err(err) => ExecutionRecord::failure(format!("Unexpected error executing code: {err}")),
    }
}

/// Map a session startup error to the message shown to the agent.
#[must_use]
pub fn startup_message(err: &AppError) -> String {
    match err {
        AppError::DependencyToolUnavailable(_) => format!(
            "UV is not installed. To use dynamic package mode, install UV with:\n{INSTALL_HINT}"
        ),
        AppError::InvalidPackageSpec(msg) => msg.clone(),
        AppError::Launch(_) | AppError::ReadinessTimeout(_) => {
            format!("Failed to start Python kernel: {err}")
        }
        other => format!("Kernel error: {other}"),
    }
}

/// Handle the `python_exec` tool call.
///
/// # Errors
///
/// Returns `invalid_params` when `code` is missing.
pub async fn handle(
    context: ToolCallContext<'_, CoderServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let server = context.service;
    let ctx = server.context();
    let (input, raw): (PythonExecInput, _) = parse_input(NAME, context.arguments)?;

    let record = python_exec(ctx, &input.code).await;
    Ok(finish_call(ctx, NAME, raw, record.to_json()))
}
