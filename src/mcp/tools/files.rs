//! File tools scoped to the working directory.
//!
//! `read_file`, `write_file`, `list_files` and `delete_file` all take paths
//! relative to the working directory; absolute paths and escapes are
//! rejected by [`crate::workspace::Workspace::resolve`].

use std::path::Path;

use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::CallToolResult;
use serde_json::Value;
use tracing::debug;

use crate::mcp::context::ToolContext;
use crate::mcp::handler::CoderServer;
use crate::mcp::tools::util::{error_response, fields, finish_call, parse_input, success_response};
use crate::workspace::Workspace;
use crate::AppError;

/// `read_file` tool name.
pub const READ_FILE: &str = "read_file";
/// `write_file` tool name.
pub const WRITE_FILE: &str = "write_file";
/// `list_files` tool name.
pub const LIST_FILES: &str = "list_files";
/// `delete_file` tool name.
pub const DELETE_FILE: &str = "delete_file";

#[derive(Debug, serde::Deserialize)]
struct PathInput {
    file_path: String,
}

#[derive(Debug, serde::Deserialize)]
struct WriteInput {
    file_path: String,
    content: String,
}

#[derive(Debug, serde::Deserialize)]
struct ListInput {
    #[serde(default = "default_pattern")]
    pattern: String,
}

fn default_pattern() -> String {
    "*".into()
}

// ── Operations ───────────────────────────────────────────────────────────────

/// Read a file as UTF-8 text.
pub async fn read_file(workspace: &Workspace, file_path: &str) -> String {
    let path = match workspace.resolve(file_path) {
        Ok(path) => path,
        Err(err) => return error_response(format!("Error reading file: {err}")),
    };
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => success_response(
            Some(Value::String(content)),
            fields([("file_path", Value::String(file_path.to_owned()))]),
        ),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            error_response(format!("File not found: {file_path}"))
        }
        Err(err) => error_response(format!("Error reading file: {err}")),
    }
}

/// Write `content`, creating parent directories as needed.
pub async fn write_file(workspace: &Workspace, file_path: &str, content: &str) -> String {
    let result = async {
        let path = workspace.resolve(file_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok::<_, AppError>(())
    }
    .await;

    match result {
        Ok(()) => success_response(
            Some(Value::String(format!("Successfully wrote to {file_path}"))),
            fields([
                ("file_path", Value::String(file_path.to_owned())),
                ("bytes_written", Value::from(content.len())),
            ]),
        ),
        Err(err) => error_response(format!("Error writing file: {err}")),
    }
}

/// List files matching a glob pattern relative to the working directory.
///
/// `**` matches across directories; other patterns stay at one level.
#[must_use]
pub fn list_files(workspace: &Workspace, pattern: &str) -> String {
    match matching_files(workspace.root(), pattern) {
        Ok(files) => {
            let count = files.len();
            success_response(
                Some(Value::from(files)),
                fields([
                    ("pattern", Value::String(pattern.to_owned())),
                    ("count", Value::from(count)),
                ]),
            )
        }
        Err(err) => error_response(format!("Error listing files: {err}")),
    }
}

fn matching_files(root: &Path, pattern: &str) -> crate::Result<Vec<String>> {
    if Path::new(pattern).is_absolute() || pattern.split(['/', '\\']).any(|part| part == "..") {
        return Err(AppError::PathViolation(format!(
            "pattern {pattern} is outside working directory"
        )));
    }

    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let full_pattern = format!("{escaped_root}/{pattern}");
    let entries = glob::glob(&full_pattern)
        .map_err(|err| AppError::Tool(format!("invalid pattern: {err}")))?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => {
                if let Ok(relative) = path.strip_prefix(root) {
                    files.push(relative.to_string_lossy().into_owned());
                }
            }
            Ok(_) => {}
            Err(err) => debug!(%err, "skipping unreadable path"),
        }
    }
    files.sort();
    Ok(files)
}

/// Delete a regular file.
pub async fn delete_file(workspace: &Workspace, file_path: &str) -> String {
    let path = match workspace.resolve(file_path) {
        Ok(path) => path,
        Err(err) => return error_response(format!("Error deleting file: {err}")),
    };
    if !path.exists() {
        return error_response(format!("File not found: {file_path}"));
    }
    if !path.is_file() {
        return error_response(format!("Not a file: {file_path}"));
    }
    match tokio::fs::remove_file(&path).await {
        Ok(()) => success_response(
            Some(Value::String(format!("Successfully deleted {file_path}"))),
            fields([("file_path", Value::String(file_path.to_owned()))]),
        ),
        Err(err) => error_response(format!("Error deleting file: {err}")),
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

fn context_of<'a>(context: &ToolCallContext<'a, CoderServer>) -> &'a ToolContext {
    context.service.context()
}

/// Handle the `read_file` tool call.
///
/// # Errors
///
/// Returns `invalid_params` when `file_path` is missing.
pub async fn handle_read(
    context: ToolCallContext<'_, CoderServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let ctx = context_of(&context);
    let (input, raw): (PathInput, _) = parse_input(READ_FILE, context.arguments)?;
    let body = read_file(ctx.workspace(), &input.file_path).await;
    Ok(finish_call(ctx, READ_FILE, raw, body))
}

/// Handle the `write_file` tool call.
///
/// # Errors
///
/// Returns `invalid_params` when `file_path` or `content` is missing.
pub async fn handle_write(
    context: ToolCallContext<'_, CoderServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let ctx = context_of(&context);
    let (input, raw): (WriteInput, _) = parse_input(WRITE_FILE, context.arguments)?;
    let body = write_file(ctx.workspace(), &input.file_path, &input.content).await;
    Ok(finish_call(ctx, WRITE_FILE, raw, body))
}

/// Handle the `list_files` tool call.
///
/// # Errors
///
/// Returns `invalid_params` when `pattern` is not a string.
#[allow(clippy::unused_async)] // Route signature requires a future.
pub async fn handle_list(
    context: ToolCallContext<'_, CoderServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let ctx = context_of(&context);
    let (input, raw): (ListInput, _) = parse_input(LIST_FILES, context.arguments)?;
    let body = list_files(ctx.workspace(), &input.pattern);
    Ok(finish_call(ctx, LIST_FILES, raw, body))
}

/// Handle the `delete_file` tool call.
///
/// # Errors
///
/// Returns `invalid_params` when `file_path` is missing.
pub async fn handle_delete(
    context: ToolCallContext<'_, CoderServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    let ctx = context_of(&context);
    let (input, raw): (PathInput, _) = parse_input(DELETE_FILE, context.arguments)?;
    let body = delete_file(ctx.workspace(), &input.file_path).await;
    Ok(finish_call(ctx, DELETE_FILE, raw, body))
}
