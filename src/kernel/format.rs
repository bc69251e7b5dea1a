//! Compact success/failure records for execution results.

use serde::Serialize;

use crate::kernel::execute::{ExecutionOutcome, ExecutionResult};

/// The record handed back to the agent loop.
///
/// Absent fields are omitted from the JSON entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    /// True iff no error was captured.
    pub success: bool,
    /// Printed output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Value of the last expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Warnings and other stderr output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Error summary and traceback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionRecord {
    /// A failure record carrying only an error message.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: None,
            result: None,
            stderr: None,
            error: Some(error.into()),
        }
    }

    /// Pretty-printed JSON with two-space indentation.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|err| {
            format!("{{\n  \"success\": false,\n  \"error\": \"failed to serialize record: {err}\"\n}}")
        })
    }
}

/// Normalize an [`ExecutionResult`] into a sparse [`ExecutionRecord`].
///
/// Trailing whitespace is trimmed from the streams. The result value is kept
/// verbatim unless it is blank or `None`, in which case it is absent.
#[must_use]
pub fn format_result(result: &ExecutionResult) -> ExecutionRecord {
    let value = result
        .value
        .as_ref()
        .filter(|v| {
            let bare = v.trim();
            !bare.is_empty() && bare != "None"
        })
        .cloned();

    ExecutionRecord {
        success: result.error.is_none(),
        stdout: trimmed(result.stdout.as_deref()),
        result: value,
        stderr: with_exit_note(trimmed(result.stderr.as_deref()), result.outcome),
        error: result.error.clone(),
    }
}

/// Appended to `stderr` when the interpreter dies mid-execution.
pub const KERNEL_EXIT_NOTE: &str =
    "Python kernel exited during execution; a fresh session will start on the next call.";

fn with_exit_note(stderr: Option<String>, outcome: ExecutionOutcome) -> Option<String> {
    if outcome != ExecutionOutcome::ChannelClosed {
        return stderr;
    }
    Some(match stderr {
        Some(text) => format!("{text}\n{KERNEL_EXIT_NOTE}"),
        None => KERNEL_EXIT_NOTE.to_owned(),
    })
}

fn trimmed(text: Option<&str>) -> Option<String> {
    text.map(str::trim_end)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}
