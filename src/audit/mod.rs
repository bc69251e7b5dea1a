//! Structured run log.
//!
//! Provides the [`AuditLogger`] trait and associated types. The primary
//! implementation, [`JsonlAuditWriter`], appends one JSON object per line to
//! `<working_dir>/<task>.jsonl` (or `log.jsonl` for inline tasks).

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event type classification for audit log entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// The server or an `exec` run started.
    RunStart,
    /// A tool was invoked.
    ToolCall,
    /// First interpreter session launched.
    SessionStart,
    /// A stale session was replaced.
    SessionRestart,
    /// A session was shut down.
    SessionShutdown,
    /// The agent reported an environment or task issue.
    IssueReported,
    /// The run finished.
    RunEnd,
}

/// A structured record of one run event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ISO 8601 timestamp with timezone.
    pub timestamp: DateTime<Utc>,
    /// Associated interpreter session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Event classification.
    #[serde(rename = "event")]
    pub event_type: AuditEventType,
    /// Tool name (for `tool_call` events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool call parameters (for `tool_call` events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    /// Brief result description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    /// Free-form payload (reported issue text, run arguments).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

impl AuditEntry {
    /// Construct a minimal audit entry for the given event type.
    #[must_use]
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: None,
            event_type,
            tool_name: None,
            parameters: None,
            result_summary: None,
            content: None,
        }
    }

    /// Set the session identifier for this entry.
    #[must_use]
    pub fn with_session(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Set the tool name for this entry.
    #[must_use]
    pub fn with_tool(mut self, tool_name: String) -> Self {
        self.tool_name = Some(tool_name);
        self
    }

    /// Set the tool parameters for this entry.
    #[must_use]
    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Set the result summary for this entry.
    #[must_use]
    pub fn with_result(mut self, summary: String) -> Self {
        self.result_summary = Some(summary);
        self
    }

    /// Set the free-form payload for this entry.
    #[must_use]
    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = Some(content);
        self
    }
}

/// Writes structured audit entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`std::sync::Arc`].
pub trait AuditLogger: Send + Sync {
    /// Record a single audit entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: AuditEntry) -> crate::Result<()>;
}

pub use writer::JsonlAuditWriter;
