//! Per-run context shared by every tool handler.
//!
//! [`ToolContext`] bundles the session registry, the working directory,
//! the default package set, and the small amount of run state the tools
//! accumulate (reported issues, the todo list, the saved solution). It is
//! injected into the MCP server and the `exec` command rather than looked
//! up globally, so tests can build independent contexts.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::kernel::{PackageSet, SessionConfig, SessionRegistry};
use crate::mcp::tools::todo_write::TodoItem;
use crate::mcp::tools::util::truncate_text;
use crate::workspace::Workspace;
use crate::{AppError, Result};

/// Longest result summary written to the run log.
const SUMMARY_LIMIT: usize = 500;

/// An issue reported by the agent, merged into the run log at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedIssue {
    /// Always `agent_feedback`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Issue text.
    pub content: String,
}

/// Shared state for one agent run.
pub struct ToolContext {
    registry: Arc<SessionRegistry>,
    workspace: Workspace,
    packages: PackageSet,
    task_basename: Option<String>,
    poll_timeout: Duration,
    execution_timeout: Option<Duration>,
    audit: Option<Arc<dyn AuditLogger>>,
    issues: Mutex<Vec<ReportedIssue>>,
    todos: Mutex<Vec<TodoItem>>,
    solution: Mutex<Option<String>>,
}

impl ToolContext {
    /// Build a context using the registry launcher's timeouts.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, workspace: Workspace) -> Self {
        let settings = registry.launcher().settings();
        let poll_timeout = settings.poll_timeout;
        let execution_timeout = settings.execution_timeout;
        Self {
            registry,
            workspace,
            packages: PackageSet::empty(),
            task_basename: None,
            poll_timeout,
            execution_timeout,
            audit: None,
            issues: Mutex::new(Vec::new()),
            todos: Mutex::new(Vec::new()),
            solution: Mutex::new(None),
        }
    }

    /// Default packages injected into every session.
    #[must_use]
    pub fn with_packages(mut self, packages: PackageSet) -> Self {
        self.packages = packages;
        self
    }

    /// Task identifier used to name saved code and the run log.
    #[must_use]
    pub fn with_task_basename(mut self, basename: Option<String>) -> Self {
        self.task_basename = basename.filter(|b| !b.is_empty());
        self
    }

    /// Override the per-message poll timeout.
    #[must_use]
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Override the total execution bound.
    #[must_use]
    pub fn with_execution_timeout(mut self, execution_timeout: Option<Duration>) -> Self {
        self.execution_timeout = execution_timeout;
        self
    }

    /// Record tool calls and reported issues in `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Working directory.
    #[must_use]
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Default package set.
    #[must_use]
    pub fn packages(&self) -> &PackageSet {
        &self.packages
    }

    /// Task basename, if the run came from a task file.
    #[must_use]
    pub fn task_basename(&self) -> Option<&str> {
        self.task_basename.as_deref()
    }

    /// Per-message poll timeout.
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// Optional total execution bound.
    #[must_use]
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout
    }

    /// Session configuration for the next execution.
    ///
    /// The package override in [`crate::kernel::package::WITH_PACKAGES_ENV`]
    /// takes precedence over the configured set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidPackageSpec` if the override is invalid.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let packages = PackageSet::from_env()?.unwrap_or_else(|| self.packages.clone());
        Ok(SessionConfig::new(self.workspace.root(), packages))
    }

    // ── Run state ────────────────────────────────────────────

    pub(crate) fn push_issue(&self, content: String) -> Result<()> {
        lock(&self.issues)?.push(ReportedIssue {
            kind: "agent_feedback".into(),
            content,
        });
        Ok(())
    }

    /// Issues reported so far.
    #[must_use]
    pub fn issues(&self) -> Vec<ReportedIssue> {
        lock(&self.issues).map(|g| g.clone()).unwrap_or_default()
    }

    pub(crate) fn replace_todos(&self, todos: Vec<TodoItem>) -> Result<()> {
        *lock(&self.todos)? = todos;
        Ok(())
    }

    /// Current todo list.
    #[must_use]
    pub fn todos(&self) -> Vec<TodoItem> {
        lock(&self.todos).map(|g| g.clone()).unwrap_or_default()
    }

    pub(crate) fn set_solution(&self, code: String) -> Result<()> {
        *lock(&self.solution)? = Some(code);
        Ok(())
    }

    /// Code most recently passed to `save_code`.
    #[must_use]
    pub fn solution(&self) -> Option<String> {
        lock(&self.solution).ok().and_then(|g| g.clone())
    }

    // ── Audit ────────────────────────────────────────────────

    /// Record a generic run event.
    pub fn record(&self, entry: AuditEntry) {
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.log_entry(entry) {
                warn!(%err, "failed to write run log entry");
            }
        }
    }

    /// Record one tool invocation with a truncated result summary.
    pub fn record_tool_call(&self, tool: &str, parameters: serde_json::Value, response: &str) {
        self.record(
            AuditEntry::new(AuditEventType::ToolCall)
                .with_tool(tool.to_owned())
                .with_parameters(parameters)
                .with_result(truncate_text(response, SUMMARY_LIMIT)),
        );
    }

    /// Merge reported issues into the run log and close the run.
    ///
    /// Returns the issues that were merged.
    #[must_use]
    pub fn finish(&self) -> Vec<ReportedIssue> {
        let issues = self.issues();
        for issue in &issues {
            let content = serde_json::to_value(issue).unwrap_or(serde_json::Value::Null);
            self.record(AuditEntry::new(AuditEventType::IssueReported).with_content(content));
        }
        self.record(AuditEntry::new(AuditEventType::RunEnd).with_result(format!(
            "{} issue(s) reported, solution {}",
            issues.len(),
            if self.solution().is_some() { "saved" } else { "not saved" }
        )));
        issues
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Tool("tool state mutex poisoned".into()))
}
