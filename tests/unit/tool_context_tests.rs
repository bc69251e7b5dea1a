//! Unit tests for `ToolContext` run state and the run log.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentic_coder::audit::{AuditEntry, AuditEventType, AuditLogger};
use agentic_coder::config::KernelSettings;
use agentic_coder::kernel::{ProcessLauncher, SessionRegistry};
use agentic_coder::mcp::context::ToolContext;
use agentic_coder::mcp::tools::python_exec::startup_message;
use agentic_coder::mcp::tools::report_issue::report_issue;
use agentic_coder::mcp::tools::save_code::{save_code, solution_file_name};
use agentic_coder::workspace::Workspace;
use agentic_coder::AppError;

/// Audit sink that keeps entries in memory.
#[derive(Default)]
struct MemoryAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLogger for MemoryAudit {
    fn log_entry(&self, entry: AuditEntry) -> agentic_coder::Result<()> {
        self.entries.lock().expect("lock").push(entry);
        Ok(())
    }
}

impl MemoryAudit {
    fn events(&self) -> Vec<AuditEventType> {
        self.entries
            .lock()
            .expect("lock")
            .iter()
            .map(|e| e.event_type)
            .collect()
    }
}

fn context(dir: &std::path::Path, audit: &Arc<MemoryAudit>) -> ToolContext {
    let settings = KernelSettings {
        poll_timeout: Duration::from_secs(7),
        ..KernelSettings::default()
    };
    let registry = Arc::new(SessionRegistry::new(ProcessLauncher::new(settings)));
    ToolContext::new(registry, Workspace::new(dir).expect("workspace"))
        .with_audit(Arc::clone(audit) as Arc<dyn AuditLogger>)
}

#[test]
fn timeouts_come_from_launcher_settings() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = context(temp.path(), &Arc::default());

    assert_eq!(ctx.poll_timeout(), Duration::from_secs(7));
    assert_eq!(ctx.execution_timeout(), None);

    let ctx = ctx
        .with_poll_timeout(Duration::from_secs(1))
        .with_execution_timeout(Some(Duration::from_secs(3)));
    assert_eq!(ctx.poll_timeout(), Duration::from_secs(1));
    assert_eq!(ctx.execution_timeout(), Some(Duration::from_secs(3)));
}

#[test]
fn empty_task_basename_is_ignored() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = context(temp.path(), &Arc::default()).with_task_basename(Some(String::new()));

    assert_eq!(ctx.task_basename(), None);
}

/// Reported issues are merged into the log, followed by the run end.
#[test]
fn finish_merges_issues_into_log() {
    let temp = tempfile::tempdir().expect("tempdir");
    let audit = Arc::new(MemoryAudit::default());
    let ctx = context(temp.path(), &audit);

    report_issue(&ctx, "pandas is missing").expect("report");
    report_issue(&ctx, "task is ambiguous").expect("report");
    let issues = ctx.finish();

    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].kind, "agent_feedback");
    assert_eq!(issues[1].content, "task is ambiguous");
    assert_eq!(
        audit.events(),
        vec![
            AuditEventType::IssueReported,
            AuditEventType::IssueReported,
            AuditEventType::RunEnd,
        ]
    );
    let entries = audit.entries.lock().expect("lock");
    assert_eq!(
        entries[0].content.as_ref().expect("content")["type"],
        "agent_feedback"
    );
}

#[test]
fn tool_call_summary_is_truncated() {
    let temp = tempfile::tempdir().expect("tempdir");
    let audit = Arc::new(MemoryAudit::default());
    let ctx = context(temp.path(), &audit);

    ctx.record_tool_call("python_exec", serde_json::json!({}), &"x".repeat(2_000));

    let entries = audit.entries.lock().expect("lock");
    let summary = entries[0].result_summary.as_deref().expect("summary");
    assert_eq!(summary.len(), 500);
    assert!(summary.ends_with("..."));
    assert_eq!(entries[0].tool_name.as_deref(), Some("python_exec"));
}

// ── save_code ────────────────────────────────────────────────

#[test]
fn solution_file_follows_task_basename() {
    assert_eq!(solution_file_name(Some("task_7")), "task_7_code.py");
    assert_eq!(solution_file_name(None), "code.py");
}

#[tokio::test]
async fn save_code_writes_into_working_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = context(temp.path(), &Arc::default()).with_task_basename(Some("task_7".into()));

    let file_name = save_code(&ctx, "print('done')\n").await.expect("save");

    assert_eq!(file_name, "task_7_code.py");
    let saved = std::fs::read_to_string(temp.path().join("task_7_code.py")).expect("read");
    assert_eq!(saved, "print('done')\n");
    assert_eq!(ctx.solution().as_deref(), Some("print('done')\n"));
}

#[tokio::test]
async fn save_code_overwrites_previous_solution() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = context(temp.path(), &Arc::default());

    save_code(&ctx, "v1").await.expect("first");
    save_code(&ctx, "v2").await.expect("second");

    let saved = std::fs::read_to_string(temp.path().join("code.py")).expect("read");
    assert_eq!(saved, "v2");
}

// ── startup messages ─────────────────────────────────────────

#[test]
fn startup_messages_are_actionable() {
    let uv = startup_message(&AppError::DependencyToolUnavailable("uv".into()));
    let launch = startup_message(&AppError::Launch("no such file".into()));
    let ready = startup_message(&AppError::ReadinessTimeout("30s".into()));
    let spec = startup_message(&AppError::InvalidPackageSpec("bad 'x y'".into()));

    assert!(uv.starts_with("UV is not installed"));
    assert!(uv.contains("https://astral.sh/uv/install.sh"));
    assert_eq!(launch, "Failed to start Python kernel: launch: no such file");
    assert!(ready.starts_with("Failed to start Python kernel: readiness timeout"));
    assert_eq!(spec, "bad 'x y'");
}
