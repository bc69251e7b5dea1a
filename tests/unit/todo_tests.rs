//! Unit tests for todo list validation and storage.

use std::sync::Arc;

use serde_json::{json, Value};

use agentic_coder::config::KernelSettings;
use agentic_coder::kernel::{ProcessLauncher, SessionRegistry};
use agentic_coder::mcp::context::ToolContext;
use agentic_coder::mcp::tools::todo_write::{
    todo_write, validate_todos, TodoPriority, TodoStatus,
};
use agentic_coder::workspace::Workspace;

fn item(id: &str, status: &str, priority: &str) -> Value {
    json!({ "id": id, "content": format!("task {id}"), "status": status, "priority": priority })
}

fn context(dir: &std::path::Path) -> ToolContext {
    let registry = Arc::new(SessionRegistry::new(ProcessLauncher::new(
        KernelSettings::default(),
    )));
    ToolContext::new(registry, Workspace::new(dir).expect("workspace"))
}

#[test]
fn valid_list_is_typed() {
    let todos = validate_todos(&[
        item("1", "completed", "high"),
        item("2", "in_progress", "medium"),
        item("3", "pending", "low"),
    ])
    .expect("valid list");

    assert_eq!(todos.len(), 3);
    assert_eq!(todos[0].status, TodoStatus::Completed);
    assert_eq!(todos[1].status, TodoStatus::InProgress);
    assert_eq!(todos[2].priority, TodoPriority::Low);
    assert_eq!(todos[2].content, "task 3");
}

#[test]
fn empty_list_is_valid() {
    assert!(validate_todos(&[]).expect("empty list").is_empty());
}

#[test]
fn more_than_one_in_progress_is_rejected() {
    let err = validate_todos(&[
        item("1", "in_progress", "high"),
        item("2", "in_progress", "low"),
    ])
    .expect_err("two in progress");

    assert_eq!(
        err.to_string(),
        "tool: Only one task can be in_progress at a time"
    );
}

/// The in-progress check runs before per-item checks.
#[test]
fn in_progress_check_comes_first() {
    let err = validate_todos(&[
        json!({ "id": "x" }),
        item("1", "in_progress", "high"),
        item("2", "in_progress", "high"),
    ])
    .expect_err("invalid");

    assert!(err.to_string().contains("Only one task"));
}

#[test]
fn missing_field_is_rejected() {
    let err = validate_todos(&[json!({ "id": "1", "content": "c", "status": "pending" })])
        .expect_err("missing priority");

    assert!(err
        .to_string()
        .contains("Each todo must have id, content, status, and priority"));
}

#[test]
fn out_of_range_values_are_rejected() {
    let status = validate_todos(&[item("1", "blocked", "high")]).expect_err("status");
    let priority = validate_todos(&[item("1", "pending", "urgent")]).expect_err("priority");

    assert_eq!(status.to_string(), "tool: Invalid status: blocked");
    assert_eq!(priority.to_string(), "tool: Invalid priority: urgent");
}

/// A rejected list leaves the stored one untouched.
#[test]
fn rejected_list_keeps_previous_state() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = context(temp.path());

    let stored = todo_write(&ctx, &[item("1", "pending", "high")]).expect("store");
    assert_eq!(stored, 1);

    todo_write(&ctx, &[item("2", "nope", "high")]).expect_err("invalid status");

    let todos = ctx.todos();
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].id, "1");
}

#[test]
fn write_replaces_whole_list() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = context(temp.path());

    todo_write(&ctx, &[item("1", "pending", "high"), item("2", "pending", "low")])
        .expect("first");
    todo_write(&ctx, &[item("3", "completed", "medium")]).expect("second");

    let ids: Vec<String> = ctx.todos().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["3"]);
}
