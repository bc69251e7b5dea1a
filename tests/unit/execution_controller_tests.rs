//! Unit tests for `ExecutionController` against a scripted fake driver.
//!
//! Covers correlation filtering, the poll timeout (partial output), the
//! total deadline, and an interpreter that exits mid-execution.

use std::time::Duration;

use serde_json::json;

use agentic_coder::kernel::execute::{format_error, ExecutionController};
use agentic_coder::kernel::ExecutionOutcome;

use super::fake_kernel::{
    self, envelope, execute_result, request_id, status, stream, Reply,
};

const POLL: Duration = Duration::from_secs(2);

// ── Aggregation ──────────────────────────────────────────────

/// Streams, the result value and the idle status are folded into one result.
#[tokio::test]
async fn collects_streams_and_value_until_idle() {
    let mut channel = fake_kernel::spawn(|request| {
        assert_eq!(request["kind"], "execute");
        assert_eq!(request["store_history"], true);
        let id = request_id(request);
        Reply::Send(vec![
            status(&id, "busy"),
            stream(&id, "stdout", "hello "),
            stream(&id, "stdout", "world\n"),
            stream(&id, "stderr", "UserWarning: careful\n"),
            execute_result(&id, "42"),
            status(&id, "idle"),
        ])
    });

    let result = ExecutionController::new(&mut channel, POLL)
        .run("print('hello world'); 42")
        .await
        .expect("run");

    assert_eq!(result.outcome, ExecutionOutcome::Completed);
    assert!(result.is_complete());
    assert_eq!(result.stdout.as_deref(), Some("hello world\n"));
    assert_eq!(result.stderr.as_deref(), Some("UserWarning: careful\n"));
    assert_eq!(result.value.as_deref(), Some("42"));
    assert!(result.error.is_none());
}

/// Messages produced by other requests never leak into this result.
#[tokio::test]
async fn uncorrelated_messages_are_discarded() {
    let mut channel = fake_kernel::spawn(|request| {
        let id = request_id(request);
        Reply::Send(vec![
            stream("previous-request", "stdout", "stale output\n"),
            execute_result("previous-request", "'stale'"),
            status("previous-request", "idle"),
            stream(&id, "stdout", "fresh\n"),
            status(&id, "idle"),
        ])
    });

    let result = ExecutionController::new(&mut channel, POLL)
        .run("print('fresh')")
        .await
        .expect("run");

    assert_eq!(result.stdout.as_deref(), Some("fresh\n"));
    assert!(result.value.is_none());
    assert!(result.is_complete());
}

/// An error message is rendered as `Name: message` plus traceback.
#[tokio::test]
async fn error_is_formatted_with_traceback() {
    let mut channel = fake_kernel::spawn(|request| {
        let id = request_id(request);
        Reply::Send(vec![
            envelope(
                "broadcast",
                "error",
                Some(&id),
                json!({
                    "ename": "ZeroDivisionError",
                    "evalue": "division by zero",
                    "traceback": ["Traceback (most recent call last):", "ZeroDivisionError: division by zero"]
                }),
            ),
            status(&id, "idle"),
        ])
    });

    let result = ExecutionController::new(&mut channel, POLL)
        .run("1/0")
        .await
        .expect("run");

    let error = result.error.expect("error captured");
    assert!(error.starts_with("ZeroDivisionError: division by zero\n"));
    assert!(error.contains("Traceback (most recent call last):"));
}

// ── Bounds ───────────────────────────────────────────────────

/// Silence after some output returns what arrived so far.
#[tokio::test]
async fn poll_timeout_returns_partial_output() {
    let mut channel = fake_kernel::spawn(|request| {
        let id = request_id(request);
        Reply::Send(vec![status(&id, "busy"), stream(&id, "stdout", "step 1\n")])
    });

    let result = ExecutionController::new(&mut channel, Duration::from_millis(200))
        .run("long_job()")
        .await
        .expect("run");

    assert_eq!(result.outcome, ExecutionOutcome::PollTimedOut);
    assert_eq!(result.stdout.as_deref(), Some("step 1\n"));
    assert!(!result.is_complete());
}

/// The total deadline wins over a longer poll timeout.
#[tokio::test]
async fn deadline_bounds_the_whole_run() {
    let mut channel = fake_kernel::spawn(|request| {
        let id = request_id(request);
        Reply::Send(vec![status(&id, "busy")])
    });

    let started = std::time::Instant::now();
    let result = ExecutionController::new(&mut channel, Duration::from_secs(30))
        .with_deadline(Some(Duration::from_millis(200)))
        .run("while True: pass")
        .await
        .expect("run");

    assert_eq!(result.outcome, ExecutionOutcome::DeadlineExceeded);
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// An interpreter that dies mid-run ends the loop without an error.
#[tokio::test]
async fn closed_stream_ends_execution() {
    let mut channel = fake_kernel::spawn(|request| {
        let id = request_id(request);
        Reply::SendAndClose(vec![stream(&id, "stdout", "before exit\n")])
    });

    let result = ExecutionController::new(&mut channel, POLL)
        .run("import os; print('before exit'); os._exit(1)")
        .await
        .expect("run");

    assert_eq!(result.outcome, ExecutionOutcome::ChannelClosed);
    assert_eq!(result.stdout.as_deref(), Some("before exit\n"));
}

/// A closed channel rejects the request up front.
#[tokio::test]
async fn closed_channel_fails_to_send() {
    let mut channel = fake_kernel::spawn(|_| Reply::Send(Vec::new()));
    channel.close();

    let err = ExecutionController::new(&mut channel, POLL)
        .run("1")
        .await
        .expect_err("send must fail");

    assert!(err.to_string().starts_with("channel:"));
}

// ── format_error ─────────────────────────────────────────────

#[test]
fn format_error_without_traceback_is_single_line() {
    assert_eq!(format_error("KeyError", "'x'", &[]), "KeyError: 'x'");
}
