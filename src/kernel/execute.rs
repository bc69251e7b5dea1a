//! Correlated execution over a [`MessageChannel`].
//!
//! [`ExecutionController::run`] sends one execute request and drains the
//! channel until the interpreter reports `idle` for that request. The poll
//! timeout bounds the gap *between* messages, not the whole run, so a long
//! computation that keeps printing is never cut off. An optional deadline
//! bounds the whole run.

use std::time::{Duration, Instant};

use tracing::{debug, info_span, trace, Instrument};

use crate::kernel::channel::{MessageChannel, Received};
use crate::kernel::protocol::{ExecutionState, KernelEvent, Request};
use crate::Result;

/// Why the receive loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The interpreter returned to idle for this request.
    Completed,
    /// No message arrived within the poll timeout; output may be partial.
    PollTimedOut,
    /// The total execution bound elapsed; output may be partial.
    DeadlineExceeded,
    /// The interpreter closed its output stream mid-execution.
    ChannelClosed,
}

/// Output aggregated from one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Concatenated stdout text.
    pub stdout: Option<String>,
    /// Concatenated stderr text.
    pub stderr: Option<String>,
    /// Plain-text form of the last expression value.
    pub value: Option<String>,
    /// `"Name: message"` followed by the traceback, if user code raised.
    pub error: Option<String>,
    /// How the receive loop ended.
    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    fn new() -> Self {
        Self {
            stdout: None,
            stderr: None,
            value: None,
            error: None,
            outcome: ExecutionOutcome::Completed,
        }
    }

    /// Whether the loop saw the terminal idle status.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.outcome == ExecutionOutcome::Completed
    }

    fn absorb(&mut self, event: KernelEvent) -> bool {
        match event {
            KernelEvent::Stdout(text) => append(&mut self.stdout, &text),
            KernelEvent::Stderr(text) => append(&mut self.stderr, &text),
            KernelEvent::ExecuteResult(text) => self.value = Some(text),
            KernelEvent::Error {
                ename,
                evalue,
                traceback,
            } => self.error = Some(format_error(&ename, &evalue, &traceback)),
            KernelEvent::Status(ExecutionState::Idle) => return true,
            KernelEvent::Status(ExecutionState::Busy)
            | KernelEvent::Ready { .. }
            | KernelEvent::Pong
            | KernelEvent::ShutdownReply
            | KernelEvent::Unknown(_) => {}
        }
        false
    }
}

fn append(slot: &mut Option<String>, text: &str) {
    slot.get_or_insert_with(String::new).push_str(text);
}

/// Render an interpreter error as `"Name: message"` plus traceback lines.
#[must_use]
pub fn format_error(ename: &str, evalue: &str, traceback: &[String]) -> String {
    let mut summary = format!("{ename}: {evalue}");
    if !traceback.is_empty() {
        summary.push('\n');
        summary.push_str(&traceback.join("\n"));
    }
    summary
}

/// Drives one execute request to completion.
pub struct ExecutionController<'a> {
    channel: &'a mut MessageChannel,
    poll_timeout: Duration,
    deadline: Option<Duration>,
}

impl<'a> ExecutionController<'a> {
    /// Create a controller with a per-message poll timeout.
    #[must_use]
    pub fn new(channel: &'a mut MessageChannel, poll_timeout: Duration) -> Self {
        Self {
            channel,
            poll_timeout,
            deadline: None,
        }
    }

    /// Bound the total execution time.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Send `code` and collect everything correlated to it.
    ///
    /// Messages already queued, and those whose `parent_id` does not match
    /// this request, are discarded. A poll timeout or a closed stream ends
    /// the loop with the partial output gathered so far.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` if the request cannot be queued.
    pub async fn run(self, code: &str) -> Result<ExecutionResult> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("execute", correlation_id = %correlation_id);
        self.run_correlated(correlation_id, code).instrument(span).await
    }

    async fn run_correlated(self, correlation_id: String, code: &str) -> Result<ExecutionResult> {
        let Self {
            channel,
            poll_timeout,
            deadline,
        } = self;

        // Leftovers from a cell that outlived its poll timeout.
        channel.drain_pending();
        channel
            .send(Request::execute(correlation_id.clone(), code))
            .await?;

        let started = Instant::now();
        let mut result = ExecutionResult::new();

        loop {
            let wait = match deadline {
                Some(total) => {
                    let remaining = total.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        result.outcome = ExecutionOutcome::DeadlineExceeded;
                        break;
                    }
                    remaining.min(poll_timeout)
                }
                None => poll_timeout,
            };

            match channel.recv(wait).await {
                Received::Message(message) => {
                    if !message.is_reply_to(&correlation_id) {
                        trace!(parent_id = ?message.parent_id, "discarding uncorrelated message");
                        continue;
                    }
                    if result.absorb(message.event) {
                        break;
                    }
                }
                Received::TimedOut => {
                    let deadline_hit = deadline.is_some_and(|total| started.elapsed() >= total);
                    result.outcome = if deadline_hit {
                        ExecutionOutcome::DeadlineExceeded
                    } else {
                        ExecutionOutcome::PollTimedOut
                    };
                    break;
                }
                Received::Closed => {
                    result.outcome = ExecutionOutcome::ChannelClosed;
                    break;
                }
            }
        }

        debug!(
            outcome = ?result.outcome,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            has_error = result.error.is_some(),
            "execution finished"
        );
        Ok(result)
    }
}
