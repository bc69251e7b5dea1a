//! Wire model for the interpreter message protocol.
//!
//! Host → interpreter traffic is a [`Request`] per line on the child's stdin.
//! Interpreter → host traffic is an envelope per line on the child's stdout:
//!
//! ```json
//! {"channel":"broadcast","kind":"stream","parent_id":"<id>","content":{"name":"stdout","text":"hi\n"}}
//! ```
//!
//! | Channel     | Kinds                                                   |
//! |-------------|---------------------------------------------------------|
//! | `control`   | `ready`, `shutdown_reply`                               |
//! | `broadcast` | `status`, `stream`, `execute_result`, `error`           |
//! | `heartbeat` | `pong`                                                  |

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AppError, Result};

// ── Outbound ──────────────────────────────────────────────────────────────────

/// A request sent to the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    /// Run a block of code in the shared namespace.
    Execute {
        /// Correlation token echoed back as `parent_id`.
        id: String,
        /// Source text.
        code: String,
        /// Suppress published results when true.
        silent: bool,
        /// Record the cell in the interpreter's execution history.
        store_history: bool,
    },
    /// Heartbeat probe answered by `pong`.
    Ping {
        /// Correlation token.
        id: String,
    },
    /// Ask the interpreter to exit its loop.
    Shutdown {
        /// Correlation token.
        id: String,
    },
}

impl Request {
    /// Build an execute request that surfaces results and records history.
    #[must_use]
    pub fn execute(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Execute {
            id: id.into(),
            code: code.into(),
            silent: false,
            store_history: true,
        }
    }

    /// Correlation token of this request.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Execute { id, .. } | Self::Ping { id } | Self::Shutdown { id } => id,
        }
    }
}

// ── Inbound ───────────────────────────────────────────────────────────────────

/// Logical channel an inbound message travelled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Lifecycle traffic (readiness, shutdown acknowledgement).
    Control,
    /// Execution events (status, streams, results, errors).
    Broadcast,
    /// Liveness replies.
    Heartbeat,
}

/// Interpreter execution state reported by `status` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// A request is being processed.
    Busy,
    /// The interpreter has finished with a request.
    Idle,
}

/// Decoded payload of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent {
    /// Text written to `sys.stdout`.
    Stdout(String),
    /// Text written to `sys.stderr`, warnings included.
    Stderr(String),
    /// Plain-text representation of the last expression value.
    ExecuteResult(String),
    /// An exception raised by user code.
    Error {
        /// Exception class name.
        ename: String,
        /// Exception message.
        evalue: String,
        /// Formatted traceback lines.
        traceback: Vec<String>,
    },
    /// Busy/idle transition.
    Status(ExecutionState),
    /// The interpreter loop is up.
    Ready {
        /// Interpreter process id.
        pid: u32,
        /// Interpreter working directory.
        cwd: String,
    },
    /// Heartbeat reply.
    Pong,
    /// Acknowledgement of a shutdown request.
    ShutdownReply,
    /// A kind this host does not understand.
    Unknown(String),
}

/// An inbound message with its routing metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelMessage {
    /// Channel the message travelled on.
    pub channel: Channel,
    /// Correlation token of the request that produced it, if any.
    pub parent_id: Option<String>,
    /// Decoded payload.
    pub event: KernelEvent,
}

impl KernelMessage {
    /// Whether this message was produced by the request `id`.
    #[must_use]
    pub fn is_reply_to(&self, id: &str) -> bool {
        self.parent_id.as_deref() == Some(id)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    channel: Channel,
    kind: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    content: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StreamContent {
    name: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ResultContent {
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorContent {
    ename: String,
    #[serde(default)]
    evalue: String,
    #[serde(default)]
    traceback: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StatusContent {
    execution_state: ExecutionState,
}

#[derive(Debug, Deserialize)]
struct ReadyContent {
    pid: u32,
    #[serde(default)]
    cwd: String,
}

/// Parse a single NDJSON line from the interpreter into a [`KernelMessage`].
///
/// # Return value
///
/// - `Ok(Some(message))` for any well-formed envelope, including unknown
///   kinds (mapped to [`KernelEvent::Unknown`]).
/// - `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns `AppError::Protocol` when the line is not valid JSON, the
/// channel is unrecognised, or a known kind has a malformed payload.
pub fn parse_inbound_line(line: &str) -> Result<Option<KernelMessage>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let envelope: Envelope = serde_json::from_str(line)
        .map_err(|e| AppError::Protocol(format!("malformed json: {e}")))?;

    let event = decode_event(&envelope.kind, envelope.content)?;

    Ok(Some(KernelMessage {
        channel: envelope.channel,
        parent_id: envelope.parent_id,
        event,
    }))
}

fn decode_event(kind: &str, content: serde_json::Value) -> Result<KernelEvent> {
    let event = match kind {
        "stream" => {
            let stream: StreamContent = content_as(kind, content)?;
            if stream.name == "stderr" {
                KernelEvent::Stderr(stream.text)
            } else {
                KernelEvent::Stdout(stream.text)
            }
        }
        "execute_result" => {
            let result: ResultContent = content_as(kind, content)?;
            let text = match result.data.get("text/plain") {
                Some(serde_json::Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            KernelEvent::ExecuteResult(text)
        }
        "error" => {
            let error: ErrorContent = content_as(kind, content)?;
            KernelEvent::Error {
                ename: error.ename,
                evalue: error.evalue,
                traceback: error.traceback,
            }
        }
        "status" => {
            let status: StatusContent = content_as(kind, content)?;
            KernelEvent::Status(status.execution_state)
        }
        "ready" => {
            let ready: ReadyContent = content_as(kind, content)?;
            KernelEvent::Ready {
                pid: ready.pid,
                cwd: ready.cwd,
            }
        }
        "pong" => KernelEvent::Pong,
        "shutdown_reply" => KernelEvent::ShutdownReply,
        other => {
            debug!(kind = other, "kernel protocol: unknown message kind");
            KernelEvent::Unknown(other.to_owned())
        }
    };
    Ok(event)
}

fn content_as<T: for<'de> Deserialize<'de>>(kind: &str, content: serde_json::Value) -> Result<T> {
    serde_json::from_value(content)
        .map_err(|e| AppError::Protocol(format!("invalid {kind} content: {e}")))
}
