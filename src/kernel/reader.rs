//! Interpreter reader tasks.
//!
//! [`run_reader`] drives a [`FramedRead`] over the child's stdout, parses
//! each line into a [`KernelMessage`] and forwards it through an [`mpsc`]
//! channel. [`run_stderr_drain`] re-logs the child's stderr so diagnostic
//! output is never lost and never blocks the child on a full pipe.
//!
//! Malformed or oversized lines are logged and skipped; they do **not**
//! terminate the reader. The reader ends on EOF, on an I/O error, on
//! cancellation, or when the receiving side is dropped. In every case the
//! sender is dropped, which the receiver observes as a closed channel.

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::kernel::codec::KernelCodec;
use crate::kernel::protocol::{parse_inbound_line, KernelMessage};
use crate::AppError;

/// Read NDJSON lines from `stdout` and emit [`KernelMessage`]s.
pub async fn run_reader<R>(
    session_id: String,
    stdout: R,
    message_tx: mpsc::Sender<KernelMessage>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, KernelCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "kernel reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(session_id, "kernel reader: EOF detected");
                        break;
                    }

                    Some(Err(AppError::Protocol(ref msg))) => {
                        warn!(
                            session_id,
                            error = msg.as_str(),
                            "kernel reader: codec framing error, skipping"
                        );
                    }

                    Some(Err(e)) => {
                        warn!(session_id, error = %e, "kernel reader: IO error, stopping");
                        break;
                    }

                    Some(Ok(line)) => match parse_inbound_line(&line) {
                        Ok(Some(message)) => {
                            if message_tx.send(message).await.is_err() {
                                debug!(session_id, "kernel reader: receiver closed, stopping");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(
                                session_id,
                                error = %e,
                                raw_line = %line,
                                "kernel reader: parse error, skipping line"
                            );
                        }
                    },
                }
            }
        }
    }
}

/// Forward every line of the child's stderr to `tracing` at `DEBUG`.
pub async fn run_stderr_drain<R>(session_id: String, stderr: R, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = BufReader::new(stderr).lines();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    debug!(
                        target: "agentic_coder::kernel::stderr",
                        session_id,
                        "{line}"
                    );
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(session_id, error = %e, "kernel stderr drain: read failed");
                    break;
                }
            },
        }
    }
}
