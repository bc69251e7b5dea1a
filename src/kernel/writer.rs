//! Interpreter writer task.
//!
//! Receives [`Request`]s from an [`mpsc`] channel, serialises each to a
//! single-line JSON string and writes it, newline-terminated, to the child's
//! stdin.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::kernel::protocol::Request;
use crate::{AppError, Result};

/// Serialise outbound requests onto `stdin`.
///
/// The task exits cleanly when `cancel` fires or every sender is dropped.
/// Dropping `stdin` on exit closes the pipe, which the interpreter treats
/// as end of input.
///
/// # Errors
///
/// - `AppError::Protocol` if a request cannot be serialised.
/// - `AppError::Channel` if the write fails (the interpreter has exited).
pub async fn run_writer<W>(
    session_id: String,
    stdin: W,
    mut request_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut stdin = stdin;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "kernel writer: cancellation received, stopping");
                break;
            }

            request = request_rx.recv() => {
                let Some(request) = request else {
                    debug!(session_id, "kernel writer: request channel closed, stopping");
                    break;
                };

                let mut bytes = serde_json::to_vec(&request).map_err(|e| {
                    AppError::Protocol(format!("failed to serialise request: {e}"))
                })?;
                bytes.push(b'\n');

                stdin.write_all(&bytes).await.map_err(|e| {
                    warn!(session_id, error = %e, "kernel writer: write to stdin failed");
                    AppError::Channel(format!("write failed: {e}"))
                })?;
                stdin.flush().await.map_err(|e| {
                    AppError::Channel(format!("flush failed: {e}"))
                })?;
            }
        }
    }

    Ok(())
}
