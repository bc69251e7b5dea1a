//! Message channel between the host and one interpreter process.
//!
//! A [`MessageChannel`] owns the reader, writer, and stderr-drain tasks for
//! a child and exposes a single outbound queue and a single inbound queue.
//! It is single-reader: only one caller may poll [`MessageChannel::recv`]
//! at a time, which `&mut self` enforces.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::kernel::protocol::{KernelMessage, Request};
use crate::kernel::reader::{run_reader, run_stderr_drain};
use crate::kernel::writer::run_writer;
use crate::{AppError, Result};

/// Outcome of a bounded receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A message arrived within the wait.
    Message(KernelMessage),
    /// Nothing arrived within the wait.
    TimedOut,
    /// The reader has stopped; no further messages will arrive.
    Closed,
}

/// Bidirectional, typed channel to a running interpreter.
#[derive(Debug)]
pub struct MessageChannel {
    session_id: String,
    request_tx: Option<mpsc::Sender<Request>>,
    message_rx: mpsc::Receiver<KernelMessage>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MessageChannel {
    /// Wire up reader and writer tasks over the child's stdio.
    ///
    /// `stderr` is optional so tests can drive the channel over in-memory
    /// pipes.
    #[must_use]
    pub fn open<W, R, E>(
        session_id: &str,
        stdin: W,
        stdout: R,
        stderr: Option<E>,
        capacity: usize,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let capacity = capacity.max(1);
        let cancel = CancellationToken::new();
        let (request_tx, request_rx) = mpsc::channel::<Request>(capacity);
        let (message_tx, message_rx) = mpsc::channel::<KernelMessage>(capacity);

        let mut tasks = Vec::with_capacity(3);

        tasks.push(tokio::spawn(run_reader(
            session_id.to_owned(),
            stdout,
            message_tx,
            cancel.clone(),
        )));

        let writer_session = session_id.to_owned();
        let writer_cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(err) =
                run_writer(writer_session.clone(), stdin, request_rx, writer_cancel).await
            {
                warn!(session_id = writer_session, %err, "kernel writer stopped with error");
            }
        }));

        if let Some(stderr) = stderr {
            tasks.push(tokio::spawn(run_stderr_drain(
                session_id.to_owned(),
                stderr,
                cancel.clone(),
            )));
        }

        Self {
            session_id: session_id.to_owned(),
            request_tx: Some(request_tx),
            message_rx,
            cancel,
            tasks,
        }
    }

    /// Queue a request for the interpreter.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` if the channel has been closed or the
    /// writer task has stopped.
    pub async fn send(&self, request: Request) -> Result<()> {
        let tx = self
            .request_tx
            .as_ref()
            .ok_or_else(|| AppError::Channel("channel closed".into()))?;
        tx.send(request)
            .await
            .map_err(|_| AppError::Channel("interpreter input closed".into()))
    }

    /// Wait up to `wait` for the next inbound message.
    pub async fn recv(&mut self, wait: Duration) -> Received {
        match tokio::time::timeout(wait, self.message_rx.recv()).await {
            Ok(Some(message)) => Received::Message(message),
            Ok(None) => Received::Closed,
            Err(_elapsed) => Received::TimedOut,
        }
    }

    /// Discard any messages already queued.
    ///
    /// Returns how many were dropped.
    pub fn drain_pending(&mut self) -> usize {
        let mut dropped = 0;
        while self.message_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!(session_id = self.session_id, dropped, "discarded stale kernel messages");
        }
        dropped
    }

    /// Stop all tasks and drop the outbound queue.
    ///
    /// Safe to call more than once.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.request_tx = None;
        self.message_rx.close();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.close();
    }
}
