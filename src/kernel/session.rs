//! A live interpreter session.
//!
//! A [`Session`] bundles the child process, its [`MessageChannel`], the
//! configuration it was launched with, and a small state machine:
//!
//! ```text
//! Starting -> Ready -> (Busy <-> Idle)* -> Dead
//!     \                       \
//!      -> Dead (launch fails)  -> Hung (total execution bound exceeded)
//! ```
//!
//! The child is spawned with `kill_on_drop(true)`, so dropping a session
//! always terminates its process even when [`Session::shutdown`] is never
//! called.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::kernel::channel::{MessageChannel, Received};
use crate::kernel::execute::{ExecutionController, ExecutionOutcome, ExecutionResult};
use crate::kernel::package::PackageSet;
use crate::kernel::protocol::{Channel, KernelEvent, Request};
use crate::{AppError, Result};

// ── Configuration ─────────────────────────────────────────────────────────────

/// The configuration a session is launched with and compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    working_dir: PathBuf,
    packages: PackageSet,
}

impl SessionConfig {
    /// Build a configuration from an already-validated package set.
    ///
    /// The working directory is canonicalized when it exists so that
    /// `./x` and `/abs/x` compare equal.
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>, packages: PackageSet) -> Self {
        let working_dir = working_dir.into();
        let working_dir = working_dir.canonicalize().unwrap_or(working_dir);
        Self {
            working_dir,
            packages,
        }
    }

    /// Build a configuration, validating raw package specifiers first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidPackageSpec` if any specifier is invalid.
    pub fn parse<I, S>(working_dir: impl Into<PathBuf>, packages: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(working_dir, PackageSet::parse(packages)?))
    }

    /// Directory the interpreter runs in.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Packages injected into the interpreter environment.
    #[must_use]
    pub fn packages(&self) -> &PackageSet {
        &self.packages
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Process spawned, readiness handshake in progress.
    Starting,
    /// Handshake complete, no code run yet.
    Ready,
    /// An execution is in flight.
    Busy,
    /// Last execution finished.
    Idle,
    /// An execution overran the total bound; the session must be replaced.
    Hung,
    /// The process has exited or been torn down.
    Dead,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::Idle => "idle",
            Self::Hung => "hung",
            Self::Dead => "dead",
        };
        f.write_str(name)
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A running interpreter and its channel.
#[derive(Debug)]
pub struct Session {
    id: String,
    config: SessionConfig,
    child: Child,
    pid: Option<u32>,
    channel: MessageChannel,
    state: SessionState,
    started_at: DateTime<Utc>,
    shutdown_grace: Duration,
    _driver: Option<NamedTempFile>,
}

impl Session {
    /// Assemble a session around a freshly spawned child.
    ///
    /// `driver` is the temporary script the child runs; it is kept alive
    /// for as long as the session.
    pub(crate) fn new(
        id: String,
        config: SessionConfig,
        child: Child,
        channel: MessageChannel,
        shutdown_grace: Duration,
        driver: Option<NamedTempFile>,
    ) -> Self {
        let pid = child.id();
        Self {
            id,
            config,
            child,
            pid,
            channel,
            state: SessionState::Starting,
            started_at: Utc::now(),
            shutdown_grace,
            _driver: driver,
        }
    }

    /// Unique session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Configuration this session was launched with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Process id of the child, if the OS reported one.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// When the process was spawned.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(session_id = %self.id, from = %self.state, to = %state, "session state change");
            self.state = state;
        }
    }

    /// Whether the session can still accept work.
    ///
    /// Polls the child without blocking; an exited child moves the session
    /// to [`SessionState::Dead`].
    pub fn is_alive(&mut self) -> bool {
        if matches!(self.state, SessionState::Dead | SessionState::Hung) {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!(session_id = %self.id, %status, "interpreter process has exited");
                self.set_state(SessionState::Dead);
                false
            }
            Err(err) => {
                warn!(session_id = %self.id, %err, "failed to poll interpreter process");
                self.set_state(SessionState::Dead);
                false
            }
        }
    }

    /// Whether this session was launched with exactly `requested`.
    #[must_use]
    pub fn matches(&self, requested: &SessionConfig) -> bool {
        self.config == *requested
    }

    /// Mutable access to the channel for the launcher and controller.
    pub(crate) fn channel_mut(&mut self) -> &mut MessageChannel {
        &mut self.channel
    }

    /// Send a heartbeat and wait for the correlated reply.
    ///
    /// Returns the round-trip time.
    ///
    /// # Errors
    ///
    /// - `AppError::Channel` if the channel is closed.
    /// - `AppError::ReadinessTimeout` if no reply arrives within `timeout`.
    pub async fn heartbeat(&mut self, timeout: Duration) -> Result<Duration> {
        let id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        self.channel.send(Request::Ping { id: id.clone() }).await?;

        loop {
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(AppError::ReadinessTimeout(format!(
                    "no heartbeat reply within {timeout:?}"
                )));
            }
            match self.channel.recv(remaining).await {
                Received::Message(message)
                    if message.channel == Channel::Heartbeat
                        && message.event == KernelEvent::Pong
                        && message.is_reply_to(&id) =>
                {
                    return Ok(started.elapsed());
                }
                Received::Message(message) => {
                    debug!(session_id = %self.id, ?message, "ignoring message while awaiting heartbeat");
                }
                Received::TimedOut => {}
                Received::Closed => {
                    return Err(AppError::Channel(
                        "interpreter closed its output during heartbeat".into(),
                    ));
                }
            }
        }
    }

    /// Run `code` and collect its output.
    ///
    /// `poll_timeout` bounds the wait between two messages; `deadline`
    /// optionally bounds the whole execution. Overrunning the deadline
    /// marks the session [`SessionState::Hung`]; a poll timeout alone
    /// leaves it usable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Channel` if the request cannot be delivered.
    pub async fn execute(
        &mut self,
        code: &str,
        poll_timeout: Duration,
        deadline: Option<Duration>,
    ) -> Result<ExecutionResult> {
        self.set_state(SessionState::Busy);
        let outcome = ExecutionController::new(&mut self.channel, poll_timeout)
            .with_deadline(deadline)
            .run(code)
            .await;

        match &outcome {
            Ok(result) => match result.outcome {
                ExecutionOutcome::Completed | ExecutionOutcome::PollTimedOut => {
                    self.set_state(SessionState::Idle);
                }
                ExecutionOutcome::DeadlineExceeded => {
                    warn!(session_id = %self.id, "execution exceeded total bound, marking session hung");
                    self.set_state(SessionState::Hung);
                }
                ExecutionOutcome::ChannelClosed => self.set_state(SessionState::Dead),
            },
            Err(_) => self.set_state(SessionState::Dead),
        }

        outcome
    }

    /// Tear the session down. Never fails.
    ///
    /// Each step runs regardless of the previous one's outcome:
    /// 1. ask the interpreter to exit and wait briefly for its reply,
    /// 2. close the channel,
    /// 3. wait up to the grace period for the process to exit,
    /// 4. send `SIGTERM` (unix),
    /// 5. force-kill and reap.
    pub async fn shutdown(mut self) {
        let session_id = self.id.clone();
        let grace = self.shutdown_grace;
        let started = Instant::now();

        if self.state != SessionState::Dead {
            self.request_exit(grace).await;
        }

        self.channel.close();
        self.set_state(SessionState::Dead);

        let remaining = grace.saturating_sub(started.elapsed());
        if wait_for_exit(&mut self.child, remaining).await {
            info!(session_id, "interpreter exited");
            return;
        }

        #[cfg(unix)]
        {
            if send_sigterm(self.pid) && wait_for_exit(&mut self.child, grace / 2).await {
                info!(session_id, "interpreter exited after SIGTERM");
                return;
            }
        }

        self.kill().await;
    }

    /// Tear the session down immediately without asking it to exit.
    pub(crate) async fn abort(mut self) {
        self.channel.close();
        self.set_state(SessionState::Dead);
        self.kill().await;
    }

    async fn request_exit(&mut self, grace: Duration) {
        let id = uuid::Uuid::new_v4().to_string();
        if let Err(err) = self.channel.send(Request::Shutdown { id: id.clone() }).await {
            debug!(session_id = %self.id, %err, "shutdown request not delivered");
            return;
        }

        let started = Instant::now();
        loop {
            let remaining = grace.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                debug!(session_id = %self.id, "no shutdown reply within grace period");
                return;
            }
            match self.channel.recv(remaining).await {
                Received::Message(message)
                    if message.event == KernelEvent::ShutdownReply && message.is_reply_to(&id) =>
                {
                    return;
                }
                Received::Message(_) => {}
                Received::TimedOut | Received::Closed => return,
            }
        }
    }

    async fn kill(&mut self) {
        if let Err(err) = self.child.kill().await {
            debug!(session_id = %self.id, %err, "force kill failed (process may already be gone)");
        } else {
            info!(session_id = %self.id, "interpreter force-killed");
        }
    }
}

async fn wait_for_exit(child: &mut Child, wait: Duration) -> bool {
    if wait.is_zero() {
        return matches!(child.try_wait(), Ok(Some(_)));
    }
    matches!(tokio::time::timeout(wait, child.wait()).await, Ok(Ok(_)))
}

#[cfg(unix)]
fn send_sigterm(pid: Option<u32>) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(err) => {
            debug!(pid = raw, %err, "SIGTERM failed");
            false
        }
    }
}
