//! Interpreter process launcher.
//!
//! Starts the embedded driver script either under the bare interpreter or,
//! when packages are requested, under the dependency-injection tool:
//!
//! ```text
//! python3 -u <driver.py>
//! uv run --directory <cwd> --no-project --with <pkg>... python -u <driver.py>
//! ```
//!
//! After spawn, the launcher waits for the driver's `ready` message and a
//! heartbeat round trip, then pushes the session initialization snippet.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::KernelSettings;
use crate::kernel::channel::{MessageChannel, Received};
use crate::kernel::protocol::{Channel, KernelEvent};
use crate::kernel::session::{Session, SessionConfig, SessionState};
use crate::{AppError, Result};

/// Driver script executed by every interpreter session.
pub const DRIVER_SOURCE: &str = include_str!("driver.py");

/// Session setup run right after readiness.
///
/// Surfaces the last expression of each cell and silences deprecation
/// noise from packages that still import `pkg_resources`.
pub const INIT_SNIPPET: &str = "\
import warnings
warnings.filterwarnings('ignore', message='pkg_resources is deprecated', category=UserWarning)
warnings.filterwarnings('ignore', message='.*pkg_resources.*', category=DeprecationWarning)
__session__.display = 'last_expr'
";

/// Remediation shown when the dependency-injection tool is missing.
pub const INSTALL_HINT: &str = "curl -LsSf https://astral.sh/uv/install.sh | sh";

/// Environment variable exposing the session id to user code.
pub const SESSION_ID_ENV: &str = "CODER_SESSION_ID";

// ── Command construction ──────────────────────────────────────────────────────

/// A fully resolved child-process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Binary to execute.
    pub program: String,
    /// Arguments after the binary.
    pub args: Vec<String>,
    /// Directory the child starts in.
    pub working_dir: PathBuf,
    /// Whether the dependency-injection tool wraps the interpreter.
    pub wrapped: bool,
}

impl LaunchCommand {
    /// Build the invocation for `config`, running `driver`.
    #[must_use]
    pub fn build(settings: &KernelSettings, config: &SessionConfig, driver: &Path) -> Self {
        let driver = driver.to_string_lossy().into_owned();
        let working_dir = config.working_dir().to_path_buf();

        if config.packages().is_empty() {
            return Self {
                program: settings.interpreter.clone(),
                args: vec!["-u".into(), driver],
                working_dir,
                wrapped: false,
            };
        }

        let mut args = vec![
            "run".to_owned(),
            "--directory".to_owned(),
            working_dir.to_string_lossy().into_owned(),
            "--no-project".to_owned(),
        ];
        let injected = config
            .packages()
            .iter()
            .map(|spec| spec.as_str().to_owned())
            .chain(settings.runtime_packages.iter().cloned());
        for package in injected {
            args.push("--with".to_owned());
            args.push(package);
        }
        args.extend(["python".to_owned(), "-u".to_owned(), driver]);

        Self {
            program: settings.dependency_tool.clone(),
            args,
            working_dir,
            wrapped: true,
        }
    }

    /// Render as a single shell-like line for logging.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ── Launcher ──────────────────────────────────────────────────────────────────

/// Builds and starts interpreter sessions.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    settings: KernelSettings,
}

impl ProcessLauncher {
    /// Create a launcher with the given settings.
    #[must_use]
    pub fn new(settings: KernelSettings) -> Self {
        Self { settings }
    }

    /// Settings in effect.
    #[must_use]
    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    /// Start a session for `config` and wait until it is ready.
    ///
    /// # Errors
    ///
    /// - `AppError::DependencyToolUnavailable` when packages are requested
    ///   and the dependency tool is not on `PATH`.
    /// - `AppError::Launch` when the process cannot be spawned or exits
    ///   before signalling readiness.
    /// - `AppError::ReadinessTimeout` when the handshake does not finish in
    ///   time. The process is killed before returning.
    pub async fn launch(&self, config: &SessionConfig) -> Result<Session> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("launch", session_id = %session_id);
        self.launch_inner(session_id, config).instrument(span).await
    }

    async fn launch_inner(&self, session_id: String, config: &SessionConfig) -> Result<Session> {
        let driver = write_driver()?;
        let command = LaunchCommand::build(&self.settings, config, driver.path());

        if command.wrapped {
            which::which(&command.program).map_err(|err| {
                AppError::DependencyToolUnavailable(format!(
                    "'{}' is required to inject packages ({err}). Install it with:\n{INSTALL_HINT}",
                    command.program
                ))
            })?;
        }

        info!(
            command = %command.display(),
            working_dir = %command.working_dir.display(),
            packages = %config.packages(),
            "starting interpreter"
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .env(SESSION_ID_ENV, &session_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AppError::Launch(format!("failed to start '{}': {err}", command.program))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture interpreter stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture interpreter stdout".into()))?;
        let stderr = child.stderr.take();

        let channel = MessageChannel::open(
            &session_id,
            stdin,
            stdout,
            stderr,
            self.settings.channel_capacity,
        );
        let mut session = Session::new(
            session_id,
            config.clone(),
            child,
            channel,
            self.settings.shutdown_grace,
            Some(driver),
        );

        if let Err(err) = wait_ready(&mut session, self.settings.readiness_timeout).await {
            warn!(%err, "interpreter failed to become ready, tearing down");
            session.abort().await;
            return Err(err);
        }
        session.set_state(SessionState::Ready);

        self.initialize(&mut session).await;

        info!(pid = ?session.pid(), "interpreter ready");
        Ok(session)
    }

    async fn initialize(&self, session: &mut Session) {
        match session
            .execute(INIT_SNIPPET, self.settings.poll_timeout, None)
            .await
        {
            Ok(result) if result.error.is_none() && result.is_complete() => {
                debug!("session initialization snippet applied");
            }
            Ok(result) => {
                warn!(
                    error = ?result.error,
                    outcome = ?result.outcome,
                    "session initialization snippet did not complete cleanly"
                );
            }
            Err(err) => warn!(%err, "session initialization snippet failed"),
        }
        if session.state() == SessionState::Idle {
            session.set_state(SessionState::Ready);
        }
    }
}

fn write_driver() -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("agentic-coder-driver-")
        .suffix(".py")
        .tempfile()
        .map_err(|err| AppError::Launch(format!("failed to create driver script: {err}")))?;
    file.write_all(DRIVER_SOURCE.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| AppError::Launch(format!("failed to write driver script: {err}")))?;
    Ok(file)
}

/// Wait for `ready` on the control channel, then a heartbeat round trip.
async fn wait_ready(session: &mut Session, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    let timed_out = || {
        AppError::ReadinessTimeout(format!(
            "interpreter did not become ready within {timeout:?}"
        ))
    };

    loop {
        let remaining = timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(timed_out());
        }
        match session.channel_mut().recv(remaining).await {
            Received::Message(message) => {
                if let (Channel::Control, KernelEvent::Ready { pid, cwd }) =
                    (message.channel, &message.event)
                {
                    debug!(pid, cwd = cwd.as_str(), "interpreter signalled ready");
                    break;
                }
                debug!(?message, "ignoring message before ready signal");
            }
            Received::TimedOut => return Err(timed_out()),
            Received::Closed => {
                return Err(AppError::Launch(
                    "interpreter exited before ready signal".into(),
                ));
            }
        }
    }

    let remaining = timeout.saturating_sub(started.elapsed());
    match session.heartbeat(remaining).await {
        Ok(rtt) => {
            debug!(rtt_ms = u64::try_from(rtt.as_millis()).unwrap_or(u64::MAX), "heartbeat ok");
            Ok(())
        }
        Err(AppError::ReadinessTimeout(_)) => Err(timed_out()),
        Err(err) => Err(AppError::Launch(format!("readiness heartbeat failed: {err}"))),
    }
}
