//! The process-wide single-session registry.
//!
//! [`SessionRegistry`] owns at most one [`Session`]. Every [`acquire`]
//! runs inside one async mutex, so respawns are serialized and two callers
//! can never replace the session concurrently. The returned guard keeps
//! the lock held for as long as the caller uses the session, which also
//! serializes executions.
//!
//! [`acquire`]: SessionRegistry::acquire

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{info, info_span, Instrument};

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::kernel::launcher::ProcessLauncher;
use crate::kernel::session::{Session, SessionConfig, SessionState};
use crate::{AppError, Result};

/// Exclusive handle to the active session.
pub type SessionGuard<'a> = MappedMutexGuard<'a, Session>;

/// Why the current session cannot serve a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// No session exists yet.
    Absent,
    /// The process has exited or been torn down.
    ProcessExited,
    /// A previous execution overran the total bound.
    Hung,
    /// The requested working directory differs.
    WorkingDirectoryChanged,
    /// The requested package set differs.
    PackagesChanged,
}

impl Display for Staleness {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::Absent => "no session",
            Self::ProcessExited => "process exited",
            Self::Hung => "session hung",
            Self::WorkingDirectoryChanged => "working directory changed",
            Self::PackagesChanged => "package set changed",
        };
        f.write_str(reason)
    }
}

/// Decide whether `session` can serve `requested`.
///
/// Returns `None` when the session is reusable.
#[must_use]
pub fn staleness(session: Option<&mut Session>, requested: &SessionConfig) -> Option<Staleness> {
    let Some(session) = session else {
        return Some(Staleness::Absent);
    };
    if session.state() == SessionState::Hung {
        return Some(Staleness::Hung);
    }
    if !session.is_alive() {
        return Some(Staleness::ProcessExited);
    }
    if session.matches(requested) {
        return None;
    }
    if session.config().working_dir() == requested.working_dir() {
        Some(Staleness::PackagesChanged)
    } else {
        Some(Staleness::WorkingDirectoryChanged)
    }
}

/// Owner of the single active session.
pub struct SessionRegistry {
    launcher: ProcessLauncher,
    slot: Mutex<Option<Session>>,
    audit: Option<Arc<dyn AuditLogger>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(launcher: ProcessLauncher) -> Self {
        Self {
            launcher,
            slot: Mutex::new(None),
            audit: None,
        }
    }

    /// Record session lifecycle events in `audit`.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Launcher used for respawns.
    #[must_use]
    pub fn launcher(&self) -> &ProcessLauncher {
        &self.launcher
    }

    /// Return a session matching `config`, respawning if needed.
    ///
    /// A stale session is shut down (best-effort) before a new one is
    /// launched. If the launch fails the registry is left empty so the next
    /// call retries from scratch.
    ///
    /// # Errors
    ///
    /// Propagates launch failures (`Launch`, `ReadinessTimeout`,
    /// `DependencyToolUnavailable`).
    pub async fn acquire(&self, config: &SessionConfig) -> Result<SessionGuard<'_>> {
        let mut slot = self.slot.lock().await;

        if let Some(reason) = staleness(Option::as_mut(&mut *slot), config) {
            let span = info_span!("respawn", %reason);
            self.respawn(&mut *slot, config, reason).instrument(span).await?;
        }

        MutexGuard::try_map(slot, Option::as_mut)
            .map_err(|_| AppError::Launch("session slot empty after launch".into()))
    }

    async fn respawn(
        &self,
        slot: &mut Option<Session>,
        config: &SessionConfig,
        reason: Staleness,
    ) -> Result<()> {
        if let Some(previous) = slot.take() {
            let previous_id = previous.id().to_owned();
            info!(session_id = %previous_id, "replacing session");
            previous.shutdown().await;
            self.record(
                AuditEntry::new(AuditEventType::SessionShutdown)
                    .with_session(previous_id)
                    .with_result(reason.to_string()),
            );
        }

        let session = self.launcher.launch(config).await?;
        let event = if reason == Staleness::Absent {
            AuditEventType::SessionStart
        } else {
            AuditEventType::SessionRestart
        };
        self.record(
            AuditEntry::new(event)
                .with_session(session.id().to_owned())
                .with_result(format!(
                    "cwd={} packages=[{}]",
                    config.working_dir().display(),
                    config.packages()
                )),
        );
        *slot = Some(session);
        Ok(())
    }

    /// Shut down the active session, if any. Never fails and is safe to
    /// call repeatedly.
    pub async fn release(&self) {
        let previous = self.slot.lock().await.take();
        if let Some(session) = previous {
            let session_id = session.id().to_owned();
            info!(session_id, "releasing session");
            session.shutdown().await;
            self.record(
                AuditEntry::new(AuditEventType::SessionShutdown)
                    .with_session(session_id)
                    .with_result("released".into()),
            );
        }
    }

    /// Id of the active session without touching the process.
    pub async fn active_session_id(&self) -> Option<String> {
        self.slot.lock().await.as_ref().map(|s| s.id().to_owned())
    }

    /// Whether a session is currently held.
    pub async fn is_empty(&self) -> bool {
        self.slot.lock().await.is_none()
    }

    fn record(&self, entry: AuditEntry) {
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.log_entry(entry) {
                tracing::warn!(%err, "failed to write session audit entry");
            }
        }
    }
}
