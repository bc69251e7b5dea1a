//! JSONL run log writer.

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::warn;

use super::{AuditEntry, AuditLogger};
use crate::{AppError, Result};

/// Log file name used when the run has no task basename.
pub const DEFAULT_LOG_NAME: &str = "log.jsonl";

/// An append-only JSONL writer for a single run log.
///
/// The file is opened lazily on the first entry and every entry is flushed
/// immediately so the log survives an abrupt exit.
pub struct JsonlAuditWriter {
    path: PathBuf,
    state: Mutex<Option<BufWriter<fs::File>>>,
}

impl JsonlAuditWriter {
    /// Construct a writer appending to `path`.
    ///
    /// Creates the parent directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the directory cannot be created.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Config(format!(
                    "failed to create audit log directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(Self {
            path,
            state: Mutex::new(None),
        })
    }

    /// Writer for the run log of a task inside `working_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the directory cannot be created.
    pub fn for_run(working_dir: &Path, task_basename: Option<&str>) -> Result<Self> {
        Self::new(working_dir.join(run_log_name(task_basename)))
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<BufWriter<fs::File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                AppError::Config(format!("failed to open audit log {}: {e}", path.display()))
            })?;
        Ok(BufWriter::new(file))
    }
}

/// File name of the run log: `<basename>.jsonl` or [`DEFAULT_LOG_NAME`].
#[must_use]
pub fn run_log_name(task_basename: Option<&str>) -> String {
    match task_basename {
        Some(basename) if !basename.is_empty() => format!("{basename}.jsonl"),
        _ => DEFAULT_LOG_NAME.to_owned(),
    }
}

impl AuditLogger for JsonlAuditWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| AppError::Config("audit writer mutex poisoned".to_string()))?;

        if guard.is_none() {
            *guard = Some(Self::open(&self.path)?);
        }

        if let Some(writer) = guard.as_mut() {
            let line = serde_json::to_string(&entry)
                .map_err(|e| AppError::Config(format!("failed to serialize audit entry: {e}")))?;
            if let Err(e) = writeln!(writer, "{line}") {
                warn!("failed to write audit log entry: {e}");
                return Err(AppError::Io(format!("audit write failed: {e}")));
            }
            if let Err(e) = writer.flush() {
                warn!("failed to flush audit log: {e}");
                return Err(AppError::Io(format!("audit flush failed: {e}")));
            }
        }

        Ok(())
    }
}
