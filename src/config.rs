//! Global configuration parsing and validation.
//!
//! Every field has a default, so an absent file or an empty document yields
//! a usable configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Interpreter launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct KernelConfig {
    /// Bare interpreter binary used when no packages are requested.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Dependency-injection launcher used when packages are requested.
    #[serde(default = "default_dependency_tool")]
    pub dependency_tool: String,
    /// Packages always injected alongside the requested ones.
    #[serde(default)]
    pub runtime_packages: Vec<String>,
    /// Bounded queue size for inbound interpreter messages.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_interpreter() -> String {
    "python3".into()
}

fn default_dependency_tool() -> String {
    "uv".into()
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            dependency_tool: default_dependency_tool(),
            runtime_packages: Vec::new(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Configurable timeout values for the interpreter session.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutConfig {
    /// Readiness handshake bound; covers package installation.
    #[serde(default = "default_readiness_seconds")]
    pub readiness_seconds: u64,
    /// Maximum wait between two messages of one execution.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
    /// Total execution bound; 0 means unbounded.
    #[serde(default)]
    pub execution_seconds: u64,
    /// Grace period for a cooperative interpreter exit.
    #[serde(default = "default_shutdown_grace_millis")]
    pub shutdown_grace_millis: u64,
}

fn default_readiness_seconds() -> u64 {
    30
}

fn default_poll_seconds() -> u64 {
    30
}

fn default_shutdown_grace_millis() -> u64 {
    2000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            readiness_seconds: default_readiness_seconds(),
            poll_seconds: default_poll_seconds(),
            execution_seconds: 0,
            shutdown_grace_millis: default_shutdown_grace_millis(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Interpreter launch settings.
    #[serde(default)]
    pub kernel: KernelConfig,
    /// Timeout configuration.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Runtime view of the kernel settings with durations resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSettings {
    /// Bare interpreter binary.
    pub interpreter: String,
    /// Dependency-injection launcher binary.
    pub dependency_tool: String,
    /// Packages always injected when the launcher wraps the interpreter.
    pub runtime_packages: Vec<String>,
    /// Bounded queue size for inbound messages.
    pub channel_capacity: usize,
    /// Readiness handshake bound.
    pub readiness_timeout: Duration,
    /// Maximum wait between two messages of one execution.
    pub poll_timeout: Duration,
    /// Optional total execution bound.
    pub execution_timeout: Option<Duration>,
    /// Grace period before signalling the interpreter on shutdown.
    pub shutdown_grace: Duration,
}

impl Default for KernelSettings {
    fn default() -> Self {
        GlobalConfig::default().kernel_settings()
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the settings consumed by the session launcher.
    #[must_use]
    pub fn kernel_settings(&self) -> KernelSettings {
        let execution_timeout = match self.timeouts.execution_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        KernelSettings {
            interpreter: self.kernel.interpreter.clone(),
            dependency_tool: self.kernel.dependency_tool.clone(),
            runtime_packages: self.kernel.runtime_packages.clone(),
            channel_capacity: self.kernel.channel_capacity,
            readiness_timeout: Duration::from_secs(self.timeouts.readiness_seconds),
            poll_timeout: Duration::from_secs(self.timeouts.poll_seconds),
            execution_timeout,
            shutdown_grace: Duration::from_millis(self.timeouts.shutdown_grace_millis),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.kernel.interpreter.trim().is_empty() {
            return Err(AppError::Config("kernel.interpreter must not be empty".into()));
        }

        if self.kernel.dependency_tool.trim().is_empty() {
            return Err(AppError::Config(
                "kernel.dependency_tool must not be empty".into(),
            ));
        }

        if self.kernel.channel_capacity == 0 {
            return Err(AppError::Config(
                "kernel.channel_capacity must be greater than zero".into(),
            ));
        }

        crate::kernel::PackageSet::parse(&self.kernel.runtime_packages)
            .map_err(|err| AppError::Config(format!("kernel.runtime_packages: {err}")))?;

        if self.timeouts.readiness_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.readiness_seconds must be greater than zero".into(),
            ));
        }

        if self.timeouts.poll_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.poll_seconds must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Translate a log level name into an `EnvFilter` directive.
///
/// Python spellings (`WARNING`, `CRITICAL`, `FATAL`, `NOTSET`) map to their
/// tracing equivalents. Level names are lowercased; anything else, such as a
/// full `target=level` directive, passes through unchanged.
#[must_use]
pub fn log_level_directive(raw: &str) -> String {
    let raw = raw.trim();
    match raw.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_owned(),
        "critical" | "fatal" => "error".to_owned(),
        "notset" => "trace".to_owned(),
        level @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => level.to_owned(),
        _ => raw.to_owned(),
    }
}
