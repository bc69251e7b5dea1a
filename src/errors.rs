//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Errors raised by user code inside the interpreter are not represented
/// here; they travel as data inside an execution result.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// A package specifier did not match the accepted grammar.
    InvalidPackageSpec(String),
    /// The dependency-injection launcher is not installed on this host.
    DependencyToolUnavailable(String),
    /// The interpreter process could not be started.
    Launch(String),
    /// The interpreter started but never completed the readiness handshake.
    ReadinessTimeout(String),
    /// The message channel to the interpreter is closed or unusable.
    Channel(String),
    /// An inbound line could not be framed or parsed.
    Protocol(String),
    /// File system path failed validation against the working directory.
    PathViolation(String),
    /// Tool input was rejected.
    Tool(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether this error means a session could not be created at all.
    #[must_use]
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            Self::Launch(_) | Self::ReadinessTimeout(_) | Self::DependencyToolUnavailable(_)
        )
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::InvalidPackageSpec(msg) => write!(f, "invalid package spec: {msg}"),
            Self::DependencyToolUnavailable(msg) => {
                write!(f, "dependency tool unavailable: {msg}")
            }
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::ReadinessTimeout(msg) => write!(f, "readiness timeout: {msg}"),
            Self::Channel(msg) => write!(f, "channel: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::Tool(msg) => write!(f, "tool: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
