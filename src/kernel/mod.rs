//! Persistent out-of-process Python execution sessions.
//!
//! Leaves first: [`package`] validates dependency specifiers, [`protocol`],
//! [`codec`], [`reader`] and [`writer`] carry messages, [`channel`] bundles
//! them per child, [`launcher`] starts children, [`session`] and
//! [`execute`] run code, [`registry`] decides reuse versus respawn, and
//! [`format`] shapes results for callers.

pub mod channel;
pub mod codec;
pub mod execute;
pub mod format;
pub mod launcher;
pub mod package;
pub mod protocol;
pub mod reader;
pub mod registry;
pub mod session;
pub mod writer;

pub use execute::{ExecutionOutcome, ExecutionResult};
pub use format::{format_result, ExecutionRecord, KERNEL_EXIT_NOTE};
pub use launcher::ProcessLauncher;
pub use package::{PackageSet, PackageSpec};
pub use registry::{SessionGuard, SessionRegistry, Staleness};
pub use session::{Session, SessionConfig, SessionState};
