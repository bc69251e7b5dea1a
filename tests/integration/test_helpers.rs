//! Shared helpers for tests that start real interpreter processes.
//!
//! Every test that needs Python calls [`python_available`] first and
//! returns early when `python3` is not on `PATH`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use agentic_coder::config::KernelSettings;
use agentic_coder::kernel::{PackageSet, ProcessLauncher, SessionConfig, SessionRegistry};
use agentic_coder::mcp::context::ToolContext;
use agentic_coder::workspace::Workspace;

/// Whether a Python interpreter is available; logs a skip note if not.
pub fn python_available() -> bool {
    let found = which::which("python3").is_ok();
    if !found {
        eprintln!("skipping: python3 not found on PATH");
    }
    found
}

/// Settings tuned for tests: generous readiness, short grace.
pub fn test_settings() -> KernelSettings {
    KernelSettings {
        readiness_timeout: Duration::from_secs(30),
        poll_timeout: Duration::from_secs(15),
        shutdown_grace: Duration::from_millis(500),
        ..KernelSettings::default()
    }
}

pub fn registry(settings: KernelSettings) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(ProcessLauncher::new(settings)))
}

pub fn bare_config(dir: &Path) -> SessionConfig {
    SessionConfig::new(dir, PackageSet::empty())
}

pub fn packaged_config(dir: &Path, packages: &[&str]) -> SessionConfig {
    SessionConfig::new(dir, PackageSet::parse(packages).expect("valid packages"))
}

pub fn tool_context(registry: &Arc<SessionRegistry>, dir: &Path) -> ToolContext {
    ToolContext::new(Arc::clone(registry), Workspace::new(dir).expect("workspace"))
}

/// Write an executable shell script into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
    path
}

/// A stand-in dependency tool that records its arguments and runs the
/// driver under `python3` without installing anything.
#[cfg(unix)]
pub fn fake_dependency_tool(dir: &Path) -> (PathBuf, PathBuf) {
    let args_file = dir.join("uv-args.txt");
    let body = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" >> '{}'\nfor last; do :; done\nexec python3 -u \"$last\"\n",
        args_file.display()
    );
    (write_script(dir, "fake-uv", &body), args_file)
}
