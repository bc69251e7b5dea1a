//! Working-directory handle and path validation.
//!
//! Keeps tool file operations inside the working directory. Relative paths
//! are normalized, `..` escapes are rejected, and symlinks whose target
//! leaves the root are rejected. This is a guard against mistakes, not a
//! sandbox.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Canonical working directory shared by every tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open an existing directory as the workspace root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the path does not exist or is not a
    /// directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let root = path.canonicalize().map_err(|err| {
            AppError::Config(format!("directory does not exist: {} ({err})", path.display()))
        })?;
        if !root.is_dir() {
            return Err(AppError::Config(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// Absolute, canonical root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied relative path inside the root.
    ///
    /// # Errors
    ///
    /// Returns `AppError::PathViolation` for absolute paths and escapes.
    pub fn resolve(&self, candidate: impl AsRef<Path>) -> Result<PathBuf> {
        let candidate = candidate.as_ref();
        if candidate.is_absolute() || candidate.has_root() {
            return Err(AppError::PathViolation("absolute paths not allowed".into()));
        }
        validate_path(&self.root, candidate)
    }
}

/// Validate that `candidate` resides within `root`.
///
/// Returns the resolved absolute path on success.
///
/// # Errors
///
/// Returns `AppError::PathViolation` if:
/// - `root` cannot be canonicalized.
/// - The candidate contains `..` segments that escape the root.
/// - The resolved path does not start with the root.
/// - The resolved path is a symlink whose target escapes the root.
pub fn validate_path(root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("working directory invalid: {err}")))?;

    let mut normalized = PathBuf::new();
    for component in candidate.as_ref().components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(format!(
                        "path {} is outside working directory",
                        candidate.as_ref().display()
                    )));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => normalized.clear(),
            Component::Normal(part) => normalized.push(part),
        }
    }

    let absolute = root.join(normalized);
    if !absolute.starts_with(&root) {
        return Err(AppError::PathViolation(format!(
            "path {} is outside working directory",
            candidate.as_ref().display()
        )));
    }

    // Canonicalize the deepest existing ancestor, then re-append the rest.
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    while std::fs::symlink_metadata(existing).is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_owned());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = existing
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;
    if !resolved.starts_with(&root) {
        return Err(AppError::PathViolation(
            "symlink target escapes working directory".into(),
        ));
    }
    resolved.extend(missing.iter().rev());
    Ok(resolved)
}
