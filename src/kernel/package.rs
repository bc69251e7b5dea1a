//! Package specifiers for dependency injection.
//!
//! A specifier is `name[extras]operator version`, for example `numpy`,
//! `pandas>=2.0`, or `requests[socks]==2.31.0`. Anything outside the grammar
//! (whitespace, quotes, shell metacharacters) is rejected before a process
//! is launched.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use regex::Regex;

use crate::{AppError, Result};

/// Environment variable carrying a comma-separated package list.
///
/// Unset means "use the configured packages"; an empty value means
/// "no packages".
pub const WITH_PACKAGES_ENV: &str = "CODER_WITH_PACKAGES";

const SPEC_PATTERN: &str = concat!(
    r"^(?P<name>[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)",
    r"(?:\[(?P<extras>[A-Za-z0-9_-]+(?:,[A-Za-z0-9_-]+)*)\])?",
    r"(?:(?P<op>===|==|!=|<=|>=|~=|<|>|=|@)(?P<version>[A-Za-z0-9.*+!,_<>=~-]+))?$",
);

fn spec_regex() -> Result<&'static Regex> {
    static SPEC_RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    SPEC_RE
        .get_or_init(|| Regex::new(SPEC_PATTERN))
        .as_ref()
        .map_err(|err| AppError::InvalidPackageSpec(format!("specifier grammar: {err}")))
}

/// One validated dependency specifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageSpec {
    raw: String,
    name: String,
    extras: Vec<String>,
    constraint: Option<(String, String)>,
}

impl PackageSpec {
    /// Parse and validate a specifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidPackageSpec` when `raw` does not match the
    /// specifier grammar.
    pub fn parse(raw: &str) -> Result<Self> {
        let caps = spec_regex()?
            .captures(raw)
            .ok_or_else(|| AppError::InvalidPackageSpec(format!("'{raw}'")))?;

        let name = caps
            .name("name")
            .map(|m| m.as_str().to_owned())
            .ok_or_else(|| AppError::InvalidPackageSpec(format!("'{raw}': missing name")))?;
        let extras = caps
            .name("extras")
            .map(|m| m.as_str().split(',').map(str::to_owned).collect())
            .unwrap_or_default();
        let constraint = match (caps.name("op"), caps.name("version")) {
            (Some(op), Some(version)) => {
                Some((op.as_str().to_owned(), version.as_str().to_owned()))
            }
            _ => None,
        };

        Ok(Self {
            raw: raw.to_owned(),
            name,
            extras,
            constraint,
        })
    }

    /// The specifier exactly as supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Distribution name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested extras, in the order given.
    #[must_use]
    pub fn extras(&self) -> &[String] {
        &self.extras
    }

    /// Version operator and version text, if constrained.
    #[must_use]
    pub fn constraint(&self) -> Option<(&str, &str)> {
        self.constraint
            .as_ref()
            .map(|(op, version)| (op.as_str(), version.as_str()))
    }
}

impl Display for PackageSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Ordered list of specifiers, compared as an unordered set.
///
/// Launch order follows insertion order; equality ignores order and
/// duplicates, so `[a, b]` and `[b, a]` describe the same environment.
#[derive(Debug, Clone, Default)]
pub struct PackageSet {
    specs: Vec<PackageSpec>,
}

impl PackageSet {
    /// An empty set (bare interpreter, no wrapper).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate every specifier, reporting all invalid ones at once.
    ///
    /// Blank entries are ignored so that `"a,,b"` and trailing commas are
    /// tolerated.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidPackageSpec` naming every rejected entry.
    pub fn parse<I, S>(items: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut specs = Vec::new();
        let mut invalid = Vec::new();

        for item in items {
            let trimmed = item.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            match PackageSpec::parse(trimmed) {
                Ok(spec) => {
                    if !specs.contains(&spec) {
                        specs.push(spec);
                    }
                }
                Err(_) => invalid.push(trimmed.to_owned()),
            }
        }

        if invalid.is_empty() {
            Ok(Self { specs })
        } else {
            Err(AppError::InvalidPackageSpec(format!(
                "invalid package specifications: {}. Expected format: 'package' or 'package>=version'",
                invalid.join(", ")
            )))
        }
    }

    /// Parse a comma-separated list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidPackageSpec` naming every rejected entry.
    pub fn parse_csv(raw: &str) -> Result<Self> {
        Self::parse(raw.split(','))
    }

    /// Read the package override from [`WITH_PACKAGES_ENV`].
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidPackageSpec` if the variable holds an
    /// invalid specifier.
    pub fn from_env() -> Result<Option<Self>> {
        match std::env::var(WITH_PACKAGES_ENV) {
            Ok(raw) => Self::parse_csv(&raw).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Whether the set holds no specifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Number of distinct specifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Iterate specifiers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PackageSpec> {
        self.specs.iter()
    }

    /// Raw specifier strings in insertion order.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.as_str().to_owned()).collect()
    }

    /// Comma-joined form, the inverse of [`Self::parse_csv`].
    #[must_use]
    pub fn to_csv(&self) -> String {
        self.to_strings().join(",")
    }

    fn as_set(&self) -> BTreeSet<&str> {
        self.specs.iter().map(PackageSpec::as_str).collect()
    }
}

impl<'a> IntoIterator for &'a PackageSet {
    type Item = &'a PackageSpec;
    type IntoIter = std::slice::Iter<'a, PackageSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

impl PartialEq for PackageSet {
    fn eq(&self, other: &Self) -> bool {
        self.as_set() == other.as_set()
    }
}

impl Eq for PackageSet {}

impl Display for PackageSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_csv())
    }
}
