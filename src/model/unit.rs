//! Work units (`package=version`) and discovered binary names.

use std::fmt;
use std::str::FromStr;

/// One package at one version, the unit of work of a batch.
///
/// Ordered by name then version so sets of units diff deterministically.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkUnit {
    /// Package name as published in the registry.
    pub name: String,
    /// Exact package version.
    pub version: String,
}

impl WorkUnit {
    /// What: Build a unit from its two parts.
    ///
    /// Inputs:
    /// - `name`: Package name.
    /// - `version`: Package version.
    ///
    /// Output:
    /// - New `WorkUnit`.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// What: Build a unit, rejecting parts that are unsafe as path segments
    /// or inside a shell script.
    ///
    /// Details:
    /// - Names use `[A-Za-z0-9._+-]`; versions additionally allow `!` (epochs).
    /// - `.`, `..` and anything containing `..` are rejected.
    ///
    /// # Errors
    /// - `WorkUnitParseError` naming the offending part.
    pub fn try_new(name: &str, version: &str) -> Result<Self, WorkUnitParseError> {
        let input = format!("{name}={version}");
        check_part(name, "name", false).map_err(|reason| WorkUnitParseError {
            input: input.clone(),
            reason,
        })?;
        check_part(version, "version", true)
            .map_err(|reason| WorkUnitParseError { input, reason })?;
        Ok(Self::new(name, version))
    }
}

/// Reason `part` cannot be used, if any.
fn check_part(part: &str, what: &'static str, allow_epoch: bool) -> Result<(), String> {
    if part.is_empty() {
        return Err(format!("empty {what}"));
    }
    if part.contains("..") || part == "." {
        return Err(format!("{what} may not contain '..' or be '.'"));
    }
    let allowed = |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-') || (allow_epoch && c == '!')
    };
    match part.chars().find(|c| !allowed(*c)) {
        Some(c) => Err(format!("{what} contains disallowed character {c:?}")),
        None => Ok(()),
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.version)
    }
}

/// Error raised when a `package=version` string is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnitParseError {
    /// The offending input, trimmed.
    pub input: String,
    /// What is wrong with it.
    pub reason: String,
}

impl fmt::Display for WorkUnitParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed work unit {:?}: {}", self.input, self.reason)
    }
}

impl std::error::Error for WorkUnitParseError {}

impl FromStr for WorkUnit {
    type Err = WorkUnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || WorkUnitParseError {
            input: trimmed.to_string(),
            reason: "expected exactly one '=' between a package name and a version".to_string(),
        };
        let mut parts = trimmed.split('=');
        let name = parts.next().ok_or_else(err)?.trim();
        let version = parts.next().ok_or_else(err)?.trim();
        if parts.next().is_some() {
            return Err(err());
        }
        Self::try_new(name, version)
    }
}

/// Relative executable name discovered inside a provisioned environment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinaryDescriptor(pub String);

impl BinaryDescriptor {
    /// Executable name as it would be typed on the command line.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BinaryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
