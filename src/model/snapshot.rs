//! Batch state snapshots used to compute resume deltas.
//!
//! The on-disk form is a YAML mapping with `aclimatise_version` and
//! `packages` keys. Files written by older tooling carry a `!BaseCampMeta`
//! tag on the root mapping; the tag is accepted and dropped on load.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::unit::{WorkUnit, WorkUnitParseError};

/// Record of which units a batch targets, plus the parser version used.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    /// Version of the help-text parsing engine the snapshot was produced for.
    pub tool_version: String,
    /// Units covered by this snapshot.
    pub units: BTreeSet<WorkUnit>,
}

/// Serialized shape of a snapshot file.
#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    /// Engine version string.
    #[serde(deserialize_with = "version_string")]
    aclimatise_version: String,
    /// `package=version` entries.
    #[serde(default)]
    packages: Vec<String>,
}

/// What: Accept a version written either as a string or as a bare YAML number.
///
/// Details:
/// - Unquoted versions like `3.0` load as floats; they are rendered back to text.
fn version_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_norway::Value::deserialize(deserializer)? {
        serde_norway::Value::String(s) => Ok(s),
        serde_norway::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a version string, got {other:?}"
        ))),
    }
}

/// Failure while reading or writing a snapshot file.
#[derive(Debug)]
pub enum SnapshotError {
    /// The file could not be read or written.
    Io(std::io::Error),
    /// The file is not a valid snapshot document.
    Yaml(serde_norway::Error),
    /// One of the `packages` entries is not `package=version`.
    Unit(WorkUnitParseError),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Yaml(err) => write!(f, "invalid snapshot YAML: {err}"),
            Self::Unit(err) => write!(f, "invalid snapshot entry: {err}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Yaml(err) => Some(err),
            Self::Unit(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_norway::Error> for SnapshotError {
    fn from(value: serde_norway::Error) -> Self {
        Self::Yaml(value)
    }
}

impl From<WorkUnitParseError> for SnapshotError {
    fn from(value: WorkUnitParseError) -> Self {
        Self::Unit(value)
    }
}

impl StateSnapshot {
    /// What: Build a snapshot from a version string and any set of units.
    ///
    /// Inputs:
    /// - `tool_version`: Engine version string.
    /// - `units`: Units to record; duplicates collapse.
    ///
    /// Output:
    /// - New snapshot.
    pub fn new(tool_version: impl Into<String>, units: impl IntoIterator<Item = WorkUnit>) -> Self {
        Self {
            tool_version: tool_version.into(),
            units: units.into_iter().collect(),
        }
    }

    /// What: Parse a snapshot from YAML text.
    ///
    /// Inputs:
    /// - `text`: YAML document.
    ///
    /// Output:
    /// - Parsed snapshot.
    ///
    /// # Errors
    /// - `SnapshotError::Yaml` when the document is not a snapshot mapping.
    /// - `SnapshotError::Unit` when a `packages` entry is malformed.
    pub fn from_yaml_str(text: &str) -> Result<Self, SnapshotError> {
        let (tool_version, entries) = Self::raw_entries(text)?;
        let units = entries
            .iter()
            .map(|entry| entry.parse::<WorkUnit>())
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self {
            tool_version,
            units,
        })
    }

    /// What: Read the engine version and the unparsed `packages` entries.
    ///
    /// Inputs:
    /// - `text`: YAML document.
    ///
    /// Output:
    /// - `(tool_version, entries)` with entries in file order.
    ///
    /// Details:
    /// - Used for target lists, where a malformed entry must fail only
    ///   that entry rather than the whole file.
    ///
    /// # Errors
    /// - `SnapshotError::Yaml` when the document is not a snapshot mapping.
    pub fn raw_entries(text: &str) -> Result<(String, Vec<String>), SnapshotError> {
        let mut value: serde_norway::Value = serde_norway::from_str(text)?;
        if let serde_norway::Value::Tagged(tagged) = value {
            value = tagged.value;
        }
        let file: SnapshotFile = serde_norway::from_value(value)?;
        Ok((file.aclimatise_version, file.packages))
    }

    /// What: Render the snapshot as YAML in the on-disk layout.
    ///
    /// Output:
    /// - YAML text with units sorted.
    ///
    /// # Errors
    /// - `SnapshotError::Yaml` if serialization fails.
    pub fn to_yaml_string(&self) -> Result<String, SnapshotError> {
        let file = SnapshotFile {
            aclimatise_version: self.tool_version.clone(),
            packages: self.units.iter().map(ToString::to_string).collect(),
        };
        Ok(serde_norway::to_string(&file)?)
    }

    /// What: Load a snapshot file from disk.
    ///
    /// Inputs:
    /// - `path`: Snapshot file path.
    ///
    /// Output:
    /// - Parsed snapshot.
    ///
    /// # Errors
    /// - `SnapshotError::Io` when the file cannot be read, otherwise as
    ///   [`StateSnapshot::from_yaml_str`].
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// What: Write the snapshot to disk, replacing any existing file.
    ///
    /// # Errors
    /// - `SnapshotError::Io` or `SnapshotError::Yaml`.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    /// What: Compute the units of this snapshot not covered by `previous`.
    ///
    /// Inputs:
    /// - `previous`: Snapshot of an earlier run, if resuming.
    ///
    /// Output:
    /// - `self.units − previous.units` in sorted order, or every unit when
    ///   `previous` is `None`.
    #[must_use]
    pub fn delta(&self, previous: Option<&Self>) -> Vec<WorkUnit> {
        match previous {
            Some(prev) => self.units.difference(&prev.units).cloned().collect(),
            None => self.units.iter().cloned().collect(),
        }
    }

    /// What: Check whether this snapshot was produced for a strictly newer engine.
    ///
    /// Inputs:
    /// - `other`: Snapshot to compare against.
    ///
    /// Output:
    /// - `true` when `self.tool_version > other.tool_version`.
    #[must_use]
    pub fn is_newer_engine_than(&self, other: &Self) -> bool {
        crate::util::compare_versions(&self.tool_version, &other.tool_version)
            == std::cmp::Ordering::Greater
    }
}
