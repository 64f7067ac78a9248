//! Opaque CLI descriptions produced by the help-text parsing engine.
//!
//! Only the `command`, `help_text` and `subcommands` keys are read; every
//! other key is carried through untouched. Engine output may tag mappings
//! (e.g. `!Command`), so lookups see through tags and writes keep them.

use std::path::Path;

use serde_norway::{Mapping, Value};

/// Structured description of one command's CLI surface.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandDescription(Value);

/// What: Strip any number of YAML tags from a value.
fn untagged(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untagged(&tagged.value),
        other => other,
    }
}

/// What: Mutable counterpart of [`untagged`].
fn untagged_mut(value: &mut Value) -> &mut Value {
    match value {
        Value::Tagged(tagged) => untagged_mut(&mut tagged.value),
        other => other,
    }
}

impl CommandDescription {
    /// Wrap a parsed YAML value.
    #[must_use]
    pub const fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying YAML value.
    #[must_use]
    pub const fn value(&self) -> &Value {
        &self.0
    }

    /// What: Parse engine output.
    ///
    /// # Errors
    /// - Returns the YAML error when `text` is not a YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_norway::Error> {
        serde_norway::from_str(text).map(Self)
    }

    /// What: Render the description as YAML.
    ///
    /// # Errors
    /// - Returns the YAML error when serialization fails.
    pub fn to_yaml_string(&self) -> Result<String, serde_norway::Error> {
        serde_norway::to_string(&self.0)
    }

    /// What: Read a stored description.
    ///
    /// # Errors
    /// - Returns a message when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_yaml_str(&text).map_err(|e| format!("failed to parse {}: {e}", path.display()))
    }

    /// What: Write the description to `path`, replacing any existing file.
    ///
    /// # Errors
    /// - Returns a message when serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let text = self
            .to_yaml_string()
            .map_err(|e| format!("failed to serialize description: {e}"))?;
        std::fs::write(path, text).map_err(|e| format!("failed to write {}: {e}", path.display()))
    }

    /// Root mapping of the description, if it is a mapping.
    fn mapping(&self) -> Option<&Mapping> {
        untagged(&self.0).as_mapping()
    }

    /// What: Command words, e.g. `["samtools", "index"]`.
    ///
    /// Output:
    /// - The string entries of the `command` list; empty when absent.
    #[must_use]
    pub fn command(&self) -> Vec<String> {
        self.mapping()
            .and_then(|m| m.get("command"))
            .map(untagged)
            .and_then(Value::as_sequence)
            .map(|seq| {
                seq.iter()
                    .filter_map(|v| untagged(v).as_str().map(ToOwned::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Captured raw help text, if the engine stored any.
    #[must_use]
    pub fn help_text(&self) -> Option<&str> {
        self.mapping()
            .and_then(|m| m.get("help_text"))
            .map(untagged)
            .and_then(Value::as_str)
    }

    /// What: Check for usable help text.
    ///
    /// Output:
    /// - `true` when `help_text` is present and not only whitespace.
    #[must_use]
    pub fn has_help_text(&self) -> bool {
        self.help_text().is_some_and(|t| !t.trim().is_empty())
    }

    /// What: Record `text` as the help text unless the engine already stored one.
    ///
    /// Details:
    /// - Has no effect when the root is not a mapping.
    pub fn fill_help_text(&mut self, text: &str) {
        if let Some(map) = untagged_mut(&mut self.0).as_mapping_mut()
            && !map.contains_key("help_text")
        {
            map.insert(Value::from("help_text"), Value::from(text));
        }
    }

    /// Direct sub-commands of this command.
    #[must_use]
    pub fn subcommands(&self) -> Vec<Self> {
        self.mapping()
            .and_then(|m| m.get("subcommands"))
            .map(untagged)
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().cloned().map(Self).collect())
            .unwrap_or_default()
    }

    /// `true` when the command has at least one sub-command.
    #[must_use]
    pub fn has_subcommands(&self) -> bool {
        self.mapping()
            .and_then(|m| m.get("subcommands"))
            .map(untagged)
            .and_then(Value::as_sequence)
            .is_some_and(|seq| !seq.is_empty())
    }

    /// What: Deterministic file stem for this command.
    ///
    /// Inputs:
    /// - `fallback`: Used when the description has no command words
    ///   (normally the binary name).
    ///
    /// Output:
    /// - Command words joined with `_`, e.g. `samtools_index`.
    #[must_use]
    pub fn as_filename(&self, fallback: &str) -> String {
        let words = self.command();
        if words.is_empty() {
            fallback.to_string()
        } else {
            words.join("_")
        }
    }

    /// What: Copy of this command cut loose from its tree.
    ///
    /// Output:
    /// - Same description with `parent` set to null and `subcommands` emptied.
    #[must_use]
    pub fn detached(&self) -> Self {
        let mut value = self.0.clone();
        if let Some(map) = untagged_mut(&mut value).as_mapping_mut() {
            if map.contains_key("parent") {
                map.insert(Value::from("parent"), Value::Null);
            }
            if map.contains_key("subcommands") {
                map.insert(Value::from("subcommands"), Value::Sequence(Vec::new()));
            }
        }
        Self(value)
    }

    /// What: Collect every leaf command of the tree rooted here.
    ///
    /// Output:
    /// - Commands without sub-commands, depth first; the root itself when it
    ///   is a leaf.
    #[must_use]
    pub fn leaf_commands(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(cmd) = stack.pop() {
            let children = cmd.subcommands();
            if children.is_empty() {
                out.push(cmd);
            } else {
                stack.extend(children.into_iter().rev());
            }
        }
        out
    }
}
