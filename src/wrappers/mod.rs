//! Wrapper file generation from stored command descriptions.
//!
//! Each generator writes one file per leaf command. The registry is a plain
//! `Vec<Box<dyn WrapperGenerator>>` assembled from settings at startup.

use std::fmt;
use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::command::{CommandError, run_checked};
use crate::config::Settings;
use crate::model::CommandDescription;

/// Placeholder in the converter template replaced by the format name.
pub const FORMAT_PLACEHOLDER: &str = "{format}";

/// Failure while producing a wrapper file.
#[derive(Debug)]
pub enum WrapperError {
    /// Reading or writing a file failed.
    Io(std::io::Error),
    /// The description could not be serialized.
    Serialize(String),
    /// The external converter failed.
    Converter(CommandError),
    /// The input description could not be loaded.
    Load(String),
}

impl fmt::Display for WrapperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Serialize(msg) => write!(f, "serialization failed: {msg}"),
            Self::Converter(e) => write!(f, "converter failed: {e}"),
            Self::Load(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for WrapperError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Converter(e) => Some(e),
            Self::Serialize(_) | Self::Load(_) => None,
        }
    }
}

impl From<std::io::Error> for WrapperError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<CommandError> for WrapperError {
    fn from(value: CommandError) -> Self {
        Self::Converter(value)
    }
}

/// What: One output format for wrapper files.
pub trait WrapperGenerator: Send + Sync {
    /// File suffix including the dot, e.g. `.cwl`.
    fn suffix(&self) -> String;

    /// Write `description` to `path`.
    fn write<'a>(
        &'a self,
        description: &'a CommandDescription,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<(), WrapperError>>;
}

/// Writes the detached description as YAML.
#[derive(Clone, Copy, Debug, Default)]
pub struct YmlGenerator;

impl WrapperGenerator for YmlGenerator {
    fn suffix(&self) -> String {
        ".yml".to_string()
    }

    fn write<'a>(
        &'a self,
        description: &'a CommandDescription,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<(), WrapperError>> {
        async move {
            let text = description
                .to_yaml_string()
                .map_err(|e| WrapperError::Serialize(e.to_string()))?;
            tokio::fs::write(path, text).await?;
            Ok(())
        }
        .boxed()
    }
}

/// Writes the detached description as pretty JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonGenerator;

impl WrapperGenerator for JsonGenerator {
    fn suffix(&self) -> String {
        ".json".to_string()
    }

    fn write<'a>(
        &'a self,
        description: &'a CommandDescription,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<(), WrapperError>> {
        async move {
            let text = serde_json::to_string_pretty(description.value())
                .map_err(|e| WrapperError::Serialize(e.to_string()))?;
            tokio::fs::write(path, text).await?;
            Ok(())
        }
        .boxed()
    }
}

/// Pipes the YAML description through an external converter.
#[derive(Clone, Debug)]
pub struct ExternalGenerator {
    /// Format name, also the file suffix.
    format: String,
    /// Program and arguments with `{format}` expanded.
    argv: Vec<String>,
}

impl ExternalGenerator {
    /// What: Generator for `format` using the converter `template`.
    ///
    /// Output:
    /// - `None` when `template` is empty.
    #[must_use]
    pub fn new(format: &str, template: &[String]) -> Option<Self> {
        if template.is_empty() {
            return None;
        }
        let argv = template
            .iter()
            .map(|arg| arg.replace(FORMAT_PLACEHOLDER, format))
            .collect();
        Some(Self {
            format: format.to_string(),
            argv,
        })
    }
}

impl WrapperGenerator for ExternalGenerator {
    fn suffix(&self) -> String {
        format!(".{}", self.format)
    }

    fn write<'a>(
        &'a self,
        description: &'a CommandDescription,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<(), WrapperError>> {
        async move {
            let yaml = description
                .to_yaml_string()
                .map_err(|e| WrapperError::Serialize(e.to_string()))?;
            let (program, args) = self
                .argv
                .split_first()
                .ok_or_else(|| WrapperError::Serialize("converter command is empty".into()))?;
            let out = run_checked(program, args, Some(yaml.as_bytes())).await?;
            tokio::fs::write(path, out).await?;
            Ok(())
        }
        .boxed()
    }
}

/// What: Build the generator registry from settings.
///
/// Output:
/// - YAML and JSON generators, then one external generator per
///   `wrapper_formats` entry when a converter command is configured.
///
/// Details:
/// - Formats configured without a converter are skipped with a warning.
#[must_use]
pub fn default_generators(settings: &Settings) -> Vec<Box<dyn WrapperGenerator>> {
    let mut out: Vec<Box<dyn WrapperGenerator>> = vec![Box::new(YmlGenerator), Box::new(JsonGenerator)];
    for format in &settings.wrapper_formats {
        match ExternalGenerator::new(format, &settings.converter_command) {
            Some(g) => out.push(Box::new(g)),
            None => tracing::warn!(format = %format, "[Wrappers] no converter_command set, skipping format"),
        }
    }
    out
}

/// What: Write wrappers for every leaf command of `description`.
///
/// Inputs:
/// - `description`: Command tree.
/// - `output_dir`: Directory receiving the files; created if missing.
/// - `generators`: Registry to run.
/// - `fallback`: Filename stem when a leaf has no command words.
///
/// Output:
/// - Paths written.
///
/// # Errors
/// - First failure; files written before it remain.
pub async fn wrapper_from_command(
    description: &CommandDescription,
    output_dir: &Path,
    generators: &[Box<dyn WrapperGenerator>],
    fallback: &str,
) -> Result<Vec<PathBuf>, WrapperError> {
    tokio::fs::create_dir_all(output_dir).await?;
    let mut written = Vec::new();
    for leaf in description.leaf_commands() {
        let detached = leaf.detached();
        let stem = detached.as_filename(fallback);
        for generator in generators {
            let path = output_dir.join(format!("{stem}{}", generator.suffix()));
            generator.write(&detached, &path).await?;
            written.push(path);
        }
    }
    Ok(written)
}

/// Totals of a wrapper pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WrapperSummary {
    /// Description files processed successfully.
    pub processed: usize,
    /// Description files that failed.
    pub failed: usize,
    /// Wrapper files written.
    pub written: usize,
}

/// What: Collect every `*.yml` file under `dir`, sorted.
///
/// # Errors
/// - I/O error when a directory cannot be listed.
pub fn find_descriptions(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|e| e == "yml") {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// What: Generate wrappers for a whole directory of descriptions.
///
/// Inputs:
/// - `command_dir`: Root of stored descriptions.
/// - `output_dir`: Root for wrappers; the relative layout is mirrored.
/// - `generators`: Registry to run.
///
/// Output:
/// - Summary of the pass.
///
/// # Errors
/// - I/O error when `command_dir` cannot be walked. Per-file failures are
///   logged and counted instead.
pub async fn generate_wrappers(
    command_dir: &Path,
    output_dir: &Path,
    generators: &[Box<dyn WrapperGenerator>],
) -> Result<WrapperSummary, WrapperError> {
    let mut summary = WrapperSummary::default();
    for path in find_descriptions(command_dir)? {
        let relative_dir = path
            .parent()
            .and_then(|p| p.strip_prefix(command_dir).ok())
            .unwrap_or_else(|| Path::new(""));
        let target = output_dir.join(relative_dir);
        let fallback = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = match CommandDescription::load(&path) {
            Ok(description) => {
                wrapper_from_command(&description, &target, generators, &fallback).await
            }
            Err(msg) => Err(WrapperError::Load(msg)),
        };
        match result {
            Ok(files) => {
                summary.processed += 1;
                summary.written += files.len();
                tracing::debug!(file = %path.display(), written = files.len(), "[Wrappers] done");
            }
            Err(e) => {
                summary.failed += 1;
                tracing::error!(file = %path.display(), error = %e, "[Wrappers] failed");
            }
        }
    }
    Ok(summary)
}
