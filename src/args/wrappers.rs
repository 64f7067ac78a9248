//! `wrappers` subcommand.

use std::path::Path;

use crate::config::Settings;
use crate::wrappers::{WrapperSummary, default_generators, generate_wrappers};

/// What: Convert every stored description under `command_dir` into wrappers.
///
/// Inputs:
/// - `command_dir`: Directory of stored descriptions.
/// - `output_dir`: Wrapper root; `None` writes next to each description.
/// - `settings`: Loaded settings (external formats).
///
/// # Errors
/// - Returns a message when `command_dir` cannot be walked.
pub async fn handle_wrappers(
    command_dir: &Path,
    output_dir: Option<&Path>,
    settings: &Settings,
) -> Result<WrapperSummary, String> {
    let generators = default_generators(settings);
    generate_wrappers(command_dir, output_dir.unwrap_or(command_dir), &generators)
        .await
        .map_err(|e| e.to_string())
}
