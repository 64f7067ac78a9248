//! `metadata` subcommand.

use crate::config::Settings;
use crate::metadata::calculate_metadata;
use crate::registry::RegistryClient;

/// What: Print a snapshot of the latest registry tools to stdout.
///
/// Inputs:
/// - `test`: Use the fixed test package list.
/// - `filter_r`: Skip R and Bioconductor packages.
/// - `filter_types`: Tool classes to keep.
/// - `settings`: Loaded settings (endpoints, engine package).
///
/// # Errors
/// - Returns a message when the registry cannot be queried.
pub async fn handle_metadata(
    test: bool,
    filter_r: bool,
    filter_types: &[String],
    settings: &Settings,
) -> Result<(), String> {
    let client = RegistryClient::new(&settings.registry_url, &settings.pypi_url);
    let snapshot = calculate_metadata(&client, &settings.engine_package, test, filter_r, filter_types)
        .await
        .map_err(|e| e.to_string())?;
    let text = snapshot.to_yaml_string().map_err(|e| e.to_string())?;
    print!("{text}");
    Ok(())
}
