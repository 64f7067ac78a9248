//! Building a fresh [`StateSnapshot`] from the registry.

use crate::model::{StateSnapshot, WorkUnit};
use crate::registry::{RegistryClient, RegistryError};

/// Units used by `--test` runs.
#[must_use]
pub fn test_units() -> Vec<WorkUnit> {
    vec![WorkUnit::new("bwa", "0.7.17")]
}

/// What: Snapshot of the latest version of every selected registry tool.
///
/// Inputs:
/// - `client`: Registry client.
/// - `engine_package`: PyPI name of the parsing engine.
/// - `test`: Use [`test_units`] instead of the tool listing.
/// - `filter_r`: Drop R and Bioconductor packages.
/// - `filter_types`: Tool classes to keep; empty keeps all.
///
/// Output:
/// - Snapshot stamped with the engine's current release.
///
/// # Errors
/// - `RegistryError` when either query fails.
pub async fn calculate_metadata(
    client: &RegistryClient,
    engine_package: &str,
    test: bool,
    filter_r: bool,
    filter_types: &[String],
) -> Result<StateSnapshot, RegistryError> {
    let units = if test {
        test_units()
    } else {
        client.latest_tools(filter_r, filter_types).await?
    };
    tracing::info!(units = units.len(), "[Metadata] selected tools");
    let version = client.latest_engine_version(engine_package).await?;
    Ok(StateSnapshot::new(version, units))
}
