//! `install` subcommand.

use std::path::Path;
use std::sync::Arc;

use crate::batch::{BatchSummary, Coordinator, load_snapshot, load_targets};
use crate::config::Settings;
use crate::introspect::{ExternalHelpParser, HelpCaptureIntrospector};
use crate::isolation::{DockerCli, NamedLock, PULL_LOCK_NAME, Provisioner};
use crate::processor::{Processor, Timeouts, WrapperTarget};
use crate::registry::RegistryClient;
use crate::wrappers::default_generators;

use super::{PoolArgs, command_on_path, pool_config, start_aggregator};

/// Inputs of the `install` subcommand.
pub struct InstallRequest<'a> {
    /// Snapshot of the packages to process.
    pub metadata: &'a Path,
    /// Output root.
    pub out: &'a Path,
    /// Snapshot of a previous run.
    pub last_meta: Option<&'a Path>,
    /// Pool flags.
    pub pool: &'a PoolArgs,
    /// Wrapper output root.
    pub wrapper_root: Option<&'a Path>,
}

/// What: Run the install pipeline over a snapshot.
///
/// Inputs:
/// - `req`: Parsed subcommand arguments.
/// - `settings`: Loaded settings.
///
/// Output:
/// - Batch totals.
///
/// # Errors
/// - Returns a message when the container client is missing, a snapshot
///   cannot be read, or the output directory does not exist. Unit failures
///   are not errors.
pub async fn handle_install(req: &InstallRequest<'_>, settings: &Settings) -> Result<BatchSummary, String> {
    if !command_on_path(&settings.docker_binary) {
        return Err(format!("{} was not found on PATH", settings.docker_binary));
    }
    let (_, targets) = load_targets(req.metadata).map_err(|e| e.to_string())?;
    let resume = req
        .last_meta
        .map(load_snapshot)
        .transpose()
        .map_err(|e| e.to_string())?;

    let platform = Arc::new(DockerCli::new(settings.docker_binary.clone()));
    let provisioner = Provisioner::new(platform, Arc::new(NamedLock::new(PULL_LOCK_NAME)));
    let registry = Arc::new(RegistryClient::new(&settings.registry_url, &settings.pypi_url));
    let parser = Arc::new(ExternalHelpParser::new(settings.parser_command.clone()));
    let introspector = Arc::new(HelpCaptureIntrospector::new(parser));
    let mut processor = Processor::new(
        provisioner,
        registry,
        introspector,
        Timeouts::from_settings(settings),
        settings.conda_prefix.clone(),
    );
    if let Some(root) = req.wrapper_root {
        processor = processor.with_wrappers(WrapperTarget {
            root: root.to_path_buf(),
            generators: Arc::new(default_generators(settings)),
        });
    }

    let pool = pool_config(req.pool, settings);
    let aggregator = start_aggregator();
    let log = aggregator.handle("install");
    let result = Coordinator::new(processor)
        .run(&targets, req.out, &pool, resume.as_ref(), &log)
        .await;
    drop(log);
    let delivered = aggregator.shutdown().await;
    tracing::debug!(records = delivered, "[Install] log aggregator drained");
    result.map_err(|e| e.to_string())
}
