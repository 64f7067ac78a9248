//! `reanalyse` subcommand.

use std::path::Path;
use std::sync::Arc;

use crate::batch::{BatchSummary, load_snapshot, reanalyse};
use crate::config::Settings;
use crate::introspect::ExternalHelpParser;
use crate::processor::{Reanalyser, WrapperTarget};
use crate::wrappers::default_generators;

use super::{PoolArgs, pool_config, start_aggregator};

/// Inputs of the `reanalyse` subcommand.
pub struct ReanalyseRequest<'a> {
    /// Directory of stored descriptions.
    pub dir: &'a Path,
    /// Snapshot of the previous analysis.
    pub old_meta: Option<&'a Path>,
    /// Snapshot for the current parser.
    pub new_meta: Option<&'a Path>,
    /// Pool flags.
    pub pool: &'a PoolArgs,
    /// Wrapper output root.
    pub wrapper_root: Option<&'a Path>,
}

/// What: Re-parse every stored description under a directory.
///
/// Output:
/// - Batch totals; all zero when the version check skips the run.
///
/// # Errors
/// - Returns a message when a snapshot cannot be read or the directory
///   cannot be walked.
///
/// Details:
/// - The version check applies only when both snapshots are given.
pub async fn handle_reanalyse(
    req: &ReanalyseRequest<'_>,
    settings: &Settings,
) -> Result<BatchSummary, String> {
    let gate = match (req.old_meta, req.new_meta) {
        (Some(old), Some(new)) => Some((
            load_snapshot(old).map_err(|e| e.to_string())?,
            load_snapshot(new).map_err(|e| e.to_string())?,
        )),
        _ => None,
    };
    let parser = Arc::new(ExternalHelpParser::new(settings.parser_command.clone()));
    let mut reanalyser = Reanalyser::new(parser, req.dir);
    if let Some(root) = req.wrapper_root {
        reanalyser = reanalyser.with_wrappers(WrapperTarget {
            root: root.to_path_buf(),
            generators: Arc::new(default_generators(settings)),
        });
    }

    let pool = pool_config(req.pool, settings);
    let aggregator = start_aggregator();
    let log = aggregator.handle("reanalyse");
    let result = reanalyse(
        req.dir,
        reanalyser,
        &pool,
        gate.as_ref().map(|(old, new)| (old, new)),
        &log,
    )
    .await;
    drop(log);
    aggregator.shutdown().await;
    result.map_err(|e| e.to_string())
}
