//! Shared utilities for argument processing.

use crate::batch::PoolConfig;
use crate::config::Settings;

use super::definition::{Args, PoolArgs};

/// What: Determine the log level based on command-line arguments and environment variables.
///
/// Inputs:
/// - `args`: Parsed command-line arguments.
///
/// Output:
/// - Log level string (trace, debug, info, warn, error).
///
/// Details:
/// - Verbose flag overrides `log_level` argument.
/// - `HELPSWEEP_TRACE=1` enables TRACE level.
#[must_use]
pub fn determine_log_level(args: &Args) -> String {
    if args.verbose {
        "debug".to_string()
    } else if std::env::var("HELPSWEEP_TRACE").ok().as_deref() == Some("1") {
        "trace".to_string()
    } else {
        args.log_level.clone()
    }
}

/// What: Combine pool flags with settings.
///
/// Inputs:
/// - `flags`: Command-line pool flags.
/// - `settings`: Loaded settings.
///
/// Output:
/// - Pool configuration; flags win over settings.
#[must_use]
pub fn pool_config(flags: &PoolArgs, settings: &Settings) -> PoolConfig {
    PoolConfig::new(
        flags.processes.or(settings.processes),
        flags.max_tasks.or(settings.max_tasks),
        !flags.debug,
    )
}
