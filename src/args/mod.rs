//! Command-line argument parsing and subcommand handlers.

pub mod definition;
pub mod install;
pub mod metadata;
pub mod reanalyse;
pub mod utils;
pub mod wrappers;

pub use definition::{Args, Command, PoolArgs};
pub use utils::{determine_log_level, pool_config};

use crate::logging::{LogAggregator, TracingSink};

/// What: Start the run-wide log aggregator feeding the tracing subscriber.
fn start_aggregator() -> LogAggregator {
    LogAggregator::start(TracingSink)
}

/// What: Check that an executable is reachable through `PATH`.
fn command_on_path(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}
