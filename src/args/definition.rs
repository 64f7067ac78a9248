//! Command-line argument definition.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// helpsweep - describe the command line of every binary in a package registry
#[derive(Parser, Debug)]
#[command(name = "helpsweep")]
#[command(version)]
#[command(about = "Install packages in throwaway containers and store parsed descriptions of their binaries", long_about = None)]
pub struct Args {
    /// Write the log to this file instead of ~/.config/helpsweep/logs/helpsweep.log
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Set the logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output (equivalent to --log-level debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read settings from this file instead of ~/.config/helpsweep/settings.conf
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Action to run
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a snapshot of the latest registry tools as YAML
    Metadata {
        /// Only list a single known package
        #[arg(long)]
        test: bool,

        /// Skip R and Bioconductor packages
        #[arg(long)]
        filter_r: bool,

        /// Keep only tools of this class (repeatable); empty keeps all
        #[arg(long = "filter-type")]
        filter_type: Vec<String>,
    },

    /// Install every package in a snapshot and describe its binaries
    Install {
        /// Snapshot listing the packages to process
        metadata: PathBuf,

        /// Output directory (must exist)
        out: PathBuf,

        /// Snapshot of a previous run; its packages are skipped
        #[arg(long)]
        last_meta: Option<PathBuf>,

        /// Pool options
        #[command(flatten)]
        pool: PoolArgs,

        /// Also write wrappers under this directory
        #[arg(long)]
        wrapper_root: Option<PathBuf>,
    },

    /// Re-parse stored descriptions with the current parser
    Reanalyse {
        /// Directory of stored descriptions
        dir: PathBuf,

        /// Snapshot of the previous analysis (with --new-meta enables the version check)
        #[arg(long)]
        old_meta: Option<PathBuf>,

        /// Snapshot for the current parser version
        #[arg(long)]
        new_meta: Option<PathBuf>,

        /// Pool options
        #[command(flatten)]
        pool: PoolArgs,

        /// Also regenerate wrappers under this directory
        #[arg(long)]
        wrapper_root: Option<PathBuf>,
    },

    /// Convert stored descriptions into wrapper files
    Wrappers {
        /// Directory of stored descriptions
        command_dir: PathBuf,

        /// Output directory; defaults to writing next to each description
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

/// Worker pool flags shared by `install` and `reanalyse`.
#[derive(ClapArgs, Debug, Clone, Copy, Default)]
pub struct PoolArgs {
    /// Number of concurrent workers (default: settings, then CPU count)
    #[arg(short, long)]
    pub processes: Option<usize>,

    /// Run units one at a time on the main task
    #[arg(long)]
    pub debug: bool,

    /// Replace each worker after this many units
    #[arg(short, long)]
    pub max_tasks: Option<usize>,
}
