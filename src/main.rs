//! helpsweep binary entrypoint kept minimal. The pipeline lives in the library.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use helpsweep::args::install::{InstallRequest, handle_install};
use helpsweep::args::metadata::handle_metadata;
use helpsweep::args::reanalyse::{ReanalyseRequest, handle_reanalyse};
use helpsweep::args::wrappers::handle_wrappers;
use helpsweep::args::{Args, Command, determine_log_level};
use helpsweep::config::{Settings, logs_dir};

/// Log line timestamp formatter.
struct SweepTimer;

impl tracing_subscriber::fmt::time::FormatTime for SweepTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        // "YYYY-MM-DD-T HH:MM:SS"
        let ts = chrono::Utc::now().format("%Y-%m-%d-T %H:%M:%S").to_string();
        w.write_str(&ts)
    }
}

/// What: Install the global tracing subscriber.
///
/// Inputs:
/// - `log_file`: Explicit log path, else `~/.config/helpsweep/logs/helpsweep.log`.
/// - `level`: Default filter when `RUST_LOG` is unset.
///
/// Output:
/// - Guard flushing the file writer on drop; `None` for the stderr fallback.
///
/// Details:
/// - Falls back to stderr when the file cannot be opened.
fn init_logging(
    log_file: Option<PathBuf>,
    level: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_path = log_file.unwrap_or_else(|| logs_dir().join("helpsweep.log"));
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level))
    };
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .with_ansi(false)
                .with_writer(non_blocking)
                .with_timer(SweepTimer)
                .init();
            tracing::info!(path = %log_path.display(), "logging initialized");
            Some(guard)
        }
        Err(e) => {
            // Fallback: init stderr logger to avoid blocking startup
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .with_ansi(true)
                .with_writer(std::io::stderr)
                .with_timer(SweepTimer)
                .init();
            tracing::warn!(error = %e, path = %log_path.display(), "failed to open log file; using stderr");
            None
        }
    }
}

/// Dispatch the parsed subcommand.
async fn run(args: Args) -> Result<(), String> {
    let settings = Settings::load(args.config.as_deref());
    match &args.command {
        Command::Metadata {
            test,
            filter_r,
            filter_type,
        } => handle_metadata(*test, *filter_r, filter_type, &settings).await,
        Command::Install {
            metadata,
            out,
            last_meta,
            pool,
            wrapper_root,
        } => {
            let req = InstallRequest {
                metadata,
                out,
                last_meta: last_meta.as_deref(),
                pool,
                wrapper_root: wrapper_root.as_deref(),
            };
            let summary = handle_install(&req, &settings).await?;
            eprintln!("{summary}");
            Ok(())
        }
        Command::Reanalyse {
            dir,
            old_meta,
            new_meta,
            pool,
            wrapper_root,
        } => {
            let req = ReanalyseRequest {
                dir,
                old_meta: old_meta.as_deref(),
                new_meta: new_meta.as_deref(),
                pool,
                wrapper_root: wrapper_root.as_deref(),
            };
            let summary = handle_reanalyse(&req, &settings).await?;
            eprintln!("{summary}");
            Ok(())
        }
        Command::Wrappers {
            command_dir,
            output_dir,
        } => {
            let summary = handle_wrappers(command_dir, output_dir.as_deref(), &settings).await?;
            eprintln!(
                "{} descriptions converted, {} failed, {} files written",
                summary.processed, summary.failed, summary.written
            );
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let level = determine_log_level(&args);
    let _log_guard = init_logging(args.log_file.clone(), &level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "helpsweep starting");
    let code = match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "run aborted");
            eprintln!("helpsweep: {err}");
            ExitCode::FAILURE
        }
    };
    tracing::info!("helpsweep exited");
    code
}
