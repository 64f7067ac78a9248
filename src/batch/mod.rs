//! Batch coordination: resume delta, worker pool and summaries.
//!
//! Pool mode runs `processes` Tokio tasks that pull items from one shared
//! queue. With `max_tasks` set a worker retires after that many items and a
//! fresh one is spawned while work remains. Debug mode runs every item on
//! the calling task, one after another.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

use crate::logging::TaskLog;
use crate::model::{SnapshotError, StateSnapshot, WorkUnit};
use crate::processor::{Processor, Reanalyser, UnitOutcome};

/// Worker pool shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Concurrent workers in pool mode.
    pub processes: usize,
    /// Items per worker before it is replaced; `None` means unlimited.
    pub max_tasks: Option<usize>,
    /// `false` runs everything sequentially on the calling task.
    pub fork: bool,
}

impl PoolConfig {
    /// What: Pool with `processes` workers, defaulting to available parallelism.
    ///
    /// Details:
    /// - Zero values are raised to one.
    #[must_use]
    pub fn new(processes: Option<usize>, max_tasks: Option<usize>, fork: bool) -> Self {
        let processes = processes
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, usize::from))
            .max(1);
        Self {
            processes,
            max_tasks: max_tasks.map(|n| n.max(1)),
            fork,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(None, None, true)
    }
}

/// Totals of one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Items handed to the pool.
    pub total: usize,
    /// Items whose body ran to the end.
    pub completed: usize,
    /// Items skipped as already done or not applicable.
    pub skipped: usize,
    /// Units without binaries.
    pub no_binaries: usize,
    /// Items that failed, including malformed entries.
    pub failed: usize,
    /// Description files written.
    pub written: usize,
    /// Binaries that could not be described.
    pub binary_failures: usize,
    /// Worker tasks spawned, replacements included; zero in debug mode.
    pub workers_spawned: usize,
}

impl BatchSummary {
    /// Fold one outcome into the totals.
    pub fn record(&mut self, outcome: &UnitOutcome) {
        match outcome {
            UnitOutcome::Completed { written, failed } => {
                self.completed += 1;
                self.written += written;
                self.binary_failures += failed;
            }
            UnitOutcome::Skipped => self.skipped += 1,
            UnitOutcome::NoBinaries => self.no_binaries += 1,
            UnitOutcome::Failed(_) => self.failed += 1,
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} items: {} completed ({} files written, {} binaries failed), {} skipped, {} without binaries, {} failed; {} workers spawned",
            self.total,
            self.completed,
            self.written,
            self.binary_failures,
            self.skipped,
            self.no_binaries,
            self.failed,
            self.workers_spawned
        )
    }
}

/// Coordinator-level failure; aborts the run.
#[derive(Debug)]
pub enum BatchError {
    /// The output directory does not exist.
    MissingOutputDir(PathBuf),
    /// A target or snapshot file could not be read.
    Snapshot(PathBuf, SnapshotError),
    /// The reanalysis directory could not be walked.
    Walk(PathBuf, std::io::Error),
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingOutputDir(p) => write!(f, "output directory {} does not exist", p.display()),
            Self::Snapshot(p, e) => write!(f, "{}: {e}", p.display()),
            Self::Walk(p, e) => write!(f, "cannot walk {}: {e}", p.display()),
        }
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MissingOutputDir(_) => None,
            Self::Snapshot(_, e) => Some(e),
            Self::Walk(_, e) => Some(e),
        }
    }
}

/// Outcomes of a pool run, in completion order.
#[derive(Debug, Default)]
pub struct PoolReport {
    /// One outcome per item.
    pub outcomes: Vec<UnitOutcome>,
    /// Worker tasks spawned.
    pub workers_spawned: usize,
}

/// Run `task` once, turning a panic into a failed outcome.
async fn guarded<Fut>(fut: Fut) -> UnitOutcome
where
    Fut: Future<Output = UnitOutcome>,
{
    AssertUnwindSafe(fut)
        .catch_unwind()
        .await
        .unwrap_or_else(|_| UnitOutcome::Failed("task panicked".to_string()))
}

/// Pop the next queued item.
fn next_item<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
}

/// What: One worker: take items until the queue is empty or the quota is used.
///
/// Output:
/// - Outcomes produced by this worker.
async fn worker<T, F, Fut>(
    queue: Arc<Mutex<VecDeque<T>>>,
    task: Arc<F>,
    max_tasks: Option<usize>,
) -> Vec<UnitOutcome>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = UnitOutcome>,
{
    let mut outcomes = Vec::new();
    while max_tasks.is_none_or(|max| outcomes.len() < max) {
        let Some(item) = next_item(&queue) else {
            break;
        };
        outcomes.push(guarded(task(item)).await);
    }
    outcomes
}

/// What: Run `task` over every item with the given pool shape.
///
/// Inputs:
/// - `items`: Work items; order is the queue order.
/// - `pool`: Pool shape.
/// - `task`: Task body; a panic inside it fails only that item.
///
/// Output:
/// - One outcome per item and the number of workers spawned.
///
/// Details:
/// - No ordering is guaranteed across items in pool mode.
pub async fn run_pool<T, F, Fut>(items: Vec<T>, pool: &PoolConfig, task: F) -> PoolReport
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UnitOutcome> + Send + 'static,
{
    let mut report = PoolReport::default();
    if !pool.fork {
        for item in items {
            report.outcomes.push(guarded(task(item)).await);
        }
        return report;
    }

    let initial = pool.processes.min(items.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(items)));
    let task = Arc::new(task);
    let mut running = FuturesUnordered::new();
    for _ in 0..initial {
        running.push(tokio::spawn(worker(
            Arc::clone(&queue),
            Arc::clone(&task),
            pool.max_tasks,
        )));
        report.workers_spawned += 1;
    }
    tracing::debug!(workers = initial, "[Batch] pool started");

    while let Some(joined) = running.next().await {
        match joined {
            Ok(outcomes) => report.outcomes.extend(outcomes),
            Err(e) => tracing::error!(error = %e, "[Batch] worker task failed"),
        }
        let remaining = queue.lock().unwrap_or_else(PoisonError::into_inner).len();
        // Never more workers than queued items, so a replacement always finds work.
        if running.len() < pool.processes.min(remaining) {
            running.push(tokio::spawn(worker(
                Arc::clone(&queue),
                Arc::clone(&task),
                pool.max_tasks,
            )));
            report.workers_spawned += 1;
            tracing::debug!(remaining, "[Batch] replaced retired worker");
        }
    }
    report
}

/// What: Read a target list or snapshot file without failing on bad entries.
///
/// Output:
/// - `(tool_version, raw entries)`.
///
/// # Errors
/// - `BatchError::Snapshot` when the file is unreadable or not a snapshot.
pub fn load_targets(path: &Path) -> Result<(String, Vec<String>), BatchError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| BatchError::Snapshot(path.to_path_buf(), SnapshotError::Io(e)))?;
    StateSnapshot::raw_entries(&text).map_err(|e| BatchError::Snapshot(path.to_path_buf(), e))
}

/// What: Load a snapshot used as resume state or version gate.
///
/// # Errors
/// - `BatchError::Snapshot` when the file is unreadable or malformed.
pub fn load_snapshot(path: &Path) -> Result<StateSnapshot, BatchError> {
    StateSnapshot::load(path).map_err(|e| BatchError::Snapshot(path.to_path_buf(), e))
}

/// Drives a [`Processor`] over a target list.
#[derive(Clone)]
pub struct Coordinator {
    /// Task body.
    processor: Arc<Processor>,
}

impl Coordinator {
    /// What: Coordinator running `processor` per unit.
    #[must_use]
    pub fn new(processor: Processor) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }

    /// What: Process every target not covered by the resume state.
    ///
    /// Inputs:
    /// - `targets`: Raw `name=version` entries.
    /// - `out_dir`: Existing output root.
    /// - `pool`: Pool shape.
    /// - `resume`: Snapshot of a previous run, if resuming.
    /// - `log`: Coordinator log; each unit logs under its own `name=version` source.
    ///
    /// Output:
    /// - Batch totals. Malformed entries are logged and counted as failed.
    ///
    /// # Errors
    /// - `BatchError::MissingOutputDir` when `out_dir` is not a directory.
    pub async fn run(
        &self,
        targets: &[String],
        out_dir: &Path,
        pool: &PoolConfig,
        resume: Option<&StateSnapshot>,
        log: &TaskLog,
    ) -> Result<BatchSummary, BatchError> {
        if !out_dir.is_dir() {
            return Err(BatchError::MissingOutputDir(out_dir.to_path_buf()));
        }
        let mut summary = BatchSummary::default();
        let mut units = BTreeSet::new();
        for raw in targets {
            match raw.parse::<WorkUnit>() {
                Ok(unit) => {
                    units.insert(unit);
                }
                Err(e) => {
                    log.with_source(raw.trim()).error(e.to_string());
                    summary.total += 1;
                    summary.failed += 1;
                }
            }
        }
        let new_count = units.len();
        let to_process: Vec<WorkUnit> = match resume {
            Some(prev) => units.difference(&prev.units).cloned().collect(),
            None => units.into_iter().collect(),
        };
        log.info(format!(
            "There are {} packages in the old metadata and {new_count} in the new. There are {} to process.",
            resume.map_or_else(|| "?".to_string(), |p| p.units.len().to_string()),
            to_process.len()
        ));
        if pool.fork {
            log.info(format!("Running {} workers", pool.processes));
        }

        let processor = Arc::clone(&self.processor);
        let out_dir = out_dir.to_path_buf();
        let root = log.clone();
        let report = run_pool(to_process, pool, move |unit: WorkUnit| {
            let processor = Arc::clone(&processor);
            let out_dir = out_dir.clone();
            let log = root.with_source(unit.to_string());
            async move { processor.process(&unit, &out_dir, &log).await }
        })
        .await;

        summary.total += report.outcomes.len();
        summary.workers_spawned = report.workers_spawned;
        for outcome in &report.outcomes {
            summary.record(outcome);
        }
        log.info(format!("Finished: {summary}"));
        Ok(summary)
    }
}

/// What: Reanalyse every stored description under `dir`.
///
/// Inputs:
/// - `dir`: Root of stored descriptions.
/// - `reanalyser`: Task body.
/// - `pool`: Pool shape.
/// - `gate`: `(old, new)` snapshots; when given and `new` is not for a
///   strictly newer engine, nothing is done.
/// - `log`: Coordinator log; each file logs under its own path.
///
/// Output:
/// - Batch totals (all zero when gated).
///
/// # Errors
/// - `BatchError::Walk` when `dir` cannot be listed.
pub async fn reanalyse(
    dir: &Path,
    reanalyser: Reanalyser,
    pool: &PoolConfig,
    gate: Option<(&StateSnapshot, &StateSnapshot)>,
    log: &TaskLog,
) -> Result<BatchSummary, BatchError> {
    if let Some((old, new)) = gate
        && !new.is_newer_engine_than(old)
    {
        log.warn(format!(
            "The previous analysis was done using aclimatise=={}, while the new metadata is for an older or equal version: {}. Skipping.",
            old.tool_version, new.tool_version
        ));
        return Ok(BatchSummary::default());
    }
    let files = crate::wrappers::find_descriptions(dir)
        .map_err(|e| BatchError::Walk(dir.to_path_buf(), e))?;
    log.info(format!("{} descriptions to reanalyse", files.len()));

    let reanalyser = Arc::new(reanalyser);
    let root = log.clone();
    let report = run_pool(files, pool, move |path: PathBuf| {
        let reanalyser = Arc::clone(&reanalyser);
        let log = root.with_source(path.display().to_string());
        async move { reanalyser.process(&path, &log).await }
    })
    .await;

    let mut summary = BatchSummary {
        total: report.outcomes.len(),
        workers_spawned: report.workers_spawned,
        ..BatchSummary::default()
    };
    for outcome in &report.outcomes {
        summary.record(outcome);
    }
    log.info(format!("Finished: {summary}"));
    Ok(summary)
}
