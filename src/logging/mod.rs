//! Log aggregation for concurrent workers.
//!
//! Workers never write to the log destination themselves. Each task gets a
//! [`TaskLog`] handle carrying its source id and a sender into one queue; a
//! single consumer task drains that queue into a [`LogSink`]. Records from
//! different workers interleave at record granularity only, never inside a
//! record.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Severity of a [`LogRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress.
    Info,
    /// Something was skipped or degraded.
    Warn,
    /// A unit or binary failed.
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// One structured log line produced by a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Task that produced the record (usually `package=version` or a file path).
    pub source_id: String,
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// Time the worker emitted the record.
    pub timestamp: DateTime<Utc>,
}

/// Destination for aggregated records.
///
/// Only the aggregator's consumer task calls `write`, so implementations need
/// no internal synchronization of their own.
pub trait LogSink: Send + 'static {
    /// Deliver one record.
    fn write(&mut self, record: &LogRecord);
}

/// Sink that re-emits records as `tracing` events tagged with their source.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&mut self, record: &LogRecord) {
        let emitted = record.timestamp.format("%H:%M:%S%.3f").to_string();
        match record.level {
            LogLevel::Debug => {
                tracing::debug!(source = %record.source_id, emitted = %emitted, "{}", record.message);
            }
            LogLevel::Info => {
                tracing::info!(source = %record.source_id, emitted = %emitted, "{}", record.message);
            }
            LogLevel::Warn => {
                tracing::warn!(source = %record.source_id, emitted = %emitted, "{}", record.message);
            }
            LogLevel::Error => {
                tracing::error!(source = %record.source_id, emitted = %emitted, "{}", record.message);
            }
        }
    }
}

/// Sink that keeps every record in memory; cloning shares the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    /// Shared record buffer.
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    /// What: Snapshot of the records received so far.
    ///
    /// Output:
    /// - Records in arrival order; empty if the buffer lock is poisoned.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// What: Records for one source at or above `level`.
    #[must_use]
    pub fn records_for(&self, source_id: &str, level: LogLevel) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.source_id == source_id && r.level >= level)
            .collect()
    }
}

impl LogSink for MemorySink {
    fn write(&mut self, record: &LogRecord) {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(record.clone());
        }
    }
}

/// Sink that forwards every record to two sinks in turn.
pub struct TeeSink<A, B>(pub A, pub B);

impl<A: LogSink, B: LogSink> LogSink for TeeSink<A, B> {
    fn write(&mut self, record: &LogRecord) {
        self.0.write(record);
        self.1.write(record);
    }
}

/// Single-consumer log queue shared by every worker of a run.
pub struct LogAggregator {
    /// Ingress side, cloned into every [`TaskLog`].
    tx: mpsc::UnboundedSender<LogRecord>,
    /// Consumer task; resolves to the number of records delivered.
    consumer: JoinHandle<usize>,
}

impl LogAggregator {
    /// What: Start the consumer task draining into `sink`.
    ///
    /// Inputs:
    /// - `sink`: Destination for every record.
    ///
    /// Output:
    /// - Running aggregator.
    ///
    /// Details:
    /// - Must be called inside a Tokio runtime.
    pub fn start<S: LogSink>(mut sink: S) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogRecord>();
        let consumer = tokio::spawn(async move {
            let mut delivered = 0usize;
            while let Some(record) = rx.recv().await {
                sink.write(&record);
                delivered += 1;
            }
            delivered
        });
        Self { tx, consumer }
    }

    /// What: Create a logging handle for one task.
    ///
    /// Inputs:
    /// - `source_id`: Identifier stamped on every record from the handle.
    ///
    /// Output:
    /// - Cheap, cloneable [`TaskLog`].
    #[must_use]
    pub fn handle(&self, source_id: impl Into<String>) -> TaskLog {
        TaskLog {
            source_id: Arc::from(source_id.into()),
            tx: self.tx.clone(),
        }
    }

    /// What: Stop accepting records and wait for the queue to drain.
    ///
    /// Output:
    /// - Total number of records delivered to the sink.
    ///
    /// Details:
    /// - Completes once every outstanding [`TaskLog`] has been dropped; callers
    ///   drop their handles before shutting down.
    pub async fn shutdown(self) -> usize {
        drop(self.tx);
        match self.consumer.await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(error = %e, "log consumer task failed");
                0
            }
        }
    }
}

/// Per-task logging handle threaded into every unit of work.
#[derive(Clone)]
pub struct TaskLog {
    /// Source id stamped on records.
    source_id: Arc<str>,
    /// Sender into the aggregator queue.
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl fmt::Debug for TaskLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskLog")
            .field("source_id", &self.source_id)
            .finish_non_exhaustive()
    }
}

impl TaskLog {
    /// Source id of this handle.
    #[must_use]
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// What: Handle for another source sharing the same queue.
    #[must_use]
    pub fn with_source(&self, source_id: impl Into<String>) -> Self {
        Self {
            source_id: Arc::from(source_id.into()),
            tx: self.tx.clone(),
        }
    }

    /// What: Queue one record.
    ///
    /// Details:
    /// - A closed aggregator drops the record; logging never fails a task.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let record = LogRecord {
            source_id: self.source_id.to_string(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
        };
        let _ = self.tx.send(record);
    }

    /// Queue a debug record.
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    /// Queue an info record.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Queue a warning record.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// Queue an error record.
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}
