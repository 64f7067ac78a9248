//! Named mutual exclusion for platform operations that are unsafe to run concurrently.

use tokio::sync::{Mutex, MutexGuard};

/// A mutex with a name, so waits on it can be attributed in the logs.
///
/// One instance is created per run and handed to every provisioner; it is
/// never a process-wide static.
#[derive(Debug)]
pub struct NamedLock {
    /// Name shown in log lines.
    name: String,
    /// The guarded critical section.
    inner: Mutex<()>,
}

impl NamedLock {
    /// What: Create an unlocked lock.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(()),
        }
    }

    /// Lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// What: Wait for the lock.
    ///
    /// Output:
    /// - Guard releasing the lock on drop.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        if let Ok(guard) = self.inner.try_lock() {
            return guard;
        }
        tracing::debug!(lock = %self.name, "waiting for lock");
        let start = std::time::Instant::now();
        let guard = self.inner.lock().await;
        tracing::debug!(
            lock = %self.name,
            waited_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "lock acquired"
        );
        guard
    }
}
