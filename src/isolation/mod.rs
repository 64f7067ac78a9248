//! Disposable container environments, one per unit of work.
//!
//! [`ContainerPlatform`] is the narrow engine interface (production:
//! [`DockerCli`]). [`Provisioner`] layers the unit-level policy on top:
//! candidate fallback, the serialized pull, bounded readiness polling and
//! tolerant teardown.

mod docker;
mod lock;
mod types;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

pub use docker::DockerCli;
pub use lock::NamedLock;
pub use types::{
    ContainerStatus, EnvironmentHandle, ExecOutput, PlatformError, PlatformResult,
    ProvisionOutcome, ReadyOutcome,
};

use crate::logging::TaskLog;

/// Name of the lock serializing image downloads into the shared local store.
pub const PULL_LOCK_NAME: &str = "image-pull";

/// Entrypoint that keeps a container alive while commands are exec'd into it.
pub const KEEPALIVE_ENTRYPOINT: [&str; 2] = ["sleep", "999999999"];

/// What: Container engine operations used by the pipeline.
///
/// Details:
/// - Implementations must be safe to call concurrently; each `run` yields an
///   independent container.
/// - `pull` and `run` report a missing image as `PlatformError::NotFound`.
/// - A non-zero exit from `exec` is an `Ok` result with that exit code.
pub trait ContainerPlatform: Send + Sync {
    /// Download an image into the local store.
    fn pull<'a>(&'a self, image: &'a str) -> BoxFuture<'a, PlatformResult<()>>;
    /// Start a detached container; returns its id.
    fn run<'a>(&'a self, image: &'a str, entrypoint: &'a [String])
    -> BoxFuture<'a, PlatformResult<String>>;
    /// Current lifecycle status of a container.
    fn status<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PlatformResult<ContainerStatus>>;
    /// Run a command inside a running container.
    fn exec<'a>(&'a self, id: &'a str, argv: &'a [String])
    -> BoxFuture<'a, PlatformResult<ExecOutput>>;
    /// Tail of the container's combined output.
    fn logs<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PlatformResult<String>>;
    /// Kill the container's main process.
    fn kill<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PlatformResult<()>>;
    /// Remove the container.
    fn remove<'a>(&'a self, id: &'a str, force: bool) -> BoxFuture<'a, PlatformResult<()>>;
    /// Id of the image a container was created from.
    fn image_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PlatformResult<String>>;
    /// Remove an image from the local store.
    fn remove_image<'a>(&'a self, image: &'a str, force: bool)
    -> BoxFuture<'a, PlatformResult<()>>;
}

/// Borrowed view of a provisioned container for running commands in it.
#[derive(Clone, Copy)]
pub struct Environment<'a> {
    /// Engine used for `exec`.
    platform: &'a dyn ContainerPlatform,
    /// Container to run commands in.
    handle: &'a EnvironmentHandle,
}

impl<'a> Environment<'a> {
    /// What: Bind a handle to the platform that created it.
    #[must_use]
    pub const fn new(platform: &'a dyn ContainerPlatform, handle: &'a EnvironmentHandle) -> Self {
        Self { platform, handle }
    }

    /// Handle of the underlying container.
    #[must_use]
    pub const fn handle(&self) -> &EnvironmentHandle {
        self.handle
    }

    /// What: Run `argv` inside the container.
    ///
    /// # Errors
    /// - Propagates engine failures; a non-zero exit is not an error.
    pub async fn exec(&self, argv: &[String]) -> PlatformResult<ExecOutput> {
        self.platform.exec(&self.handle.id, argv).await
    }

    /// What: Run a script through a login shell so the image's environment
    /// (`PATH`, activated prefixes) applies.
    ///
    /// # Errors
    /// - Propagates engine failures.
    pub async fn shell(&self, script: &str) -> PlatformResult<ExecOutput> {
        let argv = ["bash", "-l", "-c", script].map(ToString::to_string);
        self.exec(&argv).await
    }
}

/// Unit-level container lifecycle policy.
#[derive(Clone)]
pub struct Provisioner {
    /// Engine interface.
    platform: Arc<dyn ContainerPlatform>,
    /// Serializes `pull`.
    pull_lock: Arc<NamedLock>,
    /// Container entrypoint.
    entrypoint: Vec<String>,
}

impl Provisioner {
    /// What: Create a provisioner over `platform`.
    ///
    /// Inputs:
    /// - `platform`: Container engine.
    /// - `pull_lock`: Lock held only around image downloads; share one
    ///   instance between every provisioner of a run.
    #[must_use]
    pub fn new(platform: Arc<dyn ContainerPlatform>, pull_lock: Arc<NamedLock>) -> Self {
        Self {
            platform,
            pull_lock,
            entrypoint: KEEPALIVE_ENTRYPOINT.map(ToString::to_string).to_vec(),
        }
    }

    /// Engine interface used by this provisioner.
    #[must_use]
    pub fn platform(&self) -> &dyn ContainerPlatform {
        self.platform.as_ref()
    }

    /// What: Start one container from one image reference.
    ///
    /// Inputs:
    /// - `image_ref`: Image reference; an `http(s)://` prefix is dropped.
    ///
    /// Output:
    /// - `Started` with a handle the caller must [`release`](Self::release),
    ///   `NotFound` when the image is unavailable, `Failed` otherwise.
    ///
    /// Details:
    /// - The pull runs under the pull lock; the lock is released before the
    ///   container starts.
    pub async fn provision(&self, image_ref: &str) -> ProvisionOutcome {
        let image = crate::util::strip_url_scheme(image_ref);
        {
            let _guard = self.pull_lock.acquire().await;
            match self.platform.pull(image).await {
                Ok(()) => {}
                Err(PlatformError::NotFound(_)) => return ProvisionOutcome::NotFound,
                Err(e) => return ProvisionOutcome::Failed(format!("pull of {image} failed: {e}")),
            }
        }
        match self.platform.run(image, &self.entrypoint).await {
            Ok(id) => ProvisionOutcome::Started(EnvironmentHandle {
                id,
                image: image.to_string(),
            }),
            Err(PlatformError::NotFound(_)) => ProvisionOutcome::NotFound,
            Err(e) => ProvisionOutcome::Failed(format!("starting {image} failed: {e}")),
        }
    }

    /// What: Try image candidates in order until one starts.
    ///
    /// Inputs:
    /// - `candidates`: Image references, preferred first.
    /// - `log`: Task log for per-candidate messages.
    ///
    /// Output:
    /// - First `Started`; `NotFound` when every candidate was missing (or
    ///   there were none); `Failed` on the first other failure.
    pub async fn provision_first(&self, candidates: &[String], log: &TaskLog) -> ProvisionOutcome {
        for image in candidates {
            match self.provision(image).await {
                ProvisionOutcome::Started(handle) => {
                    log.info(format!("Successfully started {}", handle.image));
                    return ProvisionOutcome::Started(handle);
                }
                ProvisionOutcome::NotFound => {
                    log.warn(format!("Failed to pull from {image}, trying next image."));
                }
                ProvisionOutcome::Failed(reason) => return ProvisionOutcome::Failed(reason),
            }
        }
        ProvisionOutcome::NotFound
    }

    /// What: Poll until the container is running, with a hard ceiling.
    ///
    /// Inputs:
    /// - `handle`: Container to watch.
    /// - `timeout`: Ceiling on the whole wait.
    /// - `interval`: Delay between polls.
    ///
    /// Output:
    /// - `Ready`, `TimedOut`, or `NotRunning` with the last status and logs.
    ///
    /// Details:
    /// - A status query failure counts as not running.
    pub async fn wait_ready(
        &self,
        handle: &EnvironmentHandle,
        timeout: Duration,
        interval: Duration,
    ) -> ReadyOutcome {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = match self.platform.status(&handle.id).await {
                Ok(status) => status,
                Err(e) => ContainerStatus::Other(format!("unknown ({e})")),
            };
            if status == ContainerStatus::Running {
                return ReadyOutcome::Ready;
            }
            if !status.is_starting() {
                let logs = self.platform.logs(&handle.id).await.unwrap_or_default();
                return ReadyOutcome::NotRunning { status, logs };
            }
            if tokio::time::Instant::now() + interval > deadline {
                return ReadyOutcome::TimedOut;
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// What: Tear down a container and the image it was created from.
    ///
    /// Inputs:
    /// - `handle`: Consumed; a handle can be released only once.
    /// - `log`: Task log for teardown problems.
    ///
    /// Details:
    /// - Never fails. Kill errors (container already stopped) are logged at
    ///   debug level; removal errors are logged as warnings.
    /// - The image id is read before the container is removed; if that
    ///   lookup fails the image reference is removed instead.
    pub async fn release(&self, handle: EnvironmentHandle, log: &TaskLog) {
        let image = match self.platform.image_id(&handle.id).await {
            Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => handle.image.clone(),
        };
        if let Err(e) = self.platform.kill(&handle.id).await {
            log.debug(format!("kill of container {} failed: {e}", handle.id));
        }
        if let Err(e) = self.platform.remove(&handle.id, true).await {
            log.warn(format!("removing container {} failed: {e}", handle.id));
        }
        if let Err(e) = self.platform.remove_image(&image, true).await {
            log.warn(format!("removing image {image} failed: {e}"));
        }
        log.debug(format!("released container {}", handle.id));
    }
}
