//! In-memory collaborators shared by the pipeline tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use helpsweep::batch::{BatchSummary, Coordinator, PoolConfig};
use helpsweep::introspect::{IntrospectError, Introspector};
use helpsweep::isolation::{
    ContainerPlatform, ContainerStatus, Environment, ExecOutput, NamedLock, PULL_LOCK_NAME,
    PlatformError, PlatformResult, Provisioner,
};
use helpsweep::logging::{LogAggregator, LogRecord, MemorySink};
use helpsweep::model::{BinaryDescriptor, CommandDescription, StateSnapshot, WorkUnit};
use helpsweep::processor::{Processor, Timeouts};
use helpsweep::registry::{ImageSource, RegistryError};

/// How containers behave after `run`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Startup {
    /// Running on the first poll.
    #[default]
    Ready,
    /// Never leaves `created`.
    Stuck,
}

/// Container engine double tracking every container's lifecycle.
#[derive(Default)]
pub struct FakePlatform {
    /// Images whose pull reports "not found".
    pub missing: Vec<String>,
    /// Startup behavior of every container.
    pub startup: Startup,
    /// Manifest JSON keyed by `package-version`.
    pub manifests: HashMap<String, String>,
    /// Container id -> image, for containers not yet removed.
    pub(crate) live: Mutex<BTreeMap<String, String>>,
    /// Removal count per container id.
    pub(crate) removed: Mutex<BTreeMap<String, usize>>,
    /// Images removed.
    pub(crate) removed_images: Mutex<Vec<String>>,
    /// Sequence for container ids.
    pub(crate) next_id: AtomicUsize,
}

impl FakePlatform {
    /// Containers started so far.
    pub fn started(&self) -> usize {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Containers started but not removed.
    pub fn live(&self) -> usize {
        self.live.lock().expect("live").len()
    }

    /// Per-container removal counts.
    pub fn removals(&self) -> BTreeMap<String, usize> {
        self.removed.lock().expect("removed").clone()
    }

    /// Images removed, in order.
    pub fn removed_images(&self) -> Vec<String> {
        self.removed_images.lock().expect("images").clone()
    }

    /// Every started container was removed exactly once.
    pub fn assert_all_released_once(&self) {
        assert_eq!(self.live(), 0, "containers leaked");
        let removals = self.removals();
        assert_eq!(removals.len(), self.started());
        assert!(removals.values().all(|&n| n == 1), "double release: {removals:?}");
    }
}

impl ContainerPlatform for FakePlatform {
    fn pull<'a>(&'a self, image: &'a str) -> BoxFuture<'a, PlatformResult<()>> {
        let missing = self.missing.iter().any(|m| m == image);
        async move {
            if missing {
                Err(PlatformError::NotFound(format!("manifest unknown: {image}")))
            } else {
                Ok(())
            }
        }
        .boxed()
    }

    fn run<'a>(
        &'a self,
        image: &'a str,
        _entrypoint: &'a [String],
    ) -> BoxFuture<'a, PlatformResult<String>> {
        async move {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            let id = format!("c{n}");
            self.live
                .lock()
                .expect("live")
                .insert(id.clone(), image.to_string());
            Ok(id)
        }
        .boxed()
    }

    fn status<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, PlatformResult<ContainerStatus>> {
        let status = match self.startup {
            Startup::Ready => ContainerStatus::Running,
            Startup::Stuck => ContainerStatus::Created,
        };
        async move { Ok(status) }.boxed()
    }

    fn exec<'a>(
        &'a self,
        _id: &'a str,
        argv: &'a [String],
    ) -> BoxFuture<'a, PlatformResult<ExecOutput>> {
        async move {
            let script = argv.last().cloned().unwrap_or_default();
            let found = self
                .manifests
                .iter()
                .find(|(key, _)| script.contains(&format!("conda-meta/{key}*")));
            Ok(match found {
                Some((_, manifest)) => ExecOutput {
                    exit_code: 0,
                    stdout: manifest.clone(),
                    stderr: String::new(),
                },
                None => ExecOutput {
                    exit_code: 1,
                    stdout: String::new(),
                    stderr: "cat: No such file or directory".to_string(),
                },
            })
        }
        .boxed()
    }

    fn logs<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, PlatformResult<String>> {
        async { Ok(String::new()) }.boxed()
    }

    fn kill<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, PlatformResult<()>> {
        async { Ok(()) }.boxed()
    }

    fn remove<'a>(&'a self, id: &'a str, _force: bool) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            self.live.lock().expect("live").remove(id);
            *self
                .removed
                .lock()
                .expect("removed")
                .entry(id.to_string())
                .or_default() += 1;
            Ok(())
        }
        .boxed()
    }

    fn image_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PlatformResult<String>> {
        async move {
            self.live
                .lock()
                .expect("live")
                .get(id)
                .map(|image| format!("sha256:{image}"))
                .ok_or_else(|| PlatformError::Other(format!("no container {id}")))
        }
        .boxed()
    }

    fn remove_image<'a>(
        &'a self,
        image: &'a str,
        _force: bool,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            self.removed_images
                .lock()
                .expect("images")
                .push(image.to_string());
            Ok(())
        }
        .boxed()
    }
}

/// Registry double with fixed candidates per unit.
#[derive(Default)]
pub struct FakeImages(pub HashMap<WorkUnit, Vec<String>>);

impl ImageSource for FakeImages {
    fn image_candidates<'a>(
        &'a self,
        unit: &'a WorkUnit,
    ) -> BoxFuture<'a, Result<Vec<String>, RegistryError>> {
        let images = self.0.get(unit).cloned().unwrap_or_default();
        async move { Ok(images) }.boxed()
    }
}

/// What a binary does when explored.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Returns this YAML description.
    Describe(String),
    /// Fails with an error.
    Fail,
    /// Panics.
    Panic,
    /// Never finishes.
    Hang,
}

/// Introspector double; unknown binaries describe themselves as a leaf.
#[derive(Default)]
pub struct FakeIntrospector {
    /// Behavior per binary name.
    pub behaviors: HashMap<String, Behavior>,
    /// Binaries explored.
    pub calls: AtomicUsize,
}

impl Introspector for FakeIntrospector {
    fn explore<'a>(
        &'a self,
        binary: &'a BinaryDescriptor,
        _env: &'a Environment<'a>,
    ) -> BoxFuture<'a, Result<CommandDescription, IntrospectError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .behaviors
            .get(binary.name())
            .cloned()
            .unwrap_or_else(|| Behavior::Describe(leaf_yaml(binary.name())));
        async move {
            match behavior {
                Behavior::Describe(yaml) => CommandDescription::from_yaml_str(&yaml)
                    .map_err(|e| IntrospectError::Format(e.to_string())),
                Behavior::Fail => Err(IntrospectError::NoHelp(binary.name().to_string())),
                Behavior::Panic => panic!("introspection of {binary} exploded"),
                Behavior::Hang => {
                    futures::future::pending::<()>().await;
                    Err(IntrospectError::NoHelp(binary.name().to_string()))
                }
            }
        }
        .boxed()
    }
}

/// Leaf description for `name`.
pub fn leaf_yaml(name: &str) -> String {
    format!("command: [{name}]\nhelp_text: 'Usage: {name} [options]'\npositional: []\nsubcommands: []\n")
}

/// Conda manifest listing `bins` under `bin/` plus some noise.
pub fn manifest(bins: &[&str]) -> String {
    let mut files: Vec<String> = bins.iter().map(|b| format!("\"bin/{b}\"")).collect();
    files.push("\"share/doc/README\"".to_string());
    files.push("\"bin/nested/helper\"".to_string());
    format!("{{\"files\": [{}]}}", files.join(","))
}

/// Short limits so failure paths finish quickly.
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        ready: Duration::from_millis(100),
        poll_interval: Duration::from_millis(2),
        binary: Duration::from_millis(100),
    }
}

/// Everything a test needs to run a batch and inspect the outcome.
pub struct Harness {
    /// Container double.
    pub platform: Arc<FakePlatform>,
    /// Introspector double.
    pub introspector: Arc<FakeIntrospector>,
    /// Registry double.
    pub images: Arc<FakeImages>,
}

impl Harness {
    /// Harness over the given doubles.
    pub fn new(platform: FakePlatform, introspector: FakeIntrospector, images: FakeImages) -> Self {
        Self {
            platform: Arc::new(platform),
            introspector: Arc::new(introspector),
            images: Arc::new(images),
        }
    }

    /// Processor wired to the doubles.
    pub fn processor(&self) -> Processor {
        let provisioner = Provisioner::new(
            self.platform.clone(),
            Arc::new(NamedLock::new(PULL_LOCK_NAME)),
        );
        Processor::new(
            provisioner,
            self.images.clone(),
            self.introspector.clone(),
            fast_timeouts(),
            "/usr/local",
        )
    }

    /// What: Run a batch and collect its summary and log records.
    pub async fn run(
        &self,
        targets: &[&str],
        out: &Path,
        pool: &PoolConfig,
        resume: Option<&StateSnapshot>,
    ) -> (BatchSummary, Vec<LogRecord>) {
        let sink = MemorySink::default();
        let aggregator = LogAggregator::start(sink.clone());
        let log = aggregator.handle("batch");
        let targets: Vec<String> = targets.iter().map(ToString::to_string).collect();
        let summary = Coordinator::new(self.processor())
            .run(&targets, out, pool, resume, &log)
            .await
            .expect("output directory exists");
        drop(log);
        aggregator.shutdown().await;
        (summary, sink.records())
    }
}

/// Candidate list with one image for `unit`.
pub fn one_image(unit: &str) -> (WorkUnit, Vec<String>) {
    let unit: WorkUnit = unit.parse().expect("valid unit");
    let image = format!("quay.io/biocontainers/{}:{}--0", unit.name, unit.version);
    (unit, vec![image])
}

/// Sorted relative paths of every file under `root`.
pub fn tree(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).expect("readable dir") {
            let path = entry.expect("entry").path();
            let rel = path
                .strip_prefix(root)
                .expect("under root")
                .to_string_lossy()
                .into_owned();
            if path.is_dir() {
                out.push(format!("{rel}/"));
                walk(&path, root, out);
            } else {
                out.push(rel);
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
