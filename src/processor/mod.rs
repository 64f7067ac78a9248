//! Task bodies run by the batch coordinator.
//!
//! [`Processor::process`] handles one package version from directory claim
//! to container teardown. [`Reanalyser::process`] re-parses one stored
//! description. Neither returns an error: every failure is logged on the
//! task's [`TaskLog`] and summarized as a [`UnitOutcome`].

use std::any::Any;
use std::io::ErrorKind;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::config::Settings;
use crate::discovery::discover;
use crate::introspect::{HelpParser, Introspector};
use crate::isolation::{Environment, EnvironmentHandle, ProvisionOutcome, Provisioner, ReadyOutcome};
use crate::logging::TaskLog;
use crate::model::{CommandDescription, WorkUnit};
use crate::registry::ImageSource;
use crate::wrappers::{WrapperGenerator, wrapper_from_command};

/// What one task invocation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitOutcome {
    /// The body ran to the end.
    Completed {
        /// Description files written.
        written: usize,
        /// Binaries (or files) that could not be described.
        failed: usize,
    },
    /// Output already existed, or there was nothing to redo.
    Skipped,
    /// The package installed no binaries.
    NoBinaries,
    /// The unit was abandoned.
    Failed(String),
}

/// Timing limits of a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Ceiling on container readiness.
    pub ready: Duration,
    /// Delay between readiness polls.
    pub poll_interval: Duration,
    /// Ceiling on one binary's exploration.
    pub binary: Duration,
}

impl Timeouts {
    /// Limits taken from settings.
    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            ready: settings.ready_timeout(),
            poll_interval: settings.ready_poll_interval(),
            binary: settings.binary_timeout(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Where wrappers for freshly written descriptions go.
#[derive(Clone)]
pub struct WrapperTarget {
    /// Root of the wrapper tree; the description layout is mirrored below it.
    pub root: PathBuf,
    /// Generators to run.
    pub generators: Arc<Vec<Box<dyn WrapperGenerator>>>,
}

impl WrapperTarget {
    /// What: Generate wrappers for `description` into `root/relative_dir`.
    ///
    /// Details:
    /// - Failures are logged; they never fail the caller.
    async fn generate(
        &self,
        description: &CommandDescription,
        relative_dir: &Path,
        fallback: &str,
        log: &TaskLog,
    ) {
        let dir = self.root.join(relative_dir);
        if let Err(e) = wrapper_from_command(description, &dir, &self.generators, fallback).await {
            log.error(format!("Wrapper generation for {fallback} failed: {e}"));
        }
    }
}

/// Render a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Installs, discovers and describes one package version.
#[derive(Clone)]
pub struct Processor {
    /// Container lifecycle.
    provisioner: Provisioner,
    /// Image candidates per unit.
    images: Arc<dyn ImageSource>,
    /// Binary description.
    introspector: Arc<dyn Introspector>,
    /// Timing limits.
    timeouts: Timeouts,
    /// Prefix holding `conda-meta/` inside containers.
    prefix: String,
    /// Optional wrapper output.
    wrappers: Option<WrapperTarget>,
}

impl Processor {
    /// What: Assemble a processor.
    #[must_use]
    pub fn new(
        provisioner: Provisioner,
        images: Arc<dyn ImageSource>,
        introspector: Arc<dyn Introspector>,
        timeouts: Timeouts,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            provisioner,
            images,
            introspector,
            timeouts,
            prefix: prefix.into(),
            wrappers: None,
        }
    }

    /// What: Also write wrappers for every description produced.
    #[must_use]
    pub fn with_wrappers(mut self, target: WrapperTarget) -> Self {
        self.wrappers = Some(target);
        self
    }

    /// What: Process one unit end to end.
    ///
    /// Inputs:
    /// - `unit`: Package version.
    /// - `out_dir`: Output root; artifacts go to `out_dir/<name>/<version>/`.
    /// - `log`: Task log for this unit.
    ///
    /// Output:
    /// - What happened; never an error.
    ///
    /// Details:
    /// - The unit directory is claimed with an exclusive create, so a unit
    ///   that was already attempted is skipped.
    /// - Any container started here is released exactly once before
    ///   returning, including when the body panics.
    pub async fn process(&self, unit: &WorkUnit, out_dir: &Path, log: &TaskLog) -> UnitOutcome {
        let unit_dir = out_dir.join(&unit.name).join(&unit.version);
        if let Some(parent) = unit_dir.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            log.error(format!("Could not create {}: {e}", parent.display()));
            return UnitOutcome::Failed(e.to_string());
        }
        match tokio::fs::create_dir(&unit_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                log.warn(format!("Directory already exists for {unit}"));
                return UnitOutcome::Skipped;
            }
            Err(e) => {
                log.error(format!("Could not create {}: {e}", unit_dir.display()));
                return UnitOutcome::Failed(e.to_string());
            }
        }

        log.info(format!("Processing {unit}"));
        let candidates = match self.images.image_candidates(unit).await {
            Ok(c) => c,
            Err(e) => {
                log.error(format!("Could not list images for {unit}: {e}"));
                return UnitOutcome::Failed(e.to_string());
            }
        };
        let handle = match self.provisioner.provision_first(&candidates, log).await {
            ProvisionOutcome::Started(handle) => handle,
            ProvisionOutcome::NotFound => {
                log.error(format!("No images could be pulled for tool {unit}."));
                return UnitOutcome::Failed("no image available".to_string());
            }
            ProvisionOutcome::Failed(reason) => {
                log.error(format!("Could not start an environment for {unit}: {reason}"));
                return UnitOutcome::Failed(reason);
            }
        };

        let body = AssertUnwindSafe(self.in_environment(unit, &handle, &unit_dir, log))
            .catch_unwind()
            .await;
        self.provisioner.release(handle, log).await;
        match body {
            Ok(outcome) => outcome,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                log.error(format!("Processing {unit} panicked: {msg}. Cleaned up."));
                UnitOutcome::Failed(format!("panic: {msg}"))
            }
        }
    }

    /// Steps that need the running container: readiness, discovery, introspection.
    async fn in_environment(
        &self,
        unit: &WorkUnit,
        handle: &EnvironmentHandle,
        unit_dir: &Path,
        log: &TaskLog,
    ) -> UnitOutcome {
        match self
            .provisioner
            .wait_ready(handle, self.timeouts.ready, self.timeouts.poll_interval)
            .await
        {
            ReadyOutcome::Ready => {}
            ReadyOutcome::TimedOut => {
                let msg = format!(
                    "Container {} did not start within {:?}",
                    handle.id, self.timeouts.ready
                );
                log.error(msg.clone());
                return UnitOutcome::Failed(msg);
            }
            ReadyOutcome::NotRunning { status, logs } => {
                let msg = format!(
                    "Container {} is not running. It has status {status}. Logs show: {}",
                    handle.id,
                    logs.trim()
                );
                log.error(msg.clone());
                return UnitOutcome::Failed(msg);
            }
        }

        let env = Environment::new(self.provisioner.platform(), handle);
        log.info("Finding binaries");
        let binaries = discover(&env, &unit.name, &unit.version, &self.prefix, log).await;
        log.info(format!("{} binaries found", binaries.len()));
        if binaries.is_empty() {
            log.warn(format!("Package {unit} has no executables. Skipping."));
            return UnitOutcome::NoBinaries;
        }

        let relative_dir = PathBuf::from(&unit.name).join(&unit.version);
        let (mut written, mut failed) = (0, 0);
        for binary in &binaries {
            let explored =
                tokio::time::timeout(self.timeouts.binary, self.introspector.explore(binary, &env))
                    .await;
            let description = match explored {
                Ok(Ok(description)) => description,
                Ok(Err(e)) => {
                    log.error(format!("Could not describe {binary}: {e}"));
                    failed += 1;
                    continue;
                }
                Err(_) => {
                    log.error(format!(
                        "Describing {binary} timed out after {:?}",
                        self.timeouts.binary
                    ));
                    failed += 1;
                    continue;
                }
            };
            let path = unit_dir.join(format!("{}.yml", description.as_filename(binary.name())));
            if let Err(e) = description.save(&path) {
                log.error(e);
                failed += 1;
                continue;
            }
            written += 1;
            log.debug(format!("Wrote {}", path.display()));
            if let Some(target) = &self.wrappers {
                target
                    .generate(&description, &relative_dir, binary.name(), log)
                    .await;
            }
        }
        UnitOutcome::Completed { written, failed }
    }
}

/// Re-parses stored descriptions with the current parser.
#[derive(Clone)]
pub struct Reanalyser {
    /// Parser producing the new descriptions.
    parser: Arc<dyn HelpParser>,
    /// Root the files are found under, for mirroring into the wrapper tree.
    root: PathBuf,
    /// Optional wrapper output.
    wrappers: Option<WrapperTarget>,
}

impl Reanalyser {
    /// What: Reanalyser for files under `root`.
    pub fn new(parser: Arc<dyn HelpParser>, root: impl Into<PathBuf>) -> Self {
        Self {
            parser,
            root: root.into(),
            wrappers: None,
        }
    }

    /// What: Also regenerate wrappers for every reanalysed file.
    #[must_use]
    pub fn with_wrappers(mut self, target: WrapperTarget) -> Self {
        self.wrappers = Some(target);
        self
    }

    /// What: Replace one stored description with a fresh parse of its help text.
    ///
    /// Inputs:
    /// - `path`: Description file.
    /// - `log`: Task log for this file.
    ///
    /// Output:
    /// - `Completed` when rewritten; `Skipped` when the help text is missing,
    ///   empty or whitespace only, or the command has sub-commands; `Failed`
    ///   when loading, parsing or writing fails.
    ///
    /// Details:
    /// - A panic inside the parser is caught and reported as `Failed`.
    pub async fn process(&self, path: &Path, log: &TaskLog) -> UnitOutcome {
        match AssertUnwindSafe(self.reanalyse(path, log)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                log.error(format!("Reanalysis panicked: {msg}"));
                UnitOutcome::Failed(format!("panic: {msg}"))
            }
        }
    }

    /// Body of [`Reanalyser::process`].
    async fn reanalyse(&self, path: &Path, log: &TaskLog) -> UnitOutcome {
        log.info("Reanalysing...");
        let old = match CommandDescription::load(path) {
            Ok(old) => old,
            Err(e) => {
                log.error(e.clone());
                return UnitOutcome::Failed(e);
            }
        };
        let Some(help) = old.help_text().filter(|t| !t.trim().is_empty()) else {
            log.warn("Has no help text to re-analyse");
            return UnitOutcome::Skipped;
        };
        if old.has_subcommands() {
            log.warn("This tool has subcommands. We can't reanalyse this without re-running it.");
            return UnitOutcome::Skipped;
        }
        let command = old.command();
        let new = match self.parser.parse(&command, help).await {
            Ok(new) => new,
            Err(e) => {
                log.error(format!("Parsing failed: {e}"));
                return UnitOutcome::Failed(e.to_string());
            }
        };
        if let Err(e) = new.save(path) {
            log.error(e.clone());
            return UnitOutcome::Failed(e);
        }
        if let Some(target) = &self.wrappers {
            let relative_dir = path
                .parent()
                .and_then(|p| p.strip_prefix(&self.root).ok())
                .unwrap_or_else(|| Path::new(""));
            let fallback = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            target.generate(&new, relative_dir, &fallback, log).await;
        }
        UnitOutcome::Completed {
            written: 1,
            failed: 0,
        }
    }
}
