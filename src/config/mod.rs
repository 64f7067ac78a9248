//! Runtime settings loaded from `settings.conf`.
//!
//! Every key has a default, so a missing file is not an error. Command-line
//! flags are applied on top of the loaded values by the binary.

mod parse;
mod paths;

use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

pub use parse::{parse_key_value, parse_settings, skip_comment_or_empty};
pub use paths::{config_dir, logs_dir};

/// Default BioContainers GA4GH TRS endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "https://api.biocontainers.pro/ga4gh/trs/v2";

/// User-tunable settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Worker count; `None` means available parallelism.
    pub processes: Option<usize>,
    /// Units a worker handles before it is replaced; `None` means unlimited.
    pub max_tasks: Option<usize>,
    /// Ceiling on waiting for a container to report `running`.
    pub ready_timeout_secs: u64,
    /// Delay between readiness polls.
    pub ready_poll_interval_ms: u64,
    /// Ceiling on exploring a single binary.
    pub binary_timeout_secs: u64,
    /// Base URL of the TRS registry.
    pub registry_url: String,
    /// Base URL of the PyPI JSON API.
    pub pypi_url: String,
    /// PyPI name of the help parsing engine, used for its version.
    pub engine_package: String,
    /// Parser invocation; `{command}` expands to the command words.
    pub parser_command: Vec<String>,
    /// Wrapper converter invocation; `{format}` expands to the format name.
    /// Empty disables external wrapper formats.
    pub converter_command: Vec<String>,
    /// External wrapper formats to generate (e.g. `cwl`, `wdl`).
    pub wrapper_formats: Vec<String>,
    /// Container engine executable.
    pub docker_binary: String,
    /// Environment prefix inside the containers (holds `conda-meta/`).
    pub conda_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            processes: None,
            max_tasks: None,
            ready_timeout_secs: 60,
            ready_poll_interval_ms: 1000,
            binary_timeout_secs: 10,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            pypi_url: "https://pypi.org/pypi".to_string(),
            engine_package: "aclimatise".to_string(),
            parser_command: ["aclimatise", "pipe", "{command}", "--format", "yml"]
                .into_iter()
                .map(ToString::to_string)
                .collect(),
            converter_command: Vec::new(),
            wrapper_formats: Vec::new(),
            docker_binary: "docker".to_string(),
            conda_prefix: "/usr/local".to_string(),
        }
    }
}

impl Settings {
    /// What: Load settings from an explicit file, or from the default location.
    ///
    /// Inputs:
    /// - `path`: Explicit settings file (from `--config`), if any.
    ///
    /// Output:
    /// - Settings with file values applied over the defaults.
    ///
    /// Details:
    /// - A missing default file silently yields defaults; a missing explicit
    ///   file is logged as a warning and also yields defaults.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let mut out = Self::default();
        let resolved = path.map(Path::to_path_buf).or_else(paths::resolve_settings_config_path);
        let Some(p) = resolved else {
            debug!("[Config] No settings.conf found, using defaults");
            return out;
        };
        match std::fs::read_to_string(&p) {
            Ok(content) => {
                debug!(path = %p.display(), bytes = content.len(), "[Config] Loaded settings.conf");
                parse_settings(&content, &mut out);
            }
            Err(e) => {
                warn!(path = %p.display(), error = %e, "[Config] settings file unreadable, using defaults");
            }
        }
        out
    }

    /// Readiness ceiling as a `Duration`.
    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Readiness poll interval as a `Duration`.
    #[must_use]
    pub const fn ready_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ready_poll_interval_ms)
    }

    /// Per-binary exploration ceiling as a `Duration`.
    #[must_use]
    pub const fn binary_timeout(&self) -> Duration {
        Duration::from_secs(self.binary_timeout_secs)
    }
}
