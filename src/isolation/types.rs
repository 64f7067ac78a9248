//! Type definitions for container isolation.

use std::fmt;

use crate::command::CommandError;

/// Handle to one provisioned container, owned by exactly one unit invocation.
#[derive(Debug, PartialEq, Eq)]
pub struct EnvironmentHandle {
    /// Container id reported by the engine.
    pub id: String,
    /// Image reference the container was started from.
    pub image: String,
}

/// Lifecycle state reported by the container engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but not yet started.
    Created,
    /// Running; ready for `exec`.
    Running,
    /// Being restarted by the engine.
    Restarting,
    /// Paused.
    Paused,
    /// Exited.
    Exited,
    /// Dead or being removed.
    Dead,
    /// Any status string this crate does not know.
    Other(String),
}

impl ContainerStatus {
    /// What: Map an engine status string onto a status.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" | "starting" => Self::Created,
            "running" => Self::Running,
            "restarting" => Self::Restarting,
            "paused" => Self::Paused,
            "exited" => Self::Exited,
            "dead" | "removing" => Self::Dead,
            other => Self::Other(other.to_string()),
        }
    }

    /// `true` while the container may still become `Running`.
    #[must_use]
    pub const fn is_starting(&self) -> bool {
        matches!(self, Self::Created | Self::Restarting)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Running => f.write_str("running"),
            Self::Restarting => f.write_str("restarting"),
            Self::Paused => f.write_str("paused"),
            Self::Exited => f.write_str("exited"),
            Self::Dead => f.write_str("dead"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Result of running a command inside a container.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code of the command.
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

/// Failure reported by a [`super::ContainerPlatform`] call.
#[derive(Debug)]
pub enum PlatformError {
    /// The image (or container) does not exist or cannot be pulled.
    NotFound(String),
    /// Any other engine failure.
    Command(CommandError),
    /// Failure from a non-command platform (test doubles, other engines).
    Other(String),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::Command(err) => write!(f, "{err}"),
            Self::Other(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for PlatformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Command(err) => Some(err),
            Self::NotFound(_) | Self::Other(_) => None,
        }
    }
}

impl From<CommandError> for PlatformError {
    fn from(value: CommandError) -> Self {
        Self::Command(value)
    }
}

/// Result alias for platform calls.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Outcome of asking for one environment from one image candidate.
#[derive(Debug)]
pub enum ProvisionOutcome {
    /// A container is running; the caller owns it and must release it.
    Started(EnvironmentHandle),
    /// The image is unavailable; try the next candidate.
    NotFound,
    /// Any other failure; nothing was allocated.
    Failed(String),
}

/// Outcome of waiting for a started container to become usable.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Container is running.
    Ready,
    /// The ceiling passed while the container was still starting.
    TimedOut,
    /// Container settled in a state other than running.
    NotRunning {
        /// Last observed status.
        status: ContainerStatus,
        /// Tail of the container logs, if they could be read.
        logs: String,
    },
}
