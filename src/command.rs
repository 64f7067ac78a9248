//! Async execution of external programs (container engine, parser, converters).
//!
//! Every child is started with `kill_on_drop`, so a caller that abandons the
//! future (for example on a timeout) does not leave the process behind.

use std::fmt;
use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status of the child.
    pub status: ExitStatus,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Exit code, or `-1` when the child was terminated by a signal.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// What: Error type capturing command spawning and non-success exits.
///
/// Details:
/// - `Failed` keeps the child's stderr so callers can classify the failure
///   (for example "image not found").
#[derive(Debug)]
pub enum CommandError {
    /// I/O error occurred while spawning or talking to the child.
    Io {
        /// Program name that could not be run.
        program: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Command exited with a non-zero status.
    Failed {
        /// Program name that failed.
        program: String,
        /// Command arguments.
        args: Vec<String>,
        /// Exit status of the failed command.
        status: ExitStatus,
        /// Trimmed standard error.
        stderr: String,
    },
}

impl CommandError {
    /// Standard error of a failed command, empty for I/O errors.
    #[must_use]
    pub fn stderr(&self) -> &str {
        match self {
            Self::Io { .. } => "",
            Self::Failed { stderr, .. } => stderr,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { program, source } => write!(f, "failed to run {program}: {source}"),
            Self::Failed {
                program,
                args,
                status,
                stderr,
            } => {
                write!(f, "{program:?} {args:?} exited with status {status}")?;
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Failed { .. } => None,
        }
    }
}

/// What: Run a program to completion and capture its output.
///
/// Inputs:
/// - `program`: Executable name or path.
/// - `args`: Arguments.
/// - `stdin`: Bytes to feed on standard input; `None` connects `/dev/null`.
///
/// Output:
/// - Captured output regardless of exit status.
///
/// # Errors
/// - `CommandError::Io` when the program cannot be spawned or its pipes fail.
pub async fn run_output<S: AsRef<str>>(
    program: &str,
    args: &[S],
    stdin: Option<&[u8]>,
) -> Result<CommandOutput, CommandError> {
    let io_err = |source| CommandError::Io {
        program: program.to_string(),
        source,
    };
    let mut cmd = Command::new(program);
    cmd.args(args.iter().map(AsRef::as_ref))
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = cmd.spawn().map_err(io_err)?;
    let pipe = child.stdin.take();
    // Feed stdin while the output pipes drain, or a chatty child fills its
    // stdout buffer and both sides wait forever.
    let feed = async move {
        let (Some(bytes), Some(mut pipe)) = (stdin, pipe) else {
            return Ok(());
        };
        match pipe.write_all(bytes).await {
            // The child stopped reading; its status and stderr tell the rest.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output.map_err(io_err)?;
    fed.map_err(io_err)?;
    Ok(CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// What: Run a program and require a successful exit.
///
/// Output:
/// - Standard output of the program.
///
/// # Errors
/// - `CommandError::Io` when spawning fails.
/// - `CommandError::Failed` when the exit status is non-zero.
pub async fn run_checked<S: AsRef<str>>(
    program: &str,
    args: &[S],
    stdin: Option<&[u8]>,
) -> Result<String, CommandError> {
    let out = run_output(program, args, stdin).await?;
    if !out.status.success() {
        return Err(CommandError::Failed {
            program: program.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            status: out.status,
            stderr: out.stderr.trim().to_string(),
        });
    }
    Ok(out.stdout)
}
