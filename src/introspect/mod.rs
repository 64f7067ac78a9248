//! Turning a binary inside an environment into a [`CommandDescription`].
//!
//! [`HelpCaptureIntrospector`] collects the help text in the container and
//! hands it to a [`HelpParser`]; the default parser is the external engine
//! command configured in `settings.conf`.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::command::{CommandError, run_checked};
use crate::isolation::{Environment, PlatformError};
use crate::model::{BinaryDescriptor, CommandDescription};

/// Placeholder in the parser template replaced by the command words.
pub const COMMAND_PLACEHOLDER: &str = "{command}";

/// Failure to describe a single binary.
#[derive(Debug)]
pub enum IntrospectError {
    /// Running the binary in the environment failed.
    Platform(PlatformError),
    /// None of the help invocations produced any output.
    NoHelp(String),
    /// The parsing engine could not be run or rejected the input.
    Parser(CommandError),
    /// The engine output was not a YAML description.
    Format(String),
}

impl fmt::Display for IntrospectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Platform(e) => write!(f, "exec failed: {e}"),
            Self::NoHelp(bin) => write!(f, "{bin} printed no help text"),
            Self::Parser(e) => write!(f, "help parser failed: {e}"),
            Self::Format(msg) => write!(f, "help parser output unreadable: {msg}"),
        }
    }
}

impl std::error::Error for IntrospectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Platform(e) => Some(e),
            Self::Parser(e) => Some(e),
            Self::NoHelp(_) | Self::Format(_) => None,
        }
    }
}

impl From<PlatformError> for IntrospectError {
    fn from(value: PlatformError) -> Self {
        Self::Platform(value)
    }
}

impl From<CommandError> for IntrospectError {
    fn from(value: CommandError) -> Self {
        Self::Parser(value)
    }
}

/// What: Converts raw help text into a structured description.
pub trait HelpParser: Send + Sync {
    /// Parse `help_text` printed by `command`.
    fn parse<'a>(
        &'a self,
        command: &'a [String],
        help_text: &'a str,
    ) -> BoxFuture<'a, Result<CommandDescription, IntrospectError>>;
}

/// What: Produces a description for one binary in a running environment.
pub trait Introspector: Send + Sync {
    /// Describe `binary`. Callers bound the call with their own timeout.
    fn explore<'a>(
        &'a self,
        binary: &'a BinaryDescriptor,
        env: &'a Environment<'a>,
    ) -> BoxFuture<'a, Result<CommandDescription, IntrospectError>>;
}

/// Parser backed by an external command reading help text on stdin.
#[derive(Clone, Debug)]
pub struct ExternalHelpParser {
    /// Program followed by its arguments, with [`COMMAND_PLACEHOLDER`].
    template: Vec<String>,
}

impl ExternalHelpParser {
    /// What: Parser running `template`.
    ///
    /// Inputs:
    /// - `template`: Program and arguments; the argument equal to
    ///   `{command}` expands to the command words.
    pub const fn new(template: Vec<String>) -> Self {
        Self { template }
    }

    /// What: Program and arguments for `command`.
    ///
    /// Output:
    /// - `None` when the template is empty.
    #[must_use]
    pub fn argv(&self, command: &[String]) -> Option<(String, Vec<String>)> {
        let (program, rest) = self.template.split_first()?;
        let mut args = Vec::with_capacity(rest.len() + command.len());
        for arg in rest {
            if arg == COMMAND_PLACEHOLDER {
                args.extend(command.iter().cloned());
            } else {
                args.push(arg.clone());
            }
        }
        Some((program.clone(), args))
    }
}

impl HelpParser for ExternalHelpParser {
    fn parse<'a>(
        &'a self,
        command: &'a [String],
        help_text: &'a str,
    ) -> BoxFuture<'a, Result<CommandDescription, IntrospectError>> {
        async move {
            let (program, args) = self
                .argv(command)
                .ok_or_else(|| IntrospectError::Format("parser command is empty".to_string()))?;
            let stdout = run_checked(&program, &args, Some(help_text.as_bytes())).await?;
            let mut description = CommandDescription::from_yaml_str(&stdout)
                .map_err(|e| IntrospectError::Format(e.to_string()))?;
            description.fill_help_text(help_text);
            Ok(description)
        }
        .boxed()
    }
}

/// Help flag variants tried in order; the empty one runs the bare binary.
const HELP_FLAGS: [&[&str]; 3] = [&["--help"], &["-h"], &[]];

/// Introspector capturing help output inside the container.
#[derive(Clone)]
pub struct HelpCaptureIntrospector {
    /// Parser fed with the captured text.
    parser: Arc<dyn HelpParser>,
}

impl HelpCaptureIntrospector {
    /// What: Introspector handing captured help to `parser`.
    pub fn new(parser: Arc<dyn HelpParser>) -> Self {
        Self { parser }
    }
}

/// What: Best help text out of several captures.
///
/// Inputs:
/// - `captures`: Raw stdout/stderr pairs, in invocation order.
///
/// Output:
/// - The longest ANSI-stripped capture, or `None` when all are blank.
///
/// Details:
/// - stdout and stderr are concatenated since many tools print usage to stderr.
/// - Ties keep the earliest capture.
#[must_use]
pub fn pick_help_text(captures: &[(String, String)]) -> Option<String> {
    let mut best: Option<String> = None;
    for (stdout, stderr) in captures {
        let raw = format!("{stdout}{stderr}");
        let text = String::from_utf8_lossy(&strip_ansi_escapes::strip(raw.as_bytes()))
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }
        if best.as_ref().is_none_or(|b| text.len() > b.len()) {
            best = Some(text);
        }
    }
    best
}

impl Introspector for HelpCaptureIntrospector {
    fn explore<'a>(
        &'a self,
        binary: &'a BinaryDescriptor,
        env: &'a Environment<'a>,
    ) -> BoxFuture<'a, Result<CommandDescription, IntrospectError>> {
        async move {
            let mut captures = Vec::with_capacity(HELP_FLAGS.len());
            for flags in HELP_FLAGS {
                let argv: Vec<String> = std::iter::once(binary.name())
                    .chain(flags.iter().copied())
                    .map(ToString::to_string)
                    .collect();
                let out = env.exec(&argv).await?;
                captures.push((out.stdout, out.stderr));
            }
            let help = pick_help_text(&captures)
                .ok_or_else(|| IntrospectError::NoHelp(binary.name().to_string()))?;
            let command = vec![binary.name().to_string()];
            self.parser.parse(&command, &help).await
        }
        .boxed()
    }
}
