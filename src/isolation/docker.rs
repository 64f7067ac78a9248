//! [`ContainerPlatform`] backed by the `docker` command line client.

use futures::FutureExt;
use futures::future::BoxFuture;

use super::{ContainerPlatform, ContainerStatus, ExecOutput, PlatformError, PlatformResult};
use crate::command::{CommandError, run_checked, run_output};

/// Lowercased stderr fragments meaning "this image does not exist".
const NOT_FOUND_MARKERS: [&str; 4] = [
    "no such image",
    "manifest unknown",
    "pull access denied",
    "not found",
];

/// Docker engine driven through its CLI.
#[derive(Clone, Debug)]
pub struct DockerCli {
    /// Client binary name or path.
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    /// What: Client using `binary` (for example `docker` or `podman`).
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Client binary in use.
    #[must_use]
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run the client and return trimmed stdout.
    async fn checked(&self, args: &[&str]) -> PlatformResult<String> {
        run_checked(&self.binary, args, None)
            .await
            .map(|out| out.trim().to_string())
            .map_err(classify)
    }
}

/// What: Map a client failure onto a platform error.
///
/// Details:
/// - Non-zero exits whose stderr matches [`NOT_FOUND_MARKERS`] become
///   `NotFound`; everything else stays a command error.
fn classify(err: CommandError) -> PlatformError {
    let stderr = err.stderr().to_ascii_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) {
        PlatformError::NotFound(err.stderr().to_string())
    } else {
        PlatformError::Command(err)
    }
}

impl ContainerPlatform for DockerCli {
    fn pull<'a>(&'a self, image: &'a str) -> BoxFuture<'a, PlatformResult<()>> {
        async move { self.checked(&["pull", "--quiet", image]).await.map(|_| ()) }.boxed()
    }

    fn run<'a>(
        &'a self,
        image: &'a str,
        entrypoint: &'a [String],
    ) -> BoxFuture<'a, PlatformResult<String>> {
        async move {
            let mut args = vec!["run", "--detach"];
            if let Some((first, rest)) = entrypoint.split_first() {
                args.extend(["--entrypoint", first.as_str(), image]);
                args.extend(rest.iter().map(String::as_str));
            } else {
                args.push(image);
            }
            self.checked(&args).await
        }
        .boxed()
    }

    fn status<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PlatformResult<ContainerStatus>> {
        async move {
            self.checked(&["inspect", "--format", "{{.State.Status}}", id])
                .await
                .map(|raw| ContainerStatus::parse(&raw))
        }
        .boxed()
    }

    fn exec<'a>(
        &'a self,
        id: &'a str,
        argv: &'a [String],
    ) -> BoxFuture<'a, PlatformResult<ExecOutput>> {
        async move {
            let mut args = vec!["exec", id];
            args.extend(argv.iter().map(String::as_str));
            let out = run_output(&self.binary, &args, None).await?;
            Ok(ExecOutput {
                exit_code: out.exit_code(),
                stdout: out.stdout,
                stderr: out.stderr,
            })
        }
        .boxed()
    }

    fn logs<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PlatformResult<String>> {
        async move {
            let out = run_output(&self.binary, &["logs", "--tail", "50", id], None).await?;
            Ok(format!("{}{}", out.stdout, out.stderr))
        }
        .boxed()
    }

    fn kill<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PlatformResult<()>> {
        async move { self.checked(&["kill", id]).await.map(|_| ()) }.boxed()
    }

    fn remove<'a>(&'a self, id: &'a str, force: bool) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            let mut args = vec!["rm"];
            if force {
                args.push("--force");
            }
            args.push(id);
            self.checked(&args).await.map(|_| ())
        }
        .boxed()
    }

    fn image_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, PlatformResult<String>> {
        async move { self.checked(&["inspect", "--format", "{{.Image}}", id]).await }.boxed()
    }

    fn remove_image<'a>(
        &'a self,
        image: &'a str,
        force: bool,
    ) -> BoxFuture<'a, PlatformResult<()>> {
        async move {
            let mut args = vec!["rmi"];
            if force {
                args.push("--force");
            }
            args.push(image);
            self.checked(&args).await.map(|_| ())
        }
        .boxed()
    }
}
