//! [`ContainerRuntime`] backed by the docker CLI.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use super::{ContainerRuntime, ContainerSummary, PruneReport, RunSpec};
use crate::error::{AgentError, AgentResult};

/// Captured result of one CLI invocation.
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Drives the local docker daemon through its CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    /// Create a runtime that invokes `binary`.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn exec<I, S>(&self, args: I) -> AgentResult<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        debug!(binary = %self.binary.display(), args = %args.join(" "), "running command");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run a command and turn a non-zero exit into [`AgentError::CommandFailed`].
    async fn checked<I, S>(&self, context: &str, args: I) -> AgentResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let output = self.exec(args).await?;
        if output.success {
            return Ok(output.stdout);
        }

        error!(context, stderr = %output.stderr.trim(), "command failed");
        Err(AgentError::command_failed(
            context,
            output.stdout,
            output.stderr,
        ))
    }

    /// `inspect` succeeds for existing objects; "No such" means absent.
    async fn object_exists(&self, kind: &str, name: &str) -> AgentResult<bool> {
        let output = self.exec([kind, "inspect", name]).await?;
        if output.success {
            return Ok(true);
        }
        if output.stderr.contains("No such") || output.stderr.contains("not found") {
            return Ok(false);
        }
        Err(AgentError::command_failed(
            format!("failed to inspect {kind} {name}"),
            output.stdout,
            output.stderr,
        ))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn build_image(&self, tag: &str, context_dir: &Path) -> AgentResult<()> {
        let context = context_dir.to_string_lossy();
        self.checked(
            "failed to build image",
            [
                "build",
                "--no-cache",
                "--progress=plain",
                "--network=host",
                "-t",
                tag,
                context.as_ref(),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn run(&self, spec: &RunSpec) -> AgentResult<()> {
        self.checked(
            &format!("failed to start container {}", spec.name()),
            spec.to_args(),
        )
        .await
        .map(|_| ())
    }

    async fn container_exists(&self, name: &str) -> AgentResult<bool> {
        self.object_exists("container", name).await
    }

    async fn start(&self, name: &str) -> AgentResult<()> {
        self.checked(&format!("failed to start {name}"), ["start", name])
            .await
            .map(|_| ())
    }

    async fn stop(&self, name: &str) -> AgentResult<()> {
        self.checked(&format!("failed to stop {name}"), ["stop", name])
            .await
            .map(|_| ())
    }

    async fn remove(&self, name: &str) -> AgentResult<()> {
        self.checked(&format!("failed to remove {name}"), ["rm", "-f", name])
            .await
            .map(|_| ())
    }

    async fn containers_with_prefix(&self, prefix: &str) -> AgentResult<Vec<String>> {
        let filter = format!("name={prefix}");
        let stdout = self
            .checked(
                "failed to list containers",
                ["ps", "-a", "--filter", &filter, "--format", "{{.Names}}"],
            )
            .await?;

        // The name filter is a substring match; keep only true prefixes.
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|name| name.starts_with(prefix))
            .map(ToOwned::to_owned)
            .collect())
    }

    async fn list_containers(&self) -> AgentResult<Vec<ContainerSummary>> {
        let stdout = self
            .checked(
                "failed to list containers",
                ["ps", "-a", "--format", "{{json .}}"],
            )
            .await?;

        stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    AgentError::Internal(format!("unexpected container listing: {e}"))
                })
            })
            .collect()
    }

    async fn create_network(&self, name: &str) -> AgentResult<()> {
        self.checked(
            &format!("failed to create network {name}"),
            ["network", "create", name],
        )
        .await
        .map(|_| ())
    }

    async fn network_exists(&self, name: &str) -> AgentResult<bool> {
        self.object_exists("network", name).await
    }

    async fn remove_network(&self, name: &str) -> AgentResult<()> {
        self.checked(
            &format!("failed to remove network {name}"),
            ["network", "rm", name],
        )
        .await
        .map(|_| ())
    }

    async fn prune(&self) -> AgentResult<PruneReport> {
        let containers = self
            .checked(
                "failed to prune containers",
                ["container", "prune", "-f", "--filter", "until=24h"],
            )
            .await?;
        let images = self
            .checked("failed to prune images", ["image", "prune", "-f"])
            .await?;
        let networks = self
            .checked("failed to prune networks", ["network", "prune", "-f"])
            .await?;

        Ok(PruneReport {
            containers,
            images,
            networks,
        })
    }
}
