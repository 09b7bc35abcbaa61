//! Container runtime abstraction.
//!
//! The provisioner only talks to the host through [`ContainerRuntime`], so
//! tests can substitute a recording fake for the docker CLI.

mod docker;
mod spec;

pub use docker::DockerCli;
pub use spec::RunSpec;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentResult;

/// Summary of one container as listed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Container id assigned by the runtime.
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Container name(s).
    #[serde(rename = "Names")]
    pub names: String,
    /// Image reference.
    #[serde(rename = "Image")]
    pub image: String,
    /// Machine-readable state (`running`, `exited`, ...).
    #[serde(rename = "State", default)]
    pub state: String,
    /// Human-readable status.
    #[serde(rename = "Status", default)]
    pub status: String,
    /// Published ports.
    #[serde(rename = "Ports", default)]
    pub ports: String,
}

/// Output of the three prune commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Output of the container prune.
    pub containers: String,
    /// Output of the image prune.
    pub images: String,
    /// Output of the network prune.
    pub networks: String,
}

/// Host operations needed to provision VMs and application stacks.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Build an image from a context directory containing a `Dockerfile`.
    async fn build_image(&self, tag: &str, context_dir: &Path) -> AgentResult<()>;

    /// Create and start a detached container.
    async fn run(&self, spec: &RunSpec) -> AgentResult<()>;

    /// Whether a container with this name exists (in any state).
    async fn container_exists(&self, name: &str) -> AgentResult<bool>;

    /// Start an existing container.
    async fn start(&self, name: &str) -> AgentResult<()>;

    /// Stop a running container.
    async fn stop(&self, name: &str) -> AgentResult<()>;

    /// Force-remove a container.
    async fn remove(&self, name: &str) -> AgentResult<()>;

    /// Names of all containers whose name starts with `prefix`.
    async fn containers_with_prefix(&self, prefix: &str) -> AgentResult<Vec<String>>;

    /// List every container on the host.
    async fn list_containers(&self) -> AgentResult<Vec<ContainerSummary>>;

    /// Create a bridge network.
    async fn create_network(&self, name: &str) -> AgentResult<()>;

    /// Whether a network exists.
    async fn network_exists(&self, name: &str) -> AgentResult<bool>;

    /// Remove a network.
    async fn remove_network(&self, name: &str) -> AgentResult<()>;

    /// Remove stopped containers older than a day, dangling images and
    /// unused networks.
    async fn prune(&self) -> AgentResult<PruneReport>;
}
