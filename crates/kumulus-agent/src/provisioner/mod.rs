//! Host-side provisioning of VMs and application stacks.
//!
//! The provisioner owns no durable state: everything it knows about a VM or
//! deployment is rediscovered from the container runtime by name. Host
//! names follow fixed conventions so that discovery works:
//!
//! - a VM container is named after its VM id;
//! - a deployment's network is `<deployment>-network`;
//! - its containers are `<deployment>-db` and `<deployment>-main`.

mod deployment;
mod vm;

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::config::{DockerConfig, PortConfig};
use crate::error::{AgentError, AgentResult};
use crate::ports::PortProbe;
use crate::runtime::{ContainerRuntime, ContainerSummary, PruneReport};

/// Network name for a deployment.
#[must_use]
pub fn network_name(deployment_id: &str) -> String {
    format!("{deployment_id}-network")
}

/// Image tag for a VM.
#[must_use]
pub fn vm_image_tag(vm_id: &str) -> String {
    format!("kumulus-vm-{vm_id}")
}

/// Turns lifecycle requests into container runtime operations.
pub struct Provisioner {
    runtime: Arc<dyn ContainerRuntime>,
    ports: Arc<dyn PortProbe>,
    docker: DockerConfig,
    port_ranges: PortConfig,
}

impl Provisioner {
    /// Create a provisioner.
    #[must_use]
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        ports: Arc<dyn PortProbe>,
        docker: DockerConfig,
        port_ranges: PortConfig,
    ) -> Self {
        Self {
            runtime,
            ports,
            docker,
            port_ranges,
        }
    }

    /// Every container on the host.
    pub async fn list_containers(&self) -> AgentResult<Vec<ContainerSummary>> {
        self.runtime.list_containers().await
    }

    /// Remove stale containers, dangling images and unused networks.
    pub async fn prune_unused(&self) -> AgentResult<PruneReport> {
        self.runtime.prune().await
    }
}

impl fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provisioner")
            .field("docker", &self.docker)
            .field("port_ranges", &self.port_ranges)
            .finish_non_exhaustive()
    }
}

/// Collects failures of best-effort cleanup steps.
///
/// Cleanup never replaces the error that triggered it; failures are only
/// logged.
#[derive(Debug)]
struct Teardown<'a> {
    subject: &'a str,
    failures: Vec<AgentError>,
}

impl<'a> Teardown<'a> {
    const fn new(subject: &'a str) -> Self {
        Self {
            subject,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, step: AgentResult<()>) {
        if let Err(err) = step {
            self.failures.push(err);
        }
    }

    fn push(&mut self, err: AgentError) {
        self.failures.push(err);
    }

    /// Log every collected failure and return how many there were.
    fn finish(self) -> usize {
        for err in &self.failures {
            warn!(subject = %self.subject, error = %err, "cleanup step failed");
        }
        self.failures.len()
    }
}
