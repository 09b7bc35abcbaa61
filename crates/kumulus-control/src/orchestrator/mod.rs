//! Sequencing of scheduling, agent calls and registry writes.
//!
//! Every operation follows the same order: check locally, act on the host,
//! then record the outcome. A failed agent call therefore leaves the
//! registry untouched, and a registry row always describes something the
//! host actually did.

mod app;
mod vm;

pub use app::{CreateApp, DeploymentView};
pub use vm::CreateVm;

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::agent::ProvisioningAgent;
use crate::error::{ControlError, ControlResult};
use crate::scheduler::Scheduler;
use crate::store::Registry;
use crate::types::{
    AppDeployment, DeploymentId, Developer, DeveloperId, DeveloperVm, PlacementCandidate,
    ProviderResource, ResourceId, VmId,
};

/// Drives VM and deployment lifecycles for developers.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<dyn Registry>,
    scheduler: Scheduler,
    agent: Arc<dyn ProvisioningAgent>,
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        registry: Arc<dyn Registry>,
        scheduler: Scheduler,
        agent: Arc<dyn ProvisioningAgent>,
    ) -> Self {
        Self {
            registry,
            scheduler,
            agent,
        }
    }

    /// The registry this orchestrator writes to.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    async fn require_developer(&self, id: &DeveloperId) -> ControlResult<Developer> {
        self.registry
            .get_developer(id)
            .await?
            .ok_or_else(|| ControlError::Unauthenticated(format!("unknown developer {id}")))
    }

    /// Address of the host behind a resource.
    pub async fn host_address(&self, id: &ResourceId) -> ControlResult<String> {
        self.resource(id).await.map(|resource| resource.address)
    }

    async fn resource(&self, id: &ResourceId) -> ControlResult<ProviderResource> {
        self.registry
            .get_resource(id)
            .await?
            .ok_or_else(|| ControlError::not_found(format!("resource {id} not found")))
    }

    /// Load a VM, hiding other developers' VMs.
    async fn owned_vm(&self, developer_id: &DeveloperId, id: &VmId) -> ControlResult<DeveloperVm> {
        match self.registry.get_vm(id).await? {
            Some(vm) if vm.developer_id == *developer_id => Ok(vm),
            _ => Err(ControlError::not_found(format!("VM {id} not found"))),
        }
    }

    /// Load a deployment, hiding other developers' deployments.
    async fn owned_deployment(
        &self,
        developer_id: &DeveloperId,
        id: &DeploymentId,
    ) -> ControlResult<AppDeployment> {
        match self.registry.get_deployment(id).await? {
            Some(deployment) if deployment.developer_id == *developer_id => Ok(deployment),
            _ => Err(ControlError::not_found(format!("deployment {id} not found"))),
        }
    }

    /// Stamp the provider so equal-score ties rotate to someone else next.
    async fn record_lease(&self, candidate: &PlacementCandidate) {
        let provider_id = candidate.resource.provider_id;
        if let Err(e) = self.registry.record_lease(&provider_id, Utc::now()).await {
            warn!(provider_id = %provider_id, error = %e, "failed to record lease");
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
