//! Resource registry backends.
//!
//! The registry is the durable record of providers, their resources,
//! developers, and the VMs and deployments placed on those resources. The
//! production implementation uses PostgreSQL; an in-memory implementation
//! backs tests and local runs.

mod memory;
mod postgres;

pub use memory::MemoryRegistry;
pub use postgres::PostgresRegistry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kumulus_proto::ContainerStatus;

use crate::error::ControlResult;
use crate::types::{
    AppDeployment, DeploymentContainer, DeploymentId, DeploymentStatus, Developer, DeveloperId,
    DeveloperVm, PlacementCandidate, Provider, ProviderId, ProviderResource, ResourceId, VmId,
    VmStatus,
};

/// Typed access to persisted state.
///
/// Update operations return `NotFound` when the target row does not exist.
#[async_trait]
pub trait Registry: Send + Sync {
    // --- providers ---

    /// Insert a new provider.
    async fn insert_provider(&self, provider: &Provider) -> ControlResult<()>;

    /// Get a provider by ID.
    async fn get_provider(&self, id: &ProviderId) -> ControlResult<Option<Provider>>;

    /// List all providers, oldest first.
    async fn list_providers(&self) -> ControlResult<Vec<Provider>>;

    /// Replace a provider's mutable fields (name, email, wallet, score).
    async fn update_provider(&self, provider: &Provider) -> ControlResult<()>;

    /// Mark a provider as eligible (or not) for placement.
    async fn set_provider_active(&self, id: &ProviderId, active: bool) -> ControlResult<()>;

    /// Record that a workload was just placed on one of the provider's resources.
    async fn record_lease(&self, id: &ProviderId, at: DateTime<Utc>) -> ControlResult<()>;

    /// Delete a provider, its resources and everything placed on them.
    async fn delete_provider(&self, id: &ProviderId) -> ControlResult<()>;

    // --- resources ---

    /// Insert a resource for an existing provider.
    async fn insert_resource(&self, resource: &ProviderResource) -> ControlResult<()>;

    /// Get a resource by ID.
    async fn get_resource(&self, id: &ResourceId) -> ControlResult<Option<ProviderResource>>;

    /// List a provider's resources.
    async fn list_resources(&self, provider_id: &ProviderId)
        -> ControlResult<Vec<ProviderResource>>;

    // --- developers ---

    /// Insert a developer.
    async fn insert_developer(&self, developer: &Developer) -> ControlResult<()>;

    /// Get a developer by ID.
    async fn get_developer(&self, id: &DeveloperId) -> ControlResult<Option<Developer>>;

    /// Get a developer by wallet address.
    async fn get_developer_by_wallet(&self, wallet: &str) -> ControlResult<Option<Developer>>;

    // --- VMs ---

    /// Insert a VM lease.
    async fn insert_vm(&self, vm: &DeveloperVm) -> ControlResult<()>;

    /// Get a VM by ID.
    async fn get_vm(&self, id: &VmId) -> ControlResult<Option<DeveloperVm>>;

    /// List a developer's VMs, newest first.
    async fn list_vms(&self, developer_id: &DeveloperId) -> ControlResult<Vec<DeveloperVm>>;

    /// Set a VM's status.
    async fn update_vm_status(&self, id: &VmId, status: VmStatus) -> ControlResult<()>;

    // --- deployments ---

    /// Insert a deployment.
    async fn insert_deployment(&self, deployment: &AppDeployment) -> ControlResult<()>;

    /// Get a deployment by ID.
    async fn get_deployment(&self, id: &DeploymentId) -> ControlResult<Option<AppDeployment>>;

    /// List a developer's deployments, newest first.
    async fn list_deployments(
        &self,
        developer_id: &DeveloperId,
    ) -> ControlResult<Vec<AppDeployment>>;

    /// Set a deployment's status and failure reason.
    async fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        error: Option<&str>,
    ) -> ControlResult<()>;

    // --- containers ---

    /// Insert one deployment container.
    async fn insert_container(&self, container: &DeploymentContainer) -> ControlResult<()>;

    /// List a deployment's containers in creation order.
    async fn list_containers(
        &self,
        deployment_id: &DeploymentId,
    ) -> ControlResult<Vec<DeploymentContainer>>;

    /// Set the status of every container of a deployment.
    async fn update_container_status(
        &self,
        deployment_id: &DeploymentId,
        status: ContainerStatus,
    ) -> ControlResult<()>;

    // --- scheduling ---

    /// Every resource of an active provider, with its provider's score,
    /// last lease and the resource's current load.
    async fn placement_candidates(&self) -> ControlResult<Vec<PlacementCandidate>>;
}
