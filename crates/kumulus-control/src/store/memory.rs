//! In-memory registry for tests and local runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kumulus_proto::ContainerStatus;

use crate::error::{ControlError, ControlResult};
use crate::types::{
    AppDeployment, DeploymentContainer, DeploymentId, DeploymentStatus, Developer, DeveloperId,
    DeveloperVm, PlacementCandidate, Provider, ProviderId, ProviderResource, ResourceId, VmId,
    VmStatus,
};

use super::Registry;

#[derive(Debug, Default)]
struct Tables {
    providers: HashMap<ProviderId, Provider>,
    resources: HashMap<ResourceId, ProviderResource>,
    developers: HashMap<DeveloperId, Developer>,
    vms: HashMap<VmId, DeveloperVm>,
    deployments: HashMap<DeploymentId, AppDeployment>,
    containers: Vec<DeploymentContainer>,
}

/// In-memory registry.
///
/// Data is lost when the process exits. Every successful mutation bumps a
/// counter so tests can assert that a failed operation wrote nothing.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    tables: RwLock<Tables>,
    writes: AtomicUsize,
}

impl MemoryRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful mutations so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read(&self) -> ControlResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    fn write(&self) -> ControlResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Tables {
    /// Email and wallet are unique across providers.
    fn check_provider_contact(&self, provider: &Provider) -> ControlResult<()> {
        if self.providers.values().any(|p| {
            p.id != provider.id
                && (p.email == provider.email || p.wallet_address == provider.wallet_address)
        }) {
            return Err(ControlError::Conflict(format!(
                "provider with email {} or wallet {} already exists",
                provider.email, provider.wallet_address
            )));
        }
        Ok(())
    }

    fn check_owner(
        &self,
        developer_id: &DeveloperId,
        resource_id: &ResourceId,
    ) -> ControlResult<()> {
        if !self.developers.contains_key(developer_id) {
            return Err(ControlError::not_found(format!("developer {developer_id} not found")));
        }
        if !self.resources.contains_key(resource_id) {
            return Err(ControlError::not_found(format!("resource {resource_id} not found")));
        }
        Ok(())
    }
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn insert_provider(&self, provider: &Provider) -> ControlResult<()> {
        let mut tables = self.write()?;
        if tables.providers.contains_key(&provider.id) {
            return Err(ControlError::Conflict(format!(
                "provider {} already exists",
                provider.id
            )));
        }
        tables.check_provider_contact(provider)?;
        tables.providers.insert(provider.id, provider.clone());
        self.wrote();
        Ok(())
    }

    async fn get_provider(&self, id: &ProviderId) -> ControlResult<Option<Provider>> {
        Ok(self.read()?.providers.get(id).cloned())
    }

    async fn list_providers(&self) -> ControlResult<Vec<Provider>> {
        let mut providers: Vec<_> = self.read()?.providers.values().cloned().collect();
        providers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(providers)
    }

    async fn update_provider(&self, provider: &Provider) -> ControlResult<()> {
        let mut tables = self.write()?;
        if !tables.providers.contains_key(&provider.id) {
            return Err(ControlError::not_found(format!("provider {} not found", provider.id)));
        }
        tables.check_provider_contact(provider)?;
        let existing = tables
            .providers
            .get_mut(&provider.id)
            .ok_or_else(|| ControlError::not_found(format!("provider {} not found", provider.id)))?;
        existing.name.clone_from(&provider.name);
        existing.email.clone_from(&provider.email);
        existing.wallet_address.clone_from(&provider.wallet_address);
        existing.score = provider.score;
        existing.updated_at = Utc::now();
        self.wrote();
        Ok(())
    }

    async fn set_provider_active(&self, id: &ProviderId, active: bool) -> ControlResult<()> {
        let mut tables = self.write()?;
        let provider = tables
            .providers
            .get_mut(id)
            .ok_or_else(|| ControlError::not_found(format!("provider {id} not found")))?;
        provider.is_active = active;
        provider.updated_at = Utc::now();
        self.wrote();
        Ok(())
    }

    async fn record_lease(&self, id: &ProviderId, at: DateTime<Utc>) -> ControlResult<()> {
        let mut tables = self.write()?;
        let provider = tables
            .providers
            .get_mut(id)
            .ok_or_else(|| ControlError::not_found(format!("provider {id} not found")))?;
        provider.last_lease_at = Some(at);
        provider.updated_at = Utc::now();
        self.wrote();
        Ok(())
    }

    async fn delete_provider(&self, id: &ProviderId) -> ControlResult<()> {
        let mut tables = self.write()?;
        if tables.providers.remove(id).is_none() {
            return Err(ControlError::not_found(format!("provider {id} not found")));
        }

        let Tables {
            resources,
            vms,
            deployments,
            containers,
            ..
        } = &mut *tables;

        resources.retain(|_, r| r.provider_id != *id);
        vms.retain(|_, vm| resources.contains_key(&vm.resource_id));
        deployments.retain(|_, d| resources.contains_key(&d.resource_id));
        containers.retain(|c| deployments.contains_key(&c.deployment_id));

        self.wrote();
        Ok(())
    }

    async fn insert_resource(&self, resource: &ProviderResource) -> ControlResult<()> {
        let mut tables = self.write()?;
        if !tables.providers.contains_key(&resource.provider_id) {
            return Err(ControlError::not_found(format!(
                "provider {} not found",
                resource.provider_id
            )));
        }
        tables.resources.insert(resource.id, resource.clone());
        self.wrote();
        Ok(())
    }

    async fn get_resource(&self, id: &ResourceId) -> ControlResult<Option<ProviderResource>> {
        Ok(self.read()?.resources.get(id).cloned())
    }

    async fn list_resources(
        &self,
        provider_id: &ProviderId,
    ) -> ControlResult<Vec<ProviderResource>> {
        let mut resources: Vec<_> = self
            .read()?
            .resources
            .values()
            .filter(|r| r.provider_id == *provider_id)
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(resources)
    }

    async fn insert_developer(&self, developer: &Developer) -> ControlResult<()> {
        let mut tables = self.write()?;
        if tables
            .developers
            .values()
            .any(|d| d.id == developer.id || d.wallet_address == developer.wallet_address)
        {
            return Err(ControlError::Conflict(format!(
                "developer with wallet {} already exists",
                developer.wallet_address
            )));
        }
        tables.developers.insert(developer.id, developer.clone());
        self.wrote();
        Ok(())
    }

    async fn get_developer(&self, id: &DeveloperId) -> ControlResult<Option<Developer>> {
        Ok(self.read()?.developers.get(id).cloned())
    }

    async fn get_developer_by_wallet(&self, wallet: &str) -> ControlResult<Option<Developer>> {
        Ok(self
            .read()?
            .developers
            .values()
            .find(|d| d.wallet_address == wallet)
            .cloned())
    }

    async fn insert_vm(&self, vm: &DeveloperVm) -> ControlResult<()> {
        let mut tables = self.write()?;
        if tables
            .vms
            .values()
            .any(|v| v.id == vm.id || v.container_id == vm.container_id)
        {
            return Err(ControlError::Conflict(format!(
                "VM with container {} already exists",
                vm.container_id
            )));
        }
        tables.check_owner(&vm.developer_id, &vm.resource_id)?;
        tables.vms.insert(vm.id, vm.clone());
        self.wrote();
        Ok(())
    }

    async fn get_vm(&self, id: &VmId) -> ControlResult<Option<DeveloperVm>> {
        Ok(self.read()?.vms.get(id).cloned())
    }

    async fn list_vms(&self, developer_id: &DeveloperId) -> ControlResult<Vec<DeveloperVm>> {
        let mut vms: Vec<_> = self
            .read()?
            .vms
            .values()
            .filter(|vm| vm.developer_id == *developer_id)
            .cloned()
            .collect();
        newest_first(&mut vms, |vm| vm.created_at);
        Ok(vms)
    }

    async fn update_vm_status(&self, id: &VmId, status: VmStatus) -> ControlResult<()> {
        let mut tables = self.write()?;
        let vm = tables
            .vms
            .get_mut(id)
            .ok_or_else(|| ControlError::not_found(format!("VM {id} not found")))?;
        vm.status = status;
        vm.updated_at = Utc::now();
        self.wrote();
        Ok(())
    }

    async fn insert_deployment(&self, deployment: &AppDeployment) -> ControlResult<()> {
        let mut tables = self.write()?;
        if tables.deployments.contains_key(&deployment.id) {
            return Err(ControlError::Conflict(format!(
                "deployment {} already exists",
                deployment.id
            )));
        }
        tables.check_owner(&deployment.developer_id, &deployment.resource_id)?;
        tables.deployments.insert(deployment.id, deployment.clone());
        self.wrote();
        Ok(())
    }

    async fn get_deployment(&self, id: &DeploymentId) -> ControlResult<Option<AppDeployment>> {
        Ok(self.read()?.deployments.get(id).cloned())
    }

    async fn list_deployments(
        &self,
        developer_id: &DeveloperId,
    ) -> ControlResult<Vec<AppDeployment>> {
        let mut deployments: Vec<_> = self
            .read()?
            .deployments
            .values()
            .filter(|d| d.developer_id == *developer_id)
            .cloned()
            .collect();
        newest_first(&mut deployments, |d| d.created_at);
        Ok(deployments)
    }

    async fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        error: Option<&str>,
    ) -> ControlResult<()> {
        let mut tables = self.write()?;
        let deployment = tables
            .deployments
            .get_mut(id)
            .ok_or_else(|| ControlError::not_found(format!("deployment {id} not found")))?;
        deployment.status = status;
        deployment.error = error.map(ToOwned::to_owned);
        deployment.updated_at = Utc::now();
        self.wrote();
        Ok(())
    }

    async fn insert_container(&self, container: &DeploymentContainer) -> ControlResult<()> {
        let mut tables = self.write()?;
        if !tables.deployments.contains_key(&container.deployment_id) {
            return Err(ControlError::not_found(format!(
                "deployment {} not found",
                container.deployment_id
            )));
        }
        if tables
            .containers
            .iter()
            .any(|c| c.id == container.id || c.container_id == container.container_id)
        {
            return Err(ControlError::Conflict(format!(
                "container {} already exists",
                container.container_id
            )));
        }
        tables.containers.push(container.clone());
        self.wrote();
        Ok(())
    }

    async fn list_containers(
        &self,
        deployment_id: &DeploymentId,
    ) -> ControlResult<Vec<DeploymentContainer>> {
        Ok(self
            .read()?
            .containers
            .iter()
            .filter(|c| c.deployment_id == *deployment_id)
            .cloned()
            .collect())
    }

    async fn update_container_status(
        &self,
        deployment_id: &DeploymentId,
        status: ContainerStatus,
    ) -> ControlResult<()> {
        let mut tables = self.write()?;
        let now = Utc::now();
        for container in tables
            .containers
            .iter_mut()
            .filter(|c| c.deployment_id == *deployment_id)
        {
            container.status = status;
            container.updated_at = now;
        }
        self.wrote();
        Ok(())
    }

    async fn placement_candidates(&self) -> ControlResult<Vec<PlacementCandidate>> {
        let tables = self.read()?;

        let mut load: HashMap<ResourceId, u32> = HashMap::new();
        for resource_id in tables
            .deployments
            .values()
            .filter(|d| d.status.is_live())
            .map(|d| d.resource_id)
            .chain(
                tables
                    .vms
                    .values()
                    .filter(|vm| vm.status != VmStatus::Deleted)
                    .map(|vm| vm.resource_id),
            )
        {
            *load.entry(resource_id).or_default() += 1;
        }

        Ok(tables
            .resources
            .values()
            .filter_map(|resource| {
                let provider = tables.providers.get(&resource.provider_id)?;
                provider.is_active.then(|| PlacementCandidate {
                    resource: resource.clone(),
                    score: provider.score,
                    last_lease_at: provider.last_lease_at,
                    load: load.get(&resource.id).copied().unwrap_or(0),
                })
            })
            .collect())
    }
}
