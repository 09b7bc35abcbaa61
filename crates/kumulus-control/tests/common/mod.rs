//! Common test utilities for control-plane integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kumulus_control::api::{self, AppState};
use kumulus_control::error::{ControlError, ControlResult};
use kumulus_control::types::{
    AppDeployment, DeploymentContainer, DeploymentId, DeploymentStatus, Developer, DeveloperId,
    DeveloperVm, PlacementCandidate, Provider, ProviderId, ProviderResource, ResourceId, VmId,
    VmStatus,
};
use kumulus_control::{
    MemoryRegistry, Orchestrator, ProvisioningAgent, Registry, Scheduler, ScoreFirst,
};
use kumulus_proto::{
    AppType, ContainerInfo, ContainerRole, ContainerStatus, ContainerStatusReport,
    CreateAppRequest, CreateAppResponse, CreateVmRequest, CreateVmResponse,
    DeploymentControlRequest, DeploymentControlResponse, LifecycleOp, VmControlRequest,
    VmControlResponse,
};

use fixtures::ProviderBuilder;

/// How a scripted agent call fails.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    /// The VM or deployment does not exist on the host.
    NotFound,
    /// The call exceeded its deadline.
    Timeout,
    /// The host command failed.
    Command,
}

impl Failure {
    fn into_error(self, path: &str) -> ControlError {
        match self {
            Self::NotFound => ControlError::not_found(format!("{path}: no such container")),
            Self::Timeout => ControlError::AgentTimeout(300),
            Self::Command => ControlError::AgentFailure {
                message: format!("{path}: docker exited with status 1"),
                details: Some(serde_json::json!({ "stdout": "", "stderr": "boom" })),
            },
        }
    }
}

/// One call the orchestrator made to the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCall {
    /// Agent endpoint, e.g. `/create-vm`.
    pub path: &'static str,
    /// Resource address the call went to.
    pub address: String,
    /// VM container or deployment the call targeted.
    pub target: String,
}

/// Agent double that records every call and fails on request.
#[derive(Debug, Default)]
pub struct RecordingAgent {
    calls: Mutex<Vec<AgentCall>>,
    failures: Mutex<HashMap<&'static str, Failure>>,
    next_port: AtomicU16,
}

impl RecordingAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call to `path` fail.
    pub fn fail(&self, path: &'static str, failure: Failure) {
        self.failures.lock().unwrap().insert(path, failure);
    }

    /// Clear scripted failures.
    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls made to `path`, in order.
    pub fn calls_to(&self, path: &str) -> Vec<AgentCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.path == path)
            .collect()
    }

    fn record(&self, path: &'static str, address: &str, target: &str) -> ControlResult<()> {
        self.calls.lock().unwrap().push(AgentCall {
            path,
            address: address.to_string(),
            target: target.to_string(),
        });
        match self.failures.lock().unwrap().get(path) {
            Some(failure) => Err(failure.into_error(path)),
            None => Ok(()),
        }
    }

    fn port(&self) -> u16 {
        self.next_port.fetch_add(1, Ordering::SeqCst)
    }
}

fn container(deployment_id: &str, role: ContainerRole, port: Option<u16>) -> ContainerInfo {
    ContainerInfo {
        id: role.container_name(deployment_id),
        role,
        image: format!("registry.test/{role}:latest"),
        cpu: 1,
        memory_mb: 512,
        port,
        internal_port: Some(8080),
        environment: [("ROLE".to_string(), role.to_string())].into(),
        volumes: vec![format!("{deployment_id}-{}:/data", role.name_suffix())],
        status: ContainerStatus::Running,
    }
}

#[async_trait]
impl ProvisioningAgent for RecordingAgent {
    async fn create_vm(
        &self,
        address: &str,
        request: &CreateVmRequest,
    ) -> ControlResult<CreateVmResponse> {
        self.record("/create-vm", address, &request.username)?;
        let n = self.port();
        Ok(CreateVmResponse {
            vm_id: format!("vm-{n}"),
            ssh_port: 2222 + n,
            username: request.username.clone(),
            status: ContainerStatus::Running,
        })
    }

    async fn control_vm(
        &self,
        address: &str,
        op: LifecycleOp,
        request: &VmControlRequest,
    ) -> ControlResult<VmControlResponse> {
        self.record(op.vm_path(), address, &request.vm_id)?;
        Ok(VmControlResponse {
            vm_id: request.vm_id.clone(),
            status: op.resulting_status(),
        })
    }

    async fn create_app(
        &self,
        address: &str,
        request: &CreateAppRequest,
    ) -> ControlResult<CreateAppResponse> {
        self.record("/create-app", address, &request.deployment_id)?;
        let port = Some(8000 + self.port());
        let containers = match request.app_type {
            AppType::Libreoffice => {
                vec![container(&request.deployment_id, ContainerRole::Main, port)]
            }
            _ => vec![
                container(&request.deployment_id, ContainerRole::Database, None),
                container(&request.deployment_id, ContainerRole::Main, port),
            ],
        };
        Ok(CreateAppResponse {
            deployment_id: request.deployment_id.clone(),
            network_name: request.network_name.clone(),
            containers,
        })
    }

    async fn control_deployment(
        &self,
        address: &str,
        op: LifecycleOp,
        request: &DeploymentControlRequest,
    ) -> ControlResult<DeploymentControlResponse> {
        self.record(op.deployment_path(), address, &request.deployment_id)?;
        let status = op.resulting_status();
        Ok(DeploymentControlResponse {
            deployment_id: request.deployment_id.clone(),
            status,
            containers: vec![ContainerStatusReport {
                id: ContainerRole::Main.container_name(&request.deployment_id),
                role: ContainerRole::Main,
                status,
            }],
        })
    }
}

/// Registry wrapper that fails one named operation on request.
#[derive(Debug)]
pub struct FlakyRegistry {
    inner: Arc<MemoryRegistry>,
    failing: Mutex<Option<&'static str>>,
}

impl FlakyRegistry {
    pub fn new(inner: Arc<MemoryRegistry>) -> Self {
        Self {
            inner,
            failing: Mutex::new(None),
        }
    }

    /// Make every later call to `method` fail.
    pub fn fail_on(&self, method: &'static str) {
        *self.failing.lock().unwrap() = Some(method);
    }

    /// Stop failing.
    pub fn heal(&self) {
        *self.failing.lock().unwrap() = None;
    }

    fn check(&self, method: &'static str) -> ControlResult<()> {
        if *self.failing.lock().unwrap() == Some(method) {
            return Err(ControlError::internal(format!("{method} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for FlakyRegistry {
    async fn insert_provider(&self, provider: &Provider) -> ControlResult<()> {
        self.check("insert_provider")?;
        self.inner.insert_provider(provider).await
    }

    async fn get_provider(&self, id: &ProviderId) -> ControlResult<Option<Provider>> {
        self.check("get_provider")?;
        self.inner.get_provider(id).await
    }

    async fn list_providers(&self) -> ControlResult<Vec<Provider>> {
        self.check("list_providers")?;
        self.inner.list_providers().await
    }

    async fn update_provider(&self, provider: &Provider) -> ControlResult<()> {
        self.check("update_provider")?;
        self.inner.update_provider(provider).await
    }

    async fn set_provider_active(&self, id: &ProviderId, active: bool) -> ControlResult<()> {
        self.check("set_provider_active")?;
        self.inner.set_provider_active(id, active).await
    }

    async fn record_lease(&self, id: &ProviderId, at: DateTime<Utc>) -> ControlResult<()> {
        self.check("record_lease")?;
        self.inner.record_lease(id, at).await
    }

    async fn delete_provider(&self, id: &ProviderId) -> ControlResult<()> {
        self.check("delete_provider")?;
        self.inner.delete_provider(id).await
    }

    async fn insert_resource(&self, resource: &ProviderResource) -> ControlResult<()> {
        self.check("insert_resource")?;
        self.inner.insert_resource(resource).await
    }

    async fn get_resource(&self, id: &ResourceId) -> ControlResult<Option<ProviderResource>> {
        self.check("get_resource")?;
        self.inner.get_resource(id).await
    }

    async fn list_resources(
        &self,
        provider_id: &ProviderId,
    ) -> ControlResult<Vec<ProviderResource>> {
        self.check("list_resources")?;
        self.inner.list_resources(provider_id).await
    }

    async fn insert_developer(&self, developer: &Developer) -> ControlResult<()> {
        self.check("insert_developer")?;
        self.inner.insert_developer(developer).await
    }

    async fn get_developer(&self, id: &DeveloperId) -> ControlResult<Option<Developer>> {
        self.check("get_developer")?;
        self.inner.get_developer(id).await
    }

    async fn get_developer_by_wallet(&self, wallet: &str) -> ControlResult<Option<Developer>> {
        self.check("get_developer_by_wallet")?;
        self.inner.get_developer_by_wallet(wallet).await
    }

    async fn insert_vm(&self, vm: &DeveloperVm) -> ControlResult<()> {
        self.check("insert_vm")?;
        self.inner.insert_vm(vm).await
    }

    async fn get_vm(&self, id: &VmId) -> ControlResult<Option<DeveloperVm>> {
        self.check("get_vm")?;
        self.inner.get_vm(id).await
    }

    async fn list_vms(&self, developer_id: &DeveloperId) -> ControlResult<Vec<DeveloperVm>> {
        self.check("list_vms")?;
        self.inner.list_vms(developer_id).await
    }

    async fn update_vm_status(&self, id: &VmId, status: VmStatus) -> ControlResult<()> {
        self.check("update_vm_status")?;
        self.inner.update_vm_status(id, status).await
    }

    async fn insert_deployment(&self, deployment: &AppDeployment) -> ControlResult<()> {
        self.check("insert_deployment")?;
        self.inner.insert_deployment(deployment).await
    }

    async fn get_deployment(&self, id: &DeploymentId) -> ControlResult<Option<AppDeployment>> {
        self.check("get_deployment")?;
        self.inner.get_deployment(id).await
    }

    async fn list_deployments(
        &self,
        developer_id: &DeveloperId,
    ) -> ControlResult<Vec<AppDeployment>> {
        self.check("list_deployments")?;
        self.inner.list_deployments(developer_id).await
    }

    async fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        error: Option<&str>,
    ) -> ControlResult<()> {
        self.check("update_deployment_status")?;
        self.inner.update_deployment_status(id, status, error).await
    }

    async fn insert_container(&self, container: &DeploymentContainer) -> ControlResult<()> {
        self.check("insert_container")?;
        self.inner.insert_container(container).await
    }

    async fn list_containers(
        &self,
        deployment_id: &DeploymentId,
    ) -> ControlResult<Vec<DeploymentContainer>> {
        self.check("list_containers")?;
        self.inner.list_containers(deployment_id).await
    }

    async fn update_container_status(
        &self,
        deployment_id: &DeploymentId,
        status: ContainerStatus,
    ) -> ControlResult<()> {
        self.check("update_container_status")?;
        self.inner.update_container_status(deployment_id, status).await
    }

    async fn placement_candidates(&self) -> ControlResult<Vec<PlacementCandidate>> {
        self.check("placement_candidates")?;
        self.inner.placement_candidates().await
    }
}

/// Complete control plane wired to an in-memory registry and a recording agent.
pub struct TestControl {
    pub memory: Arc<MemoryRegistry>,
    pub registry: Arc<FlakyRegistry>,
    pub agent: Arc<RecordingAgent>,
    pub orchestrator: Arc<Orchestrator>,
    /// The developer tests act as.
    pub developer: DeveloperId,
    /// Another developer, owning filler workloads.
    pub other: DeveloperId,
}

impl TestControl {
    /// Creates a control plane with two registered developers and no providers.
    pub async fn new() -> Self {
        let memory = Arc::new(MemoryRegistry::new());
        let registry = Arc::new(FlakyRegistry::new(Arc::clone(&memory)));
        let agent = Arc::new(RecordingAgent::new());

        let scheduler = Scheduler::new(registry.clone(), Arc::new(ScoreFirst::default()));
        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            scheduler,
            agent.clone(),
        ));

        let developer = Developer::new("alice", "alice@dev.test", "0xalice");
        let other = Developer::new("bob", "bob@dev.test", "0xbob");
        memory.insert_developer(&developer).await.unwrap();
        memory.insert_developer(&other).await.unwrap();

        Self {
            memory,
            registry,
            agent,
            orchestrator,
            developer: developer.id,
            other: other.id,
        }
    }

    /// Registers a provider and its resource.
    pub async fn add_resource(&self, builder: ProviderBuilder) -> ProviderResource {
        let (provider, resource) = builder.build();
        self.memory.insert_provider(&provider).await.unwrap();
        self.memory.insert_resource(&resource).await.unwrap();
        resource
    }

    /// Places `load` running VMs owned by the other developer on `resource`.
    pub async fn fill(&self, resource: &ProviderResource, load: u32) {
        for n in 0..load {
            let now = Utc::now();
            let vm = DeveloperVm {
                id: VmId::generate(),
                developer_id: self.other,
                resource_id: resource.id,
                container_id: format!("filler-{}-{n}", resource.id),
                username: "filler".to_string(),
                ram_mb: 512,
                cpu_cores: 1,
                storage_mb: 1024,
                ssh_public_key: fixtures::SSH_KEY.to_string(),
                ssh_port: 2222,
                status: VmStatus::Running,
                created_at: now,
                updated_at: now,
            };
            self.memory.insert_vm(&vm).await.unwrap();
        }
    }

    /// The provider owning `resource`, as currently stored.
    pub async fn provider_of(&self, resource: &ProviderResource) -> Provider {
        self.memory
            .get_provider(&resource.provider_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub fn writes(&self) -> usize {
        self.memory.write_count()
    }

    /// HTTP router over this control plane.
    pub fn router(&self) -> axum::Router {
        api::router(AppState::new(Arc::clone(&self.orchestrator)))
    }
}
