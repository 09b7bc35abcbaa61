//! Developer VM endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use kumulus_proto::LifecycleOp;
use serde::{Deserialize, Serialize};

use crate::error::ControlResult;
use crate::orchestrator::CreateVm;
use crate::types::{DeveloperId, DeveloperVm, VmId, VmStatus};

use super::extract::{ApiJson, ApiPath, DeveloperIdentity};
use super::{AppState, HostAddresses};

/// Request to create a VM.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVmBody {
    /// Login to create inside the VM.
    pub username: String,
    /// OpenSSH public key for the login.
    pub ssh_public_key: String,
    /// CPU cores.
    pub cpu: u32,
    /// Memory, e.g. `512m`.
    pub memory: String,
    /// Disk, e.g. `1g`.
    pub disk: String,
}

/// Lifecycle request naming a VM.
#[derive(Debug, Deserialize)]
pub struct VmIdBody {
    /// VM id.
    pub id: VmId,
}

/// A VM as returned to developers.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmResponse {
    /// VM id.
    pub id: VmId,
    /// Hosting resource.
    pub resource_id: String,
    /// Container name on the host.
    pub container_id: String,
    /// Login inside the VM.
    pub username: String,
    /// CPU cores.
    pub cpu: u32,
    /// Memory in megabytes.
    pub memory_mb: u64,
    /// Disk in megabytes.
    pub storage_mb: u64,
    /// Address of the hosting machine.
    pub ip_address: String,
    /// Host port forwarded to sshd.
    pub ssh_port: u16,
    /// Current status.
    pub status: VmStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl VmResponse {
    fn new(vm: DeveloperVm, ip_address: String) -> Self {
        Self {
            id: vm.id,
            resource_id: vm.resource_id.to_string(),
            container_id: vm.container_id,
            username: vm.username,
            cpu: vm.cpu_cores,
            memory_mb: vm.ram_mb,
            storage_mb: vm.storage_mb,
            ip_address,
            ssh_port: vm.ssh_port,
            status: vm.status,
            created_at: vm.created_at,
            updated_at: vm.updated_at,
        }
    }
}

/// Create a VM on the best available resource.
pub async fn create_vm(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiJson(body): ApiJson<CreateVmBody>,
) -> ControlResult<(StatusCode, Json<VmResponse>)> {
    let request = CreateVm {
        username: body.username,
        ssh_public_key: body.ssh_public_key,
        cpu: body.cpu,
        memory: body.memory,
        disk: body.disk,
    };
    let vm = state.orchestrator.create_vm(developer_id, request).await?;
    Ok((StatusCode::CREATED, Json(respond(&state, vm).await?)))
}

async fn respond(state: &AppState, vm: DeveloperVm) -> ControlResult<VmResponse> {
    let ip_address = state.orchestrator.host_address(&vm.resource_id).await?;
    Ok(VmResponse::new(vm, ip_address))
}

async fn control_vm(
    state: &AppState,
    developer_id: DeveloperId,
    id: VmId,
    op: LifecycleOp,
) -> ControlResult<Json<VmResponse>> {
    let vm = state.orchestrator.control_vm(developer_id, id, op).await?;
    Ok(Json(respond(state, vm).await?))
}

/// Start a stopped VM.
pub async fn start_vm(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiJson(body): ApiJson<VmIdBody>,
) -> ControlResult<Json<VmResponse>> {
    control_vm(&state, developer_id, body.id, LifecycleOp::Start).await
}

/// Stop a running VM.
pub async fn stop_vm(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiJson(body): ApiJson<VmIdBody>,
) -> ControlResult<Json<VmResponse>> {
    control_vm(&state, developer_id, body.id, LifecycleOp::Stop).await
}

/// Delete a VM.
pub async fn delete_vm(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiJson(body): ApiJson<VmIdBody>,
) -> ControlResult<Json<VmResponse>> {
    control_vm(&state, developer_id, body.id, LifecycleOp::Delete).await
}

/// List the caller's VMs.
pub async fn list_vms(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
) -> ControlResult<Json<Vec<VmResponse>>> {
    let vms = state.orchestrator.list_vms(developer_id).await?;
    let mut hosts = HostAddresses::new(&state.orchestrator);
    let mut responses = Vec::with_capacity(vms.len());
    for vm in vms {
        let ip_address = hosts.get(vm.resource_id).await?;
        responses.push(VmResponse::new(vm, ip_address));
    }
    Ok(Json(responses))
}

/// Get one of the caller's VMs.
pub async fn get_vm(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiPath(id): ApiPath<VmId>,
) -> ControlResult<Json<VmResponse>> {
    let vm = state.orchestrator.get_vm(developer_id, id).await?;
    Ok(Json(respond(&state, vm).await?))
}
