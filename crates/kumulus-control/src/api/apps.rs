//! Application deployment endpoints.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use kumulus_proto::{AppType, ContainerRole, ContainerStatus, LifecycleOp};
use serde::{Deserialize, Serialize};

use crate::error::ControlResult;
use crate::orchestrator::{CreateApp, DeploymentView};
use crate::types::{
    AppDeployment, DeploymentContainer, DeploymentId, DeploymentStatus, DeveloperId,
};

use super::extract::{ApiJson, ApiPath, DeveloperIdentity};
use super::{AppState, HostAddresses};

/// Request to create an application deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppBody {
    /// Application stack.
    pub app_type: AppType,
    /// CPU for the main container.
    #[serde(default)]
    pub cpu: Option<u32>,
    /// Memory for the main container, e.g. `1g`.
    #[serde(default)]
    pub memory: Option<String>,
}

/// Lifecycle request naming a deployment.
#[derive(Debug, Deserialize)]
pub struct AppIdBody {
    /// Deployment id.
    pub id: DeploymentId,
}

/// A deployment as returned to developers.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppResponse {
    /// Deployment id.
    pub id: DeploymentId,
    /// Application stack.
    pub app_type: AppType,
    /// Hosting resource.
    pub resource_id: String,
    /// Address of the hosting machine.
    pub ip_address: String,
    /// Private network on the host.
    pub network_name: String,
    /// Current status.
    pub status: DeploymentStatus,
    /// Total CPU cores.
    pub cpu: u32,
    /// Total memory in megabytes.
    pub memory_mb: u64,
    /// Why the deployment failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Containers, when requested with the deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<ContainerResponse>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One deployment container.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResponse {
    /// Container name on the host.
    pub container_id: String,
    /// Role in the deployment.
    pub container_type: ContainerRole,
    /// Display name.
    pub name: String,
    /// Image.
    pub image: String,
    /// CPU cores.
    pub cpu: u32,
    /// Memory in megabytes.
    pub memory_mb: u64,
    /// Published host port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_port: Option<u16>,
    /// Port inside the deployment network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_port: Option<u16>,
    /// Current status.
    pub status: ContainerStatus,
    /// Environment.
    pub environment: BTreeMap<String, String>,
    /// Volume bindings.
    pub volumes: Vec<String>,
}

impl From<DeploymentContainer> for ContainerResponse {
    fn from(c: DeploymentContainer) -> Self {
        Self {
            container_id: c.container_id,
            container_type: c.container_type,
            name: c.name,
            image: c.image,
            cpu: c.cpu,
            memory_mb: c.memory_mb,
            external_port: c.external_port,
            internal_port: c.internal_port,
            status: c.status,
            environment: c.environment,
            volumes: c.volumes,
        }
    }
}

impl AppResponse {
    fn new(d: AppDeployment, ip_address: String) -> Self {
        Self {
            id: d.id,
            app_type: d.app_type,
            resource_id: d.resource_id.to_string(),
            ip_address,
            network_name: d.network_name,
            status: d.status,
            cpu: d.cpu,
            memory_mb: d.memory_mb,
            error: d.error,
            containers: None,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }

    fn with_containers(view: DeploymentView, ip_address: String) -> Self {
        Self {
            containers: Some(view.containers.into_iter().map(Into::into).collect()),
            ..Self::new(view.deployment, ip_address)
        }
    }
}

/// Create an application deployment on the best available resource.
pub async fn create_app(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiJson(body): ApiJson<CreateAppBody>,
) -> ControlResult<(StatusCode, Json<AppResponse>)> {
    let request = CreateApp {
        app_type: body.app_type,
        cpu: body.cpu,
        memory: body.memory,
    };
    let view = state.orchestrator.create_app(developer_id, request).await?;
    let ip_address = state
        .orchestrator
        .host_address(&view.deployment.resource_id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AppResponse::with_containers(view, ip_address)),
    ))
}

async fn control_app(
    state: &AppState,
    developer_id: DeveloperId,
    id: DeploymentId,
    op: LifecycleOp,
) -> ControlResult<Json<AppResponse>> {
    let deployment = state.orchestrator.control_app(developer_id, id, op).await?;
    let ip_address = state
        .orchestrator
        .host_address(&deployment.resource_id)
        .await?;
    Ok(Json(AppResponse::new(deployment, ip_address)))
}

/// Start a stopped deployment.
pub async fn start_app(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiJson(body): ApiJson<AppIdBody>,
) -> ControlResult<Json<AppResponse>> {
    control_app(&state, developer_id, body.id, LifecycleOp::Start).await
}

/// Stop a running deployment.
pub async fn stop_app(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiJson(body): ApiJson<AppIdBody>,
) -> ControlResult<Json<AppResponse>> {
    control_app(&state, developer_id, body.id, LifecycleOp::Stop).await
}

/// Delete a deployment.
pub async fn delete_app(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiJson(body): ApiJson<AppIdBody>,
) -> ControlResult<Json<AppResponse>> {
    control_app(&state, developer_id, body.id, LifecycleOp::Delete).await
}

/// List the caller's deployments.
pub async fn list_apps(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
) -> ControlResult<Json<Vec<AppResponse>>> {
    let deployments = state.orchestrator.list_apps(developer_id).await?;
    let mut hosts = HostAddresses::new(&state.orchestrator);
    let mut responses = Vec::with_capacity(deployments.len());
    for deployment in deployments {
        let ip_address = hosts.get(deployment.resource_id).await?;
        responses.push(AppResponse::new(deployment, ip_address));
    }
    Ok(Json(responses))
}

/// Get one of the caller's deployments with its containers.
pub async fn get_app(
    State(state): State<AppState>,
    DeveloperIdentity(developer_id): DeveloperIdentity,
    ApiPath(id): ApiPath<DeploymentId>,
) -> ControlResult<Json<AppResponse>> {
    let view = state.orchestrator.get_app(developer_id, id).await?;
    let ip_address = state
        .orchestrator
        .host_address(&view.deployment.resource_id)
        .await?;
    Ok(Json(AppResponse::with_containers(view, ip_address)))
}
