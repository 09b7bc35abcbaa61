//! HTTP surface of the agent.

use std::sync::Arc;

use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use kumulus_proto::{
    CreateAppRequest, CreateAppResponse, CreateVmRequest, CreateVmResponse,
    DeploymentControlRequest, DeploymentControlResponse, LifecycleOp, VmControlRequest,
    VmControlResponse,
};

use crate::error::{AgentError, AgentResult};
use crate::provisioner::Provisioner;
use crate::runtime::{ContainerSummary, PruneReport};

/// Shared state for agent handlers.
#[derive(Clone, Debug)]
pub struct AgentState {
    /// Host provisioner.
    pub provisioner: Arc<Provisioner>,
}

/// JSON body that rejects malformed input with the agent error body.
#[derive(Debug)]
pub struct AgentJson<T>(pub T);

impl<S, T> FromRequest<S> for AgentJson<T>
where
    S: Send + Sync,
    T: serde::de::DeserializeOwned,
{
    type Rejection = AgentError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AgentError::validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Creates the agent router.
pub fn router(state: AgentState) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_check))
        .route("/containers", get(list_containers))
        .route("/prune", post(prune))
        .route("/create-vm", post(create_vm))
        .route("/start-vm", post(start_vm))
        .route("/stop-vm", post(stop_vm))
        .route("/delete-vm", post(delete_vm))
        .route("/create-app", post(create_app))
        .route("/start-deployment", post(start_deployment))
        .route("/stop-deployment", post(stop_deployment))
        .route("/delete-deployment", post(delete_deployment))
        .with_state(state)
}

async fn banner() -> &'static str {
    "Provision Agent Running !"
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn list_containers(
    State(state): State<AgentState>,
) -> AgentResult<Json<Vec<ContainerSummary>>> {
    state.provisioner.list_containers().await.map(Json)
}

async fn prune(State(state): State<AgentState>) -> AgentResult<Json<PruneReport>> {
    state.provisioner.prune_unused().await.map(Json)
}

async fn create_vm(
    State(state): State<AgentState>,
    AgentJson(request): AgentJson<CreateVmRequest>,
) -> AgentResult<(StatusCode, Json<CreateVmResponse>)> {
    let response = state.provisioner.create_vm(&request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn control_vm(
    state: &AgentState,
    request: &VmControlRequest,
    op: LifecycleOp,
) -> AgentResult<Json<VmControlResponse>> {
    state
        .provisioner
        .control_vm(&request.vm_id, op)
        .await
        .map(Json)
}

async fn start_vm(
    State(state): State<AgentState>,
    AgentJson(request): AgentJson<VmControlRequest>,
) -> AgentResult<Json<VmControlResponse>> {
    control_vm(&state, &request, LifecycleOp::Start).await
}

async fn stop_vm(
    State(state): State<AgentState>,
    AgentJson(request): AgentJson<VmControlRequest>,
) -> AgentResult<Json<VmControlResponse>> {
    control_vm(&state, &request, LifecycleOp::Stop).await
}

async fn delete_vm(
    State(state): State<AgentState>,
    AgentJson(request): AgentJson<VmControlRequest>,
) -> AgentResult<Json<VmControlResponse>> {
    control_vm(&state, &request, LifecycleOp::Delete).await
}

async fn create_app(
    State(state): State<AgentState>,
    AgentJson(request): AgentJson<CreateAppRequest>,
) -> AgentResult<(StatusCode, Json<CreateAppResponse>)> {
    let response = state.provisioner.create_deployment(&request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn control_deployment(
    state: &AgentState,
    request: &DeploymentControlRequest,
    op: LifecycleOp,
) -> AgentResult<Json<DeploymentControlResponse>> {
    state
        .provisioner
        .control_deployment(&request.deployment_id, op)
        .await
        .map(Json)
}

async fn start_deployment(
    State(state): State<AgentState>,
    AgentJson(request): AgentJson<DeploymentControlRequest>,
) -> AgentResult<Json<DeploymentControlResponse>> {
    control_deployment(&state, &request, LifecycleOp::Start).await
}

async fn stop_deployment(
    State(state): State<AgentState>,
    AgentJson(request): AgentJson<DeploymentControlRequest>,
) -> AgentResult<Json<DeploymentControlResponse>> {
    control_deployment(&state, &request, LifecycleOp::Stop).await
}

async fn delete_deployment(
    State(state): State<AgentState>,
    AgentJson(request): AgentJson<DeploymentControlRequest>,
) -> AgentResult<Json<DeploymentControlResponse>> {
    control_deployment(&state, &request, LifecycleOp::Delete).await
}
