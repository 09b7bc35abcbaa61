//! HTTP API for the control service.
//!
//! Provides endpoints for:
//! - Developer VM lifecycle
//! - Application deployment lifecycle
//! - Provider, resource and developer administration
//! - Health and readiness checks
//!
//! Developer endpoints act for the developer named in the `x-developer-id`
//! header.

mod admin;
mod apps;
mod extract;
mod vms;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::error::ControlResult;
use crate::orchestrator::Orchestrator;
use crate::store::Registry;
use crate::types::ResourceId;

pub use admin::{
    CreateDeveloperBody, CreateProviderBody, CreateResourceBody, DeveloperResponse,
    ProviderResponse, ResourceResponse, UpdateProviderBody,
};
pub use apps::{AppIdBody, AppResponse, ContainerResponse, CreateAppBody};
pub use extract::{ApiJson, ApiPath, DeveloperIdentity, DEVELOPER_HEADER};
pub use vms::{CreateVmBody, VmIdBody, VmResponse};

/// Shared application state for the control service.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator for VM and deployment lifecycles.
    pub orchestrator: Arc<Orchestrator>,
    /// Registry for administration and direct queries.
    pub registry: Arc<dyn Registry>,
}

impl AppState {
    /// Build state around an orchestrator, sharing its registry.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let registry = Arc::clone(orchestrator.registry());
        Self {
            orchestrator,
            registry,
        }
    }
}

/// Host addresses for responses, each resource looked up once per request.
struct HostAddresses<'a> {
    orchestrator: &'a Orchestrator,
    known: HashMap<ResourceId, String>,
}

impl<'a> HostAddresses<'a> {
    fn new(orchestrator: &'a Orchestrator) -> Self {
        Self {
            orchestrator,
            known: HashMap::new(),
        }
    }

    async fn get(&mut self, id: ResourceId) -> ControlResult<String> {
        if let Some(address) = self.known.get(&id) {
            return Ok(address.clone());
        }
        let address = self.orchestrator.host_address(&id).await?;
        self.known.insert(id, address.clone());
        Ok(address)
    }
}

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // VMs
        .route("/create-vm", post(vms::create_vm))
        .route("/start-vm", post(vms::start_vm))
        .route("/stop-vm", post(vms::stop_vm))
        .route("/delete-vm", post(vms::delete_vm))
        .route("/vms", get(vms::list_vms))
        .route("/vms/{id}", get(vms::get_vm))
        // Application deployments
        .route("/create-app", post(apps::create_app))
        .route("/start-app", post(apps::start_app))
        .route("/stop-app", post(apps::stop_app))
        .route("/delete-app", post(apps::delete_app))
        .route("/apps", get(apps::list_apps))
        .route("/apps/{id}", get(apps::get_app))
        // Administration
        .route(
            "/providers",
            post(admin::create_provider).get(admin::list_providers),
        )
        .route(
            "/providers/{id}",
            put(admin::update_provider).delete(admin::delete_provider),
        )
        .route(
            "/providers/{id}/resources",
            post(admin::create_resource).get(admin::list_resources),
        )
        .route("/providers/{id}/activate", post(admin::activate_provider))
        .route(
            "/providers/{id}/deactivate",
            post(admin::deactivate_provider),
        )
        .route("/developers", post(admin::create_developer))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Readiness check endpoint: the registry must answer.
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    match state.registry.list_providers().await {
        Ok(providers) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                providers: providers.len(),
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                providers: 0,
            }),
        ),
    }
}

/// Health response.
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Readiness response.
#[derive(serde::Serialize)]
struct ReadyResponse {
    ready: bool,
    providers: usize,
}
