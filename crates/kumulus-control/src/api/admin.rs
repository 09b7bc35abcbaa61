//! Provider and developer administration.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ControlError, ControlResult};
use crate::types::{
    Developer, DeveloperId, Provider, ProviderId, ProviderResource, ResourceId,
};

use super::extract::{ApiJson, ApiPath};
use super::AppState;

/// Request to register a provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProviderBody {
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Payout wallet.
    pub wallet_address: String,
    /// Initial score; the default when absent.
    #[serde(default)]
    pub score: Option<i32>,
}

/// Partial provider update.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProviderBody {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// New payout wallet.
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// New score.
    #[serde(default)]
    pub score: Option<i32>,
}

/// A provider.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResponse {
    /// Provider id.
    pub id: ProviderId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Payout wallet.
    pub wallet_address: String,
    /// Whether the provider receives workloads.
    pub is_active: bool,
    /// Placement score.
    pub score: i32,
    /// Last placement on one of its resources.
    pub last_lease_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<Provider> for ProviderResponse {
    fn from(p: Provider) -> Self {
        Self {
            id: p.id,
            name: p.name,
            email: p.email,
            wallet_address: p.wallet_address,
            is_active: p.is_active,
            score: p.score,
            last_lease_at: p.last_lease_at,
            created_at: p.created_at,
        }
    }
}

/// Request to add a resource to a provider.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceBody {
    /// Address the host's agent listens on.
    pub address: String,
    /// CPU cores.
    pub cpu_cores: u32,
    /// RAM in megabytes.
    pub ram_mb: u64,
    /// Storage in gigabytes.
    pub storage_gb: u64,
    /// Bandwidth in megabits per second.
    #[serde(default)]
    pub bandwidth_mbps: u32,
}

/// A provider resource.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceResponse {
    /// Resource id.
    pub id: ResourceId,
    /// Owning provider.
    pub provider_id: ProviderId,
    /// Agent address.
    pub address: String,
    /// CPU cores.
    pub cpu_cores: u32,
    /// RAM in megabytes.
    pub ram_mb: u64,
    /// Storage in gigabytes.
    pub storage_gb: u64,
    /// Bandwidth in megabits per second.
    pub bandwidth_mbps: u32,
}

impl From<ProviderResource> for ResourceResponse {
    fn from(r: ProviderResource) -> Self {
        Self {
            id: r.id,
            provider_id: r.provider_id,
            address: r.address,
            cpu_cores: r.cpu_cores,
            ram_mb: r.ram_mb,
            storage_gb: r.storage_gb,
            bandwidth_mbps: r.bandwidth_mbps,
        }
    }
}

/// Request to register a developer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeveloperBody {
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Billing wallet; unique across developers.
    pub wallet_address: String,
}

/// A developer.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperResponse {
    /// Developer id, sent back in the `x-developer-id` header.
    pub id: DeveloperId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Billing wallet.
    pub wallet_address: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<Developer> for DeveloperResponse {
    fn from(d: Developer) -> Self {
        Self {
            id: d.id,
            name: d.name,
            email: d.email,
            wallet_address: d.wallet_address,
            created_at: d.created_at,
        }
    }
}

fn require_non_empty(field: &str, value: &str) -> ControlResult<()> {
    if value.trim().is_empty() {
        return Err(ControlError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

async fn load_provider(state: &AppState, id: &ProviderId) -> ControlResult<Provider> {
    state
        .registry
        .get_provider(id)
        .await?
        .ok_or_else(|| ControlError::not_found(format!("provider {id} not found")))
}

/// Register a provider. New providers are inactive.
pub async fn create_provider(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateProviderBody>,
) -> ControlResult<(StatusCode, Json<ProviderResponse>)> {
    require_non_empty("name", &body.name)?;
    require_non_empty("walletAddress", &body.wallet_address)?;

    let mut provider = Provider::new(body.name, body.email, body.wallet_address);
    if let Some(score) = body.score {
        provider.score = score;
    }
    state.registry.insert_provider(&provider).await?;

    info!(provider_id = %provider.id, "provider registered");
    Ok((StatusCode::CREATED, Json(provider.into())))
}

/// List every provider.
pub async fn list_providers(
    State(state): State<AppState>,
) -> ControlResult<Json<Vec<ProviderResponse>>> {
    let providers = state.registry.list_providers().await?;
    Ok(Json(providers.into_iter().map(Into::into).collect()))
}

/// Update a provider's details or score.
pub async fn update_provider(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProviderId>,
    ApiJson(body): ApiJson<UpdateProviderBody>,
) -> ControlResult<Json<ProviderResponse>> {
    let mut provider = load_provider(&state, &id).await?;

    if let Some(name) = body.name {
        require_non_empty("name", &name)?;
        provider.name = name;
    }
    if let Some(email) = body.email {
        provider.email = email;
    }
    if let Some(wallet) = body.wallet_address {
        require_non_empty("walletAddress", &wallet)?;
        provider.wallet_address = wallet;
    }
    if let Some(score) = body.score {
        provider.score = score;
    }
    provider.updated_at = Utc::now();

    state.registry.update_provider(&provider).await?;
    Ok(Json(provider.into()))
}

/// Remove a provider with its resources and everything placed on them.
pub async fn delete_provider(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProviderId>,
) -> ControlResult<StatusCode> {
    state.registry.delete_provider(&id).await?;
    info!(provider_id = %id, "provider deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn set_active(
    state: &AppState,
    id: ProviderId,
    active: bool,
) -> ControlResult<Json<ProviderResponse>> {
    state.registry.set_provider_active(&id, active).await?;
    info!(provider_id = %id, active, "provider activation changed");
    load_provider(state, &id).await.map(|p| Json(p.into()))
}

/// Make a provider eligible for placement.
pub async fn activate_provider(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProviderId>,
) -> ControlResult<Json<ProviderResponse>> {
    set_active(&state, id, true).await
}

/// Stop placing new workloads on a provider.
pub async fn deactivate_provider(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProviderId>,
) -> ControlResult<Json<ProviderResponse>> {
    set_active(&state, id, false).await
}

/// Add a resource to a provider.
pub async fn create_resource(
    State(state): State<AppState>,
    ApiPath(provider_id): ApiPath<ProviderId>,
    ApiJson(body): ApiJson<CreateResourceBody>,
) -> ControlResult<(StatusCode, Json<ResourceResponse>)> {
    require_non_empty("address", &body.address)?;
    load_provider(&state, &provider_id).await?;

    let resource = ProviderResource {
        id: ResourceId::generate(),
        provider_id,
        address: body.address,
        cpu_cores: body.cpu_cores,
        ram_mb: body.ram_mb,
        storage_gb: body.storage_gb,
        bandwidth_mbps: body.bandwidth_mbps,
        created_at: Utc::now(),
    };
    state.registry.insert_resource(&resource).await?;

    info!(provider_id = %provider_id, resource_id = %resource.id, "resource added");
    Ok((StatusCode::CREATED, Json(resource.into())))
}

/// List a provider's resources.
pub async fn list_resources(
    State(state): State<AppState>,
    ApiPath(provider_id): ApiPath<ProviderId>,
) -> ControlResult<Json<Vec<ResourceResponse>>> {
    load_provider(&state, &provider_id).await?;
    let resources = state.registry.list_resources(&provider_id).await?;
    Ok(Json(resources.into_iter().map(Into::into).collect()))
}

/// Register a developer.
pub async fn create_developer(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateDeveloperBody>,
) -> ControlResult<(StatusCode, Json<DeveloperResponse>)> {
    require_non_empty("name", &body.name)?;
    require_non_empty("walletAddress", &body.wallet_address)?;

    if state
        .registry
        .get_developer_by_wallet(&body.wallet_address)
        .await?
        .is_some()
    {
        return Err(ControlError::Conflict(format!(
            "a developer with wallet {} already exists",
            body.wallet_address
        )));
    }

    let developer = Developer::new(body.name, body.email, body.wallet_address);
    state.registry.insert_developer(&developer).await?;

    info!(developer_id = %developer.id, "developer registered");
    Ok((StatusCode::CREATED, Json(developer.into())))
}
