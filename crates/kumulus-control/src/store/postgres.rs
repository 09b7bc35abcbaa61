//! PostgreSQL registry implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kumulus_proto::ContainerStatus;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::error::{ControlError, ControlResult};
use crate::types::{
    AppDeployment, ContainerRecordId, DeploymentContainer, DeploymentId, DeploymentStatus,
    Developer, DeveloperId, DeveloperVm, PlacementCandidate, Provider, ProviderId,
    ProviderResource, ResourceId, VmId, VmStatus,
};

use super::Registry;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS providers (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        wallet_address TEXT NOT NULL UNIQUE,
        is_active BOOLEAN NOT NULL DEFAULT FALSE,
        score INTEGER NOT NULL DEFAULT 50,
        last_lease_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS provider_resources (
        id UUID PRIMARY KEY,
        provider_id UUID NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
        address TEXT NOT NULL,
        cpu_cores INTEGER NOT NULL,
        ram_mb BIGINT NOT NULL,
        storage_gb BIGINT NOT NULL,
        bandwidth_mbps INTEGER NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS developers (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        wallet_address TEXT NOT NULL UNIQUE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS developer_vms (
        id UUID PRIMARY KEY,
        developer_id UUID NOT NULL REFERENCES developers(id) ON DELETE CASCADE,
        resource_id UUID NOT NULL REFERENCES provider_resources(id) ON DELETE CASCADE,
        container_id TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL,
        ram_mb BIGINT NOT NULL,
        cpu_cores INTEGER NOT NULL,
        storage_mb BIGINT NOT NULL,
        ssh_public_key TEXT NOT NULL,
        ssh_port INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'running',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS app_deployments (
        id UUID PRIMARY KEY,
        developer_id UUID NOT NULL REFERENCES developers(id) ON DELETE CASCADE,
        resource_id UUID NOT NULL REFERENCES provider_resources(id) ON DELETE CASCADE,
        app_type TEXT NOT NULL,
        network_name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'creating',
        cpu INTEGER NOT NULL,
        memory_mb BIGINT NOT NULL,
        error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS deployment_containers (
        id UUID PRIMARY KEY,
        deployment_id UUID NOT NULL REFERENCES app_deployments(id) ON DELETE CASCADE,
        container_id TEXT NOT NULL UNIQUE,
        container_type TEXT NOT NULL,
        name TEXT NOT NULL,
        image TEXT NOT NULL,
        cpu INTEGER NOT NULL,
        memory_mb BIGINT NOT NULL,
        external_port INTEGER,
        internal_port INTEGER,
        status TEXT NOT NULL DEFAULT 'creating',
        environment JSONB NOT NULL DEFAULT '{}',
        volumes JSONB NOT NULL DEFAULT '[]',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_resources_provider ON provider_resources (provider_id)",
    "CREATE INDEX IF NOT EXISTS idx_vms_resource_status ON developer_vms (resource_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_vms_developer ON developer_vms (developer_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_deployments_resource_status ON app_deployments (resource_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_deployments_developer ON app_deployments (developer_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_containers_deployment ON deployment_containers (deployment_id)",
];

const PROVIDER_COLUMNS: &str =
    "id, name, email, wallet_address, is_active, score, last_lease_at, created_at, updated_at";

const RESOURCE_COLUMNS: &str =
    "id, provider_id, address, cpu_cores, ram_mb, storage_gb, bandwidth_mbps, created_at";

const DEVELOPER_COLUMNS: &str = "id, name, email, wallet_address, created_at, updated_at";

const VM_COLUMNS: &str = "id, developer_id, resource_id, container_id, username, ram_mb, \
    cpu_cores, storage_mb, ssh_public_key, ssh_port, status, created_at, updated_at";

const DEPLOYMENT_COLUMNS: &str = "id, developer_id, resource_id, app_type, network_name, \
    status, cpu, memory_mb, error, created_at, updated_at";

const CONTAINER_COLUMNS: &str = "id, deployment_id, container_id, container_type, name, image, \
    cpu, memory_mb, external_port, internal_port, status, environment, volumes, created_at, \
    updated_at";

/// PostgreSQL-backed registry.
///
/// The pool is owned by the caller; this type only borrows connections from
/// it.
#[derive(Clone)]
pub struct PostgresRegistry {
    pool: PgPool,
}

impl PostgresRegistry {
    /// Create a registry on an existing connection pool.
    ///
    /// The required tables are created if they don't exist.
    pub async fn from_pool(pool: PgPool) -> ControlResult<Self> {
        let registry = Self { pool };
        registry.ensure_schema().await?;
        Ok(registry)
    }

    async fn ensure_schema(&self) -> ControlResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn row_to_provider(row: &PgRow) -> ControlResult<Provider> {
        Ok(Provider {
            id: ProviderId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            wallet_address: row.try_get("wallet_address")?,
            is_active: row.try_get("is_active")?,
            score: row.try_get("score")?,
            last_lease_at: row.try_get("last_lease_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_resource(row: &PgRow) -> ControlResult<ProviderResource> {
        Ok(ProviderResource {
            id: ResourceId::from_uuid(row.try_get("id")?),
            provider_id: ProviderId::from_uuid(row.try_get("provider_id")?),
            address: row.try_get("address")?,
            cpu_cores: narrow(row.try_get::<i32, _>("cpu_cores")?, "cpu_cores")?,
            ram_mb: narrow(row.try_get::<i64, _>("ram_mb")?, "ram_mb")?,
            storage_gb: narrow(row.try_get::<i64, _>("storage_gb")?, "storage_gb")?,
            bandwidth_mbps: narrow(row.try_get::<i32, _>("bandwidth_mbps")?, "bandwidth_mbps")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_developer(row: &PgRow) -> ControlResult<Developer> {
        Ok(Developer {
            id: DeveloperId::from_uuid(row.try_get("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            wallet_address: row.try_get("wallet_address")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_vm(row: &PgRow) -> ControlResult<DeveloperVm> {
        let status: String = row.try_get("status")?;
        Ok(DeveloperVm {
            id: VmId::from_uuid(row.try_get("id")?),
            developer_id: DeveloperId::from_uuid(row.try_get("developer_id")?),
            resource_id: ResourceId::from_uuid(row.try_get("resource_id")?),
            container_id: row.try_get("container_id")?,
            username: row.try_get("username")?,
            ram_mb: narrow(row.try_get::<i64, _>("ram_mb")?, "ram_mb")?,
            cpu_cores: narrow(row.try_get::<i32, _>("cpu_cores")?, "cpu_cores")?,
            storage_mb: narrow(row.try_get::<i64, _>("storage_mb")?, "storage_mb")?,
            ssh_public_key: row.try_get("ssh_public_key")?,
            ssh_port: narrow(row.try_get::<i32, _>("ssh_port")?, "ssh_port")?,
            status: parse_column(&status, "status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_deployment(row: &PgRow) -> ControlResult<AppDeployment> {
        let app_type: String = row.try_get("app_type")?;
        let status: String = row.try_get("status")?;
        Ok(AppDeployment {
            id: DeploymentId::from_uuid(row.try_get("id")?),
            developer_id: DeveloperId::from_uuid(row.try_get("developer_id")?),
            resource_id: ResourceId::from_uuid(row.try_get("resource_id")?),
            app_type: parse_column(&app_type, "app_type")?,
            network_name: row.try_get("network_name")?,
            status: parse_column(&status, "status")?,
            cpu: narrow(row.try_get::<i32, _>("cpu")?, "cpu")?,
            memory_mb: narrow(row.try_get::<i64, _>("memory_mb")?, "memory_mb")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_container(row: &PgRow) -> ControlResult<DeploymentContainer> {
        let container_type: String = row.try_get("container_type")?;
        let status: String = row.try_get("status")?;
        let environment: serde_json::Value = row.try_get("environment")?;
        let volumes: serde_json::Value = row.try_get("volumes")?;

        let environment: BTreeMap<String, String> = serde_json::from_value(environment)
            .map_err(|e| {
                ControlError::Serialisation(format!("failed to deserialise environment: {e}"))
            })?;
        let volumes: Vec<String> = serde_json::from_value(volumes).map_err(|e| {
            ControlError::Serialisation(format!("failed to deserialise volumes: {e}"))
        })?;

        Ok(DeploymentContainer {
            id: ContainerRecordId::from_uuid(row.try_get("id")?),
            deployment_id: DeploymentId::from_uuid(row.try_get("deployment_id")?),
            container_id: row.try_get("container_id")?,
            container_type: parse_column(&container_type, "container_type")?,
            name: row.try_get("name")?,
            image: row.try_get("image")?,
            cpu: narrow(row.try_get::<i32, _>("cpu")?, "cpu")?,
            memory_mb: narrow(row.try_get::<i64, _>("memory_mb")?, "memory_mb")?,
            external_port: row
                .try_get::<Option<i32>, _>("external_port")?
                .map(|p| narrow(p, "external_port"))
                .transpose()?,
            internal_port: row
                .try_get::<Option<i32>, _>("internal_port")?
                .map(|p| narrow(p, "internal_port"))
                .transpose()?,
            status: parse_column(&status, "status")?,
            environment,
            volumes,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Convert a database integer into the narrower unsigned Rust type.
fn narrow<S, T: TryFrom<S>>(value: S, column: &str) -> ControlResult<T> {
    T::try_from(value)
        .map_err(|_| ControlError::Serialisation(format!("column {column} out of range")))
}

/// Convert an unsigned Rust value into the signed database type.
fn widen<S, T: TryFrom<S>>(value: S, field: &str) -> ControlResult<T> {
    T::try_from(value).map_err(|_| ControlError::validation(format!("{field} is too large")))
}

fn parse_column<T>(value: &str, column: &str) -> ControlResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| {
        ControlError::Serialisation(format!("failed to parse {column} '{value}': {e}"))
    })
}

/// Map constraint violations on insert to the registry's error taxonomy.
fn insert_error(err: sqlx::Error, what: impl FnOnce() -> String) -> ControlError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return ControlError::Conflict(format!("{} already exists", what()));
        }
        if db.is_foreign_key_violation() {
            return ControlError::NotFound(format!("{} references a missing record", what()));
        }
    }
    ControlError::Database(err)
}

fn provider_identity(provider: &Provider) -> String {
    format!(
        "provider with email {} or wallet {}",
        provider.email, provider.wallet_address
    )
}

fn expect_row(rows_affected: u64, what: impl FnOnce() -> String) -> ControlResult<()> {
    if rows_affected == 0 {
        return Err(ControlError::NotFound(what()));
    }
    Ok(())
}

#[async_trait]
impl Registry for PostgresRegistry {
    async fn insert_provider(&self, provider: &Provider) -> ControlResult<()> {
        sqlx::query(&format!(
            "INSERT INTO providers ({PROVIDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(provider.id.as_uuid())
        .bind(&provider.name)
        .bind(&provider.email)
        .bind(&provider.wallet_address)
        .bind(provider.is_active)
        .bind(provider.score)
        .bind(provider.last_lease_at)
        .bind(provider.created_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, || provider_identity(provider)))?;
        Ok(())
    }

    async fn get_provider(&self, id: &ProviderId) -> ControlResult<Option<Provider>> {
        sqlx::query(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(Self::row_to_provider)
        .transpose()
    }

    async fn list_providers(&self) -> ControlResult<Vec<Provider>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM providers ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_provider).collect()
    }

    async fn update_provider(&self, provider: &Provider) -> ControlResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE providers
            SET name = $1, email = $2, wallet_address = $3, score = $4, updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(&provider.name)
        .bind(&provider.email)
        .bind(&provider.wallet_address)
        .bind(provider.score)
        .bind(provider.id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, || provider_identity(provider)))?;
        expect_row(result.rows_affected(), || {
            format!("provider {} not found", provider.id)
        })
    }

    async fn set_provider_active(&self, id: &ProviderId, active: bool) -> ControlResult<()> {
        let result = sqlx::query(
            "UPDATE providers SET is_active = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(active)
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), || format!("provider {id} not found"))
    }

    async fn record_lease(&self, id: &ProviderId, at: DateTime<Utc>) -> ControlResult<()> {
        let result = sqlx::query(
            "UPDATE providers SET last_lease_at = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(at)
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), || format!("provider {id} not found"))
    }

    async fn delete_provider(&self, id: &ProviderId) -> ControlResult<()> {
        let result = sqlx::query("DELETE FROM providers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), || format!("provider {id} not found"))
    }

    async fn insert_resource(&self, resource: &ProviderResource) -> ControlResult<()> {
        sqlx::query(&format!(
            "INSERT INTO provider_resources ({RESOURCE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(resource.id.as_uuid())
        .bind(resource.provider_id.as_uuid())
        .bind(&resource.address)
        .bind(widen::<_, i32>(resource.cpu_cores, "cpu_cores")?)
        .bind(widen::<_, i64>(resource.ram_mb, "ram_mb")?)
        .bind(widen::<_, i64>(resource.storage_gb, "storage_gb")?)
        .bind(widen::<_, i32>(resource.bandwidth_mbps, "bandwidth_mbps")?)
        .bind(resource.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, || format!("resource {}", resource.id)))?;
        Ok(())
    }

    async fn get_resource(&self, id: &ResourceId) -> ControlResult<Option<ProviderResource>> {
        sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM provider_resources WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(Self::row_to_resource)
        .transpose()
    }

    async fn list_resources(
        &self,
        provider_id: &ProviderId,
    ) -> ControlResult<Vec<ProviderResource>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM provider_resources WHERE provider_id = $1 ORDER BY created_at, id"
        ))
        .bind(provider_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_resource).collect()
    }

    async fn insert_developer(&self, developer: &Developer) -> ControlResult<()> {
        sqlx::query(&format!(
            "INSERT INTO developers ({DEVELOPER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(developer.id.as_uuid())
        .bind(&developer.name)
        .bind(&developer.email)
        .bind(&developer.wallet_address)
        .bind(developer.created_at)
        .bind(developer.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            insert_error(e, || {
                format!("developer with wallet {}", developer.wallet_address)
            })
        })?;
        Ok(())
    }

    async fn get_developer(&self, id: &DeveloperId) -> ControlResult<Option<Developer>> {
        sqlx::query(&format!(
            "SELECT {DEVELOPER_COLUMNS} FROM developers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(Self::row_to_developer)
        .transpose()
    }

    async fn get_developer_by_wallet(&self, wallet: &str) -> ControlResult<Option<Developer>> {
        sqlx::query(&format!(
            "SELECT {DEVELOPER_COLUMNS} FROM developers WHERE wallet_address = $1"
        ))
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(Self::row_to_developer)
        .transpose()
    }

    async fn insert_vm(&self, vm: &DeveloperVm) -> ControlResult<()> {
        sqlx::query(&format!(
            "INSERT INTO developer_vms ({VM_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(vm.id.as_uuid())
        .bind(vm.developer_id.as_uuid())
        .bind(vm.resource_id.as_uuid())
        .bind(&vm.container_id)
        .bind(&vm.username)
        .bind(widen::<_, i64>(vm.ram_mb, "ram_mb")?)
        .bind(widen::<_, i32>(vm.cpu_cores, "cpu_cores")?)
        .bind(widen::<_, i64>(vm.storage_mb, "storage_mb")?)
        .bind(&vm.ssh_public_key)
        .bind(i32::from(vm.ssh_port))
        .bind(vm.status.as_str())
        .bind(vm.created_at)
        .bind(vm.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, || format!("VM {}", vm.id)))?;
        Ok(())
    }

    async fn get_vm(&self, id: &VmId) -> ControlResult<Option<DeveloperVm>> {
        sqlx::query(&format!("SELECT {VM_COLUMNS} FROM developer_vms WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(Self::row_to_vm)
            .transpose()
    }

    async fn list_vms(&self, developer_id: &DeveloperId) -> ControlResult<Vec<DeveloperVm>> {
        let rows = sqlx::query(&format!(
            "SELECT {VM_COLUMNS} FROM developer_vms WHERE developer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(developer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_vm).collect()
    }

    async fn update_vm_status(&self, id: &VmId, status: VmStatus) -> ControlResult<()> {
        let result = sqlx::query(
            "UPDATE developer_vms SET status = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(status.as_str())
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), || format!("VM {id} not found"))
    }

    async fn insert_deployment(&self, deployment: &AppDeployment) -> ControlResult<()> {
        sqlx::query(&format!(
            "INSERT INTO app_deployments ({DEPLOYMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(deployment.id.as_uuid())
        .bind(deployment.developer_id.as_uuid())
        .bind(deployment.resource_id.as_uuid())
        .bind(deployment.app_type.as_str())
        .bind(&deployment.network_name)
        .bind(deployment.status.as_str())
        .bind(widen::<_, i32>(deployment.cpu, "cpu")?)
        .bind(widen::<_, i64>(deployment.memory_mb, "memory_mb")?)
        .bind(&deployment.error)
        .bind(deployment.created_at)
        .bind(deployment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, || format!("deployment {}", deployment.id)))?;
        Ok(())
    }

    async fn get_deployment(&self, id: &DeploymentId) -> ControlResult<Option<AppDeployment>> {
        sqlx::query(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM app_deployments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(Self::row_to_deployment)
        .transpose()
    }

    async fn list_deployments(
        &self,
        developer_id: &DeveloperId,
    ) -> ControlResult<Vec<AppDeployment>> {
        let rows = sqlx::query(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM app_deployments WHERE developer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(developer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_deployment).collect()
    }

    async fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        error: Option<&str>,
    ) -> ControlResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE app_deployments
            SET status = $1, error = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        expect_row(result.rows_affected(), || format!("deployment {id} not found"))
    }

    async fn insert_container(&self, container: &DeploymentContainer) -> ControlResult<()> {
        let environment = serde_json::to_value(&container.environment).map_err(|e| {
            ControlError::Serialisation(format!("failed to serialise environment: {e}"))
        })?;
        let volumes = serde_json::to_value(&container.volumes).map_err(|e| {
            ControlError::Serialisation(format!("failed to serialise volumes: {e}"))
        })?;

        sqlx::query(&format!(
            "INSERT INTO deployment_containers ({CONTAINER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(container.id.as_uuid())
        .bind(container.deployment_id.as_uuid())
        .bind(&container.container_id)
        .bind(container.container_type.as_str())
        .bind(&container.name)
        .bind(&container.image)
        .bind(widen::<_, i32>(container.cpu, "cpu")?)
        .bind(widen::<_, i64>(container.memory_mb, "memory_mb")?)
        .bind(container.external_port.map(i32::from))
        .bind(container.internal_port.map(i32::from))
        .bind(container.status.as_str())
        .bind(&environment)
        .bind(&volumes)
        .bind(container.created_at)
        .bind(container.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            insert_error(e, || format!("container {}", container.container_id))
        })?;
        Ok(())
    }

    async fn list_containers(
        &self,
        deployment_id: &DeploymentId,
    ) -> ControlResult<Vec<DeploymentContainer>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTAINER_COLUMNS} FROM deployment_containers WHERE deployment_id = $1 ORDER BY created_at, container_id"
        ))
        .bind(deployment_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_container).collect()
    }

    async fn update_container_status(
        &self,
        deployment_id: &DeploymentId,
        status: ContainerStatus,
    ) -> ControlResult<()> {
        sqlx::query(
            "UPDATE deployment_containers SET status = $1, updated_at = NOW() WHERE deployment_id = $2",
        )
        .bind(status.as_str())
        .bind(deployment_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn placement_candidates(&self) -> ControlResult<Vec<PlacementCandidate>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.provider_id, r.address, r.cpu_cores, r.ram_mb, r.storage_gb,
                   r.bandwidth_mbps, r.created_at,
                   p.score, p.last_lease_at,
                   (SELECT COUNT(*) FROM app_deployments d
                     WHERE d.resource_id = r.id AND d.status <> 'deleted')
                 + (SELECT COUNT(*) FROM developer_vms v
                     WHERE v.resource_id = r.id AND v.status <> 'deleted') AS load
            FROM provider_resources r
            INNER JOIN providers p ON p.id = r.provider_id
            WHERE p.is_active
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PlacementCandidate {
                    resource: Self::row_to_resource(row)?,
                    score: row.try_get("score")?,
                    last_lease_at: row.try_get("last_lease_at")?,
                    load: narrow(row.try_get::<i64, _>("load")?, "load")?,
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for PostgresRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRegistry").finish_non_exhaustive()
    }
}
