//! Core types for kumulus-control.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use kumulus_proto::{AppType, ContainerInfo, ContainerRole, ContainerStatus, ProtoError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Score a provider starts with.
pub const DEFAULT_PROVIDER_SCORE: i32 = 50;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ProtoError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| ProtoError::UnknownValue {
                        kind: $kind,
                        value: s.to_owned(),
                    })
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a provider.
    ProviderId,
    "provider id"
);
uuid_id!(
    /// Unique identifier for a provider resource.
    ResourceId,
    "resource id"
);
uuid_id!(
    /// Unique identifier for a developer.
    DeveloperId,
    "developer id"
);
uuid_id!(
    /// Unique identifier for a developer VM lease.
    VmId,
    "vm id"
);
uuid_id!(
    /// Unique identifier for an application deployment.
    ///
    /// Its string form also names the deployment's network and containers on
    /// the host.
    DeploymentId,
    "deployment id"
);
uuid_id!(
    /// Unique identifier for a deployment container record.
    ContainerRecordId,
    "container id"
);

/// An account that supplies hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Provider identifier.
    pub id: ProviderId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Payout wallet.
    pub wallet_address: String,
    /// Only active providers receive workloads.
    pub is_active: bool,
    /// Placement priority; higher wins.
    pub score: i32,
    /// When a workload was last placed on one of this provider's resources.
    pub last_lease_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    /// Create an inactive provider with the default score.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        wallet_address: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProviderId::generate(),
            name: name.into(),
            email: email.into(),
            wallet_address: wallet_address.into(),
            is_active: false,
            score: DEFAULT_PROVIDER_SCORE,
            last_lease_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One schedulable host belonging to a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResource {
    /// Resource identifier.
    pub id: ResourceId,
    /// Owning provider.
    pub provider_id: ProviderId,
    /// IP address or hostname the agent listens on.
    pub address: String,
    /// CPU cores.
    pub cpu_cores: u32,
    /// RAM in megabytes.
    pub ram_mb: u64,
    /// Storage in gigabytes.
    pub storage_gb: u64,
    /// Bandwidth in megabits per second.
    pub bandwidth_mbps: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A developer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Developer {
    /// Developer identifier.
    pub id: DeveloperId,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Billing wallet.
    pub wallet_address: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Developer {
    /// Create a developer record.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        wallet_address: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DeveloperId::generate(),
            name: name.into(),
            email: email.into(),
            wallet_address: wallet_address.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle status of a developer VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    /// Container is running.
    Running,
    /// Container exists but is stopped.
    Stopped,
    /// Container is gone. Terminal.
    Deleted,
}

impl VmStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VmStatus {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "deleted" => Ok(Self::Deleted),
            _ => Err(ProtoError::UnknownValue {
                kind: "vm status",
                value: s.to_owned(),
            }),
        }
    }
}

/// A VM leased by a developer on a provider resource.
///
/// Rows are never removed; deletion is a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperVm {
    /// VM identifier.
    pub id: VmId,
    /// Owning developer.
    pub developer_id: DeveloperId,
    /// Hosting resource.
    pub resource_id: ResourceId,
    /// Container name on the host, as reported by the agent.
    pub container_id: String,
    /// Login user inside the VM.
    pub username: String,
    /// RAM in megabytes.
    pub ram_mb: u64,
    /// CPU cores.
    pub cpu_cores: u32,
    /// Disk in megabytes.
    pub storage_mb: u64,
    /// Authorised SSH public key.
    pub ssh_public_key: String,
    /// Host port forwarded to the VM's sshd.
    pub ssh_port: u16,
    /// Current status.
    pub status: VmStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Persisted status of an application deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Agent call succeeded, records being written.
    Creating,
    /// All containers running.
    Running,
    /// All containers stopped.
    Stopped,
    /// Creation did not complete.
    Failed,
    /// Removed from the host. Terminal.
    Deleted,
}

impl DeploymentStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }

    /// Whether the deployment still counts towards its resource's load.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        !matches!(self, Self::Deleted)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Self::Creating),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            "deleted" => Ok(Self::Deleted),
            _ => Err(ProtoError::UnknownValue {
                kind: "deployment status",
                value: s.to_owned(),
            }),
        }
    }
}

/// A multi-container application instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDeployment {
    /// Deployment identifier.
    pub id: DeploymentId,
    /// Owning developer.
    pub developer_id: DeveloperId,
    /// Hosting resource.
    pub resource_id: ResourceId,
    /// Application type.
    pub app_type: AppType,
    /// Private network on the host.
    pub network_name: String,
    /// Current status.
    pub status: DeploymentStatus,
    /// Total CPU cores across containers.
    pub cpu: u32,
    /// Total memory across containers, in megabytes.
    pub memory_mb: u64,
    /// Reason the deployment failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One container of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentContainer {
    /// Record identifier.
    pub id: ContainerRecordId,
    /// Owning deployment.
    pub deployment_id: DeploymentId,
    /// Container name on the host.
    pub container_id: String,
    /// Role within the deployment.
    pub container_type: ContainerRole,
    /// Human-readable name, `<app>-<role>`.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// CPU cores.
    pub cpu: u32,
    /// RAM in megabytes.
    pub memory_mb: u64,
    /// Published host port.
    pub external_port: Option<u16>,
    /// Port inside the deployment network.
    pub internal_port: Option<u16>,
    /// Current status.
    pub status: ContainerStatus,
    /// Environment passed to the container.
    pub environment: BTreeMap<String, String>,
    /// Volume bindings.
    pub volumes: Vec<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl DeploymentContainer {
    /// Build a record from what the agent reported for one container.
    #[must_use]
    pub fn from_agent(deployment: &AppDeployment, info: &ContainerInfo) -> Self {
        let now = Utc::now();
        Self {
            id: ContainerRecordId::generate(),
            deployment_id: deployment.id,
            container_id: info.id.clone(),
            container_type: info.role,
            name: format!("{}-{}", deployment.app_type, info.role),
            image: info.image.clone(),
            cpu: info.cpu,
            memory_mb: info.memory_mb,
            external_port: info.port,
            internal_port: info.internal_port,
            status: ContainerStatus::Creating,
            environment: info.environment.clone(),
            volumes: info.volumes.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A resource the scheduler may place a workload on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementCandidate {
    /// The resource.
    pub resource: ProviderResource,
    /// Owning provider's score.
    pub score: i32,
    /// Owning provider's last lease.
    pub last_lease_at: Option<DateTime<Utc>>,
    /// Live deployments plus live VMs on the resource.
    pub load: u32,
}
