//! Test fixtures for control-plane integration tests.

use chrono::{DateTime, Utc};
use kumulus_control::orchestrator::{CreateApp, CreateVm};
use kumulus_control::types::{Provider, ProviderResource, ResourceId};
use kumulus_proto::AppType;

/// A key that passes the SSH public key allow-list.
pub const SSH_KEY: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIMx9lG3kJ0hZrjmN4cQ2bqk8b0Zf1J9t2GfP6mHcXy3p dev@laptop";

/// Builder for a provider with a single resource.
pub struct ProviderBuilder {
    name: String,
    address: String,
    score: i32,
    active: bool,
    last_lease_at: Option<DateTime<Utc>>,
}

impl ProviderBuilder {
    /// Creates an active provider with the default score.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            address: format!("{name}.hosts.test"),
            score: 50,
            active: true,
            last_lease_at: None,
        }
    }

    /// Sets the provider's score.
    pub fn with_score(mut self, score: i32) -> Self {
        self.score = score;
        self
    }

    /// Sets the address of the provider's resource.
    pub fn with_address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    /// Sets when the provider last received a workload.
    pub fn with_last_lease(mut self, at: DateTime<Utc>) -> Self {
        self.last_lease_at = Some(at);
        self
    }

    /// Marks the provider inactive.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Builds the provider and its resource.
    pub fn build(self) -> (Provider, ProviderResource) {
        let mut provider = Provider::new(
            &self.name,
            format!("{}@providers.test", self.name),
            format!("0x{}", self.name),
        );
        provider.score = self.score;
        provider.is_active = self.active;
        provider.last_lease_at = self.last_lease_at;

        let resource = ProviderResource {
            id: ResourceId::generate(),
            provider_id: provider.id,
            address: self.address,
            cpu_cores: 16,
            ram_mb: 65_536,
            storage_gb: 1_000,
            bandwidth_mbps: 1_000,
            created_at: Utc::now(),
        };

        (provider, resource)
    }
}

/// A valid VM request: one core, 512 MB of memory and 1 GB of disk.
pub fn vm_request() -> CreateVm {
    CreateVm {
        username: "alice".to_string(),
        ssh_public_key: SSH_KEY.to_string(),
        cpu: 1,
        memory: "512m".to_string(),
        disk: "1g".to_string(),
    }
}

/// A request for an application with catalog defaults.
pub fn app_request(app_type: AppType) -> CreateApp {
    CreateApp {
        app_type,
        cpu: None,
        memory: None,
    }
}
