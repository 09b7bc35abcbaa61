//! Request and response bodies of the provisioning agent HTTP API.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app::{AppType, ContainerRole};
use crate::error::ProtoError;
use crate::size::Size;

/// Lifecycle command for a VM or a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleOp {
    /// Start stopped containers.
    Start,
    /// Stop running containers.
    Stop,
    /// Stop and remove containers (and the network for deployments).
    Delete,
}

impl LifecycleOp {
    /// Get the operation name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Delete => "delete",
        }
    }

    /// Agent endpoint controlling a VM.
    #[must_use]
    pub const fn vm_path(&self) -> &'static str {
        match self {
            Self::Start => "/start-vm",
            Self::Stop => "/stop-vm",
            Self::Delete => "/delete-vm",
        }
    }

    /// Agent endpoint controlling an application deployment.
    #[must_use]
    pub const fn deployment_path(&self) -> &'static str {
        match self {
            Self::Start => "/start-deployment",
            Self::Stop => "/stop-deployment",
            Self::Delete => "/delete-deployment",
        }
    }

    /// Container status after the operation succeeds.
    #[must_use]
    pub const fn resulting_status(&self) -> ContainerStatus {
        match self {
            Self::Start => ContainerStatus::Running,
            Self::Stop => ContainerStatus::Stopped,
            Self::Delete => ContainerStatus::Deleted,
        }
    }
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single host container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Being created.
    Creating,
    /// Running.
    Running,
    /// Exists but stopped.
    Stopped,
    /// Removed from the host.
    Deleted,
}

impl ContainerStatus {
    /// Get the status name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContainerStatus {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Self::Creating),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "deleted" => Ok(Self::Deleted),
            _ => Err(ProtoError::UnknownValue {
                kind: "container status",
                value: s.to_owned(),
            }),
        }
    }
}

/// `POST /create-vm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVmRequest {
    /// Login created inside the VM.
    pub username: String,
    /// OpenSSH public key authorised for the login.
    pub ssh_key: String,
    /// CPU cores.
    pub cpu: u32,
    /// Memory limit.
    pub memory: Size,
    /// Disk size.
    pub disk: Size,
}

/// Response to `POST /create-vm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVmResponse {
    /// Host container id of the VM.
    pub vm_id: String,
    /// Host port forwarded to the VM's SSH daemon.
    pub ssh_port: u16,
    /// Login created inside the VM.
    pub username: String,
    /// Container status.
    pub status: ContainerStatus,
}

/// `POST /start-vm`, `/stop-vm`, `/delete-vm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmControlRequest {
    /// Host container id of the VM.
    pub vm_id: String,
}

/// Response to a VM lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmControlResponse {
    /// Host container id of the VM.
    pub vm_id: String,
    /// Status after the command.
    pub status: ContainerStatus,
}

/// `POST /create-app`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppRequest {
    /// Deployment id chosen by the control plane; prefixes every host name.
    pub deployment_id: String,
    /// Application stack.
    pub app_type: AppType,
    /// Name of the private network to create.
    pub network_name: String,
    /// CPU override for the main container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// Memory override for the main container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Size>,
}

/// One container created for a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    /// Host container id (the container name).
    pub id: String,
    /// Role within the deployment.
    pub role: ContainerRole,
    /// Image the container runs.
    pub image: String,
    /// CPU cores.
    pub cpu: u32,
    /// Memory limit in mebibytes.
    pub memory_mb: u64,
    /// Host port, for containers exposed outside the deployment network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Port the application listens on inside the container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_port: Option<u16>,
    /// Environment passed to the container.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Volume bindings (`host:container`).
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Container status.
    pub status: ContainerStatus,
}

/// Response to `POST /create-app`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppResponse {
    /// Deployment id.
    pub deployment_id: String,
    /// Private network the containers share.
    pub network_name: String,
    /// Containers in start order.
    pub containers: Vec<ContainerInfo>,
}

/// `POST /start-deployment`, `/stop-deployment`, `/delete-deployment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentControlRequest {
    /// Deployment id.
    pub deployment_id: String,
}

/// Status of one container after a deployment lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatusReport {
    /// Host container id.
    pub id: String,
    /// Role derived from the container name.
    pub role: ContainerRole,
    /// Status after the command.
    pub status: ContainerStatus,
}

/// Response to a deployment lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentControlResponse {
    /// Deployment id.
    pub deployment_id: String,
    /// Aggregate status.
    pub status: ContainerStatus,
    /// Per-container outcome.
    pub containers: Vec<ContainerStatusReport>,
}

/// Captured output of a failed host command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDetails {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Error body returned by both the agent and the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Structured diagnostics, typically [`CommandDetails`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Create an error body without details.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_vm_request_uses_camel_case() {
        let json = r#"{"username":"alice","sshKey":"ssh-ed25519 AAAA","cpu":1,"memory":"512m","disk":"1g"}"#;
        let request: CreateVmRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.ssh_key, "ssh-ed25519 AAAA");
        assert_eq!(request.memory.megabytes(), 512);
        assert_eq!(request.disk.megabytes(), 1024);
    }

    #[test]
    fn create_app_request_omits_empty_overrides() {
        let request = CreateAppRequest {
            deployment_id: "d1".into(),
            app_type: AppType::Odoo,
            network_name: "d1-network".into(),
            cpu: None,
            memory: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["appType"], "odoo");
        assert_eq!(value["networkName"], "d1-network");
        assert!(value.get("cpu").is_none());
    }

    #[test]
    fn error_body_details_are_optional() {
        let body: ErrorBody = serde_json::from_str(r#"{"error":"VM not found"}"#).unwrap();
        assert!(body.details.is_none());

        let body = ErrorBody::new("build failed").with_details(
            serde_json::to_value(CommandDetails {
                stdout: "step 1".into(),
                stderr: "no space".into(),
            })
            .unwrap(),
        );
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["details"]["stderr"], "no space");
    }

    #[test]
    fn lifecycle_paths() {
        assert_eq!(LifecycleOp::Stop.vm_path(), "/stop-vm");
        assert_eq!(LifecycleOp::Delete.deployment_path(), "/delete-deployment");
        assert_eq!(LifecycleOp::Start.resulting_status(), ContainerStatus::Running);
    }
}
