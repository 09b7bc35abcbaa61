//! Developer VM lifecycle.

use chrono::Utc;
use kumulus_proto::validate::{validate_ssh_public_key, validate_username};
use kumulus_proto::{CreateVmRequest, LifecycleOp, Size, VmControlRequest};
use tracing::{error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::types::{DeveloperId, DeveloperVm, VmId, VmStatus};

use super::Orchestrator;

/// A developer's request for a new VM.
#[derive(Debug, Clone)]
pub struct CreateVm {
    /// Login to create inside the VM.
    pub username: String,
    /// Public key authorised for the login.
    pub ssh_public_key: String,
    /// CPU cores.
    pub cpu: u32,
    /// Memory, e.g. `512m`.
    pub memory: String,
    /// Disk, e.g. `1g`.
    pub disk: String,
}

impl CreateVm {
    fn into_agent_request(self) -> ControlResult<CreateVmRequest> {
        validate_username(&self.username)?;
        validate_ssh_public_key(&self.ssh_public_key)?;
        if self.cpu == 0 {
            return Err(ControlError::validation("cpu must be at least 1"));
        }

        Ok(CreateVmRequest {
            memory: Size::parse(&self.memory)?,
            disk: Size::parse(&self.disk)?,
            username: self.username,
            ssh_key: self.ssh_public_key,
            cpu: self.cpu,
        })
    }
}

/// Status a VM has once `op` succeeded on the host.
const fn status_after(op: LifecycleOp) -> VmStatus {
    match op {
        LifecycleOp::Start => VmStatus::Running,
        LifecycleOp::Stop => VmStatus::Stopped,
        LifecycleOp::Delete => VmStatus::Deleted,
    }
}

impl Orchestrator {
    /// Place and create a VM for a developer.
    pub async fn create_vm(
        &self,
        developer_id: DeveloperId,
        request: CreateVm,
    ) -> ControlResult<DeveloperVm> {
        let request = request.into_agent_request()?;
        self.require_developer(&developer_id).await?;

        let candidate = self.scheduler.select_resource().await?;
        let resource = &candidate.resource;

        let created = self.agent.create_vm(&resource.address, &request).await?;

        let now = Utc::now();
        let vm = DeveloperVm {
            id: VmId::generate(),
            developer_id,
            resource_id: resource.id,
            container_id: created.vm_id,
            username: created.username,
            ram_mb: request.memory.megabytes(),
            cpu_cores: request.cpu,
            storage_mb: request.disk.megabytes(),
            ssh_public_key: request.ssh_key,
            ssh_port: created.ssh_port,
            status: VmStatus::Running,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.registry.insert_vm(&vm).await {
            error!(
                container_id = %vm.container_id,
                resource_id = %resource.id,
                error = %e,
                "failed to record VM, removing it from the host"
            );
            let control = VmControlRequest {
                vm_id: vm.container_id.clone(),
            };
            if let Err(cleanup) = self
                .agent
                .control_vm(&resource.address, LifecycleOp::Delete, &control)
                .await
            {
                warn!(container_id = %vm.container_id, error = %cleanup, "VM cleanup failed");
            }
            return Err(e);
        }

        self.record_lease(&candidate).await;

        info!(
            vm_id = %vm.id,
            developer_id = %developer_id,
            resource_id = %resource.id,
            ssh_port = vm.ssh_port,
            "VM created"
        );
        Ok(vm)
    }

    /// Start, stop or delete one of a developer's VMs.
    ///
    /// Starting a running VM, stopping a stopped one, or touching a deleted
    /// one is rejected without contacting the host. Deleting a deleted VM
    /// returns it unchanged.
    pub async fn control_vm(
        &self,
        developer_id: DeveloperId,
        id: VmId,
        op: LifecycleOp,
    ) -> ControlResult<DeveloperVm> {
        let mut vm = self.owned_vm(&developer_id, &id).await?;

        match (op, vm.status) {
            (LifecycleOp::Delete, VmStatus::Deleted) => return Ok(vm),
            (_, VmStatus::Deleted) => {
                return Err(ControlError::validation(format!("VM {id} is deleted")));
            }
            (LifecycleOp::Start, VmStatus::Running) => {
                return Err(ControlError::validation(format!(
                    "VM {id} is already running"
                )));
            }
            (LifecycleOp::Stop, VmStatus::Stopped) => {
                return Err(ControlError::validation(format!(
                    "VM {id} is already stopped"
                )));
            }
            _ => {}
        }

        let resource = self.resource(&vm.resource_id).await?;
        let request = VmControlRequest {
            vm_id: vm.container_id.clone(),
        };

        match self.agent.control_vm(&resource.address, op, &request).await {
            Ok(_) => {
                vm.status = status_after(op);
            }
            Err(e) if e.is_not_found() => {
                warn!(vm_id = %id, op = %op, "VM missing on host, marking deleted");
                self.registry
                    .update_vm_status(&id, VmStatus::Deleted)
                    .await?;
                if op != LifecycleOp::Delete {
                    return Err(ControlError::not_found(format!(
                        "VM {id} no longer exists on its host"
                    )));
                }
                vm.status = VmStatus::Deleted;
                vm.updated_at = Utc::now();
                return Ok(vm);
            }
            Err(e) => return Err(e),
        }

        self.registry.update_vm_status(&id, vm.status).await?;
        vm.updated_at = Utc::now();

        info!(vm_id = %id, op = %op, status = %vm.status, "VM lifecycle command applied");
        Ok(vm)
    }

    /// Get one of a developer's VMs.
    pub async fn get_vm(&self, developer_id: DeveloperId, id: VmId) -> ControlResult<DeveloperVm> {
        self.owned_vm(&developer_id, &id).await
    }

    /// List a developer's VMs, newest first.
    pub async fn list_vms(&self, developer_id: DeveloperId) -> ControlResult<Vec<DeveloperVm>> {
        self.registry.list_vms(&developer_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateVm {
        CreateVm {
            username: "alice".to_owned(),
            ssh_public_key: "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIG4rT3vTt99Ox5kndS4HmgTrKBT8SKzhK4rhGkEVGlCI alice@laptop".to_owned(),
            cpu: 1,
            memory: "512m".to_owned(),
            disk: "1g".to_owned(),
        }
    }

    #[test]
    fn converts_sizes() {
        let converted = request().into_agent_request().unwrap();
        assert_eq!(converted.memory.megabytes(), 512);
        assert_eq!(converted.disk.megabytes(), 1024);
        assert_eq!(converted.ssh_key, request().ssh_public_key);
    }

    #[test]
    fn rejects_bad_input_before_side_effects() {
        let mut bad = request();
        bad.memory = "512".to_owned();
        assert!(matches!(
            bad.into_agent_request(),
            Err(ControlError::Validation(_))
        ));

        let mut bad = request();
        bad.username = "Root; rm -rf /".to_owned();
        assert!(matches!(
            bad.into_agent_request(),
            Err(ControlError::Validation(_))
        ));

        let mut bad = request();
        bad.cpu = 0;
        assert!(bad.into_agent_request().is_err());
    }

    #[test]
    fn lifecycle_status() {
        assert_eq!(status_after(LifecycleOp::Start), VmStatus::Running);
        assert_eq!(status_after(LifecycleOp::Stop), VmStatus::Stopped);
        assert_eq!(status_after(LifecycleOp::Delete), VmStatus::Deleted);
    }
}
