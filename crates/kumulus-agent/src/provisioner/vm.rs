//! VM lifecycle.

use std::path::Path;

use kumulus_proto::validate::validate_identifier;
use kumulus_proto::{
    ContainerStatus, CreateVmRequest, CreateVmResponse, LifecycleOp, VmControlResponse,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{vm_image_tag, Provisioner, Teardown};
use crate::error::{AgentError, AgentResult};
use crate::image::VmImageBuilder;
use crate::ports;
use crate::runtime::RunSpec;

/// SSH port inside every VM container.
const SSH_CONTAINER_PORT: u16 = 22;

impl Provisioner {
    /// Build a VM image for the request and start it with SSH published on
    /// the first free port of the VM range.
    pub async fn create_vm(&self, request: &CreateVmRequest) -> AgentResult<CreateVmResponse> {
        if request.cpu == 0 {
            return Err(AgentError::validation("cpu must be at least 1"));
        }

        let dockerfile = VmImageBuilder::new(&request.username, &request.ssh_key)
            .base_image(&self.docker.vm_base_image)
            .render()?;

        let vm_id = Uuid::new_v4().to_string();
        let ssh_port = ports::allocate(self.ports.as_ref(), self.port_ranges.vm)?;

        info!(
            vm_id = %vm_id,
            username = %request.username,
            ssh_port,
            cpu = request.cpu,
            memory = %request.memory,
            "creating VM"
        );

        let context_dir = self.docker.build_root.join(format!("kumulus-vm-{vm_id}"));
        tokio::fs::create_dir_all(&context_dir).await?;

        let outcome = self
            .build_and_run_vm(&vm_id, &context_dir, &dockerfile, ssh_port, request)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&context_dir).await {
            warn!(vm_id = %vm_id, error = %e, "failed to remove build context");
        }

        match outcome {
            Ok(()) => {
                info!(vm_id = %vm_id, ssh_port, "VM running");
                Ok(CreateVmResponse {
                    vm_id,
                    ssh_port,
                    username: request.username.clone(),
                    status: ContainerStatus::Running,
                })
            }
            Err(err) => {
                error!(vm_id = %vm_id, error = %err, "VM creation failed");
                self.discard_vm(&vm_id).await;
                Err(err)
            }
        }
    }

    async fn build_and_run_vm(
        &self,
        vm_id: &str,
        context_dir: &Path,
        dockerfile: &str,
        ssh_port: u16,
        request: &CreateVmRequest,
    ) -> AgentResult<()> {
        tokio::fs::write(context_dir.join("Dockerfile"), dockerfile).await?;

        let image = vm_image_tag(vm_id);
        self.runtime.build_image(&image, context_dir).await?;

        let mut run = RunSpec::new(vm_id, image)
            .cpus(request.cpu)
            .memory(request.memory)
            .publish(ssh_port, SSH_CONTAINER_PORT);
        for server in &self.docker.dns_servers {
            run = run.dns(server);
        }
        if self.docker.enforce_disk_quota {
            run = run.storage(request.disk);
        }

        self.runtime.run(&run).await
    }

    /// Remove a half-created VM container, if `docker run` got that far.
    async fn discard_vm(&self, vm_id: &str) {
        let mut teardown = Teardown::new(vm_id);
        match self.runtime.container_exists(vm_id).await {
            Ok(true) => teardown.record(self.runtime.remove(vm_id).await),
            Ok(false) => {}
            Err(e) => teardown.push(e),
        }
        teardown.finish();
    }

    /// Start, stop or delete an existing VM.
    pub async fn control_vm(&self, vm_id: &str, op: LifecycleOp) -> AgentResult<VmControlResponse> {
        validate_identifier(vm_id)?;

        if !self.runtime.container_exists(vm_id).await? {
            return Err(AgentError::not_found(format!("VM {vm_id} not found")));
        }

        match op {
            LifecycleOp::Start => self.runtime.start(vm_id).await?,
            LifecycleOp::Stop => self.runtime.stop(vm_id).await?,
            LifecycleOp::Delete => {
                let mut teardown = Teardown::new(vm_id);
                teardown.record(self.runtime.stop(vm_id).await);
                self.runtime.remove(vm_id).await?;
                teardown.finish();
            }
        }

        info!(vm_id = %vm_id, op = %op, "VM lifecycle command applied");

        Ok(VmControlResponse {
            vm_id: vm_id.to_owned(),
            status: op.resulting_status(),
        })
    }
}
