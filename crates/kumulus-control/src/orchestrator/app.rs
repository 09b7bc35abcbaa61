//! Application deployment lifecycle.

use chrono::Utc;
use kumulus_proto::{
    AppType, ContainerInfo, ContainerStatus, CreateAppRequest, DeploymentControlRequest,
    LifecycleOp, Size,
};
use tracing::{error, info, warn};

use crate::error::{ControlError, ControlResult};
use crate::state::{AnyDeployment, Creating, Deployment};
use crate::types::{
    AppDeployment, DeploymentContainer, DeploymentId, DeploymentStatus, DeveloperId,
};

use super::Orchestrator;

/// A developer's request for a new application deployment.
#[derive(Debug, Clone)]
pub struct CreateApp {
    /// Application stack.
    pub app_type: AppType,
    /// CPU for the main container; the catalog default when absent.
    pub cpu: Option<u32>,
    /// Memory for the main container, e.g. `1g`.
    pub memory: Option<String>,
}

/// A deployment together with its containers.
#[derive(Debug, Clone)]
pub struct DeploymentView {
    /// The deployment.
    pub deployment: AppDeployment,
    /// Its containers, in creation order.
    pub containers: Vec<DeploymentContainer>,
}

type CreationFailure = (Option<Deployment<Creating>>, ControlError);

impl Orchestrator {
    /// Place and create an application deployment.
    ///
    /// The deployment id is chosen here so the agent can name the network
    /// and containers after it. If recording the result fails, the
    /// deployment is marked failed (when its row exists) and removed from
    /// the host.
    pub async fn create_app(
        &self,
        developer_id: DeveloperId,
        request: CreateApp,
    ) -> ControlResult<DeploymentView> {
        if request.cpu == Some(0) {
            return Err(ControlError::validation("cpu must be at least 1"));
        }
        let memory = request.memory.as_deref().map(Size::parse).transpose()?;
        self.require_developer(&developer_id).await?;

        let candidate = self.scheduler.select_resource().await?;
        let resource = &candidate.resource;

        let id = DeploymentId::generate();
        let agent_request = CreateAppRequest {
            deployment_id: id.to_string(),
            app_type: request.app_type,
            network_name: format!("{id}-network"),
            cpu: request.cpu,
            memory,
        };

        info!(
            deployment_id = %id,
            app_type = %request.app_type,
            resource_id = %resource.id,
            "creating deployment"
        );
        let created = self.agent.create_app(&resource.address, &agent_request).await?;

        let now = Utc::now();
        let creating = Deployment::<Creating>::create(AppDeployment {
            id,
            developer_id,
            resource_id: resource.id,
            app_type: request.app_type,
            network_name: created.network_name,
            status: DeploymentStatus::Creating,
            cpu: created.containers.iter().map(|c| c.cpu).sum(),
            memory_mb: created.containers.iter().map(|c| c.memory_mb).sum(),
            error: None,
            created_at: now,
            updated_at: now,
        });

        match self.record_creation(creating, &created.containers).await {
            Ok(view) => {
                self.record_lease(&candidate).await;
                info!(
                    deployment_id = %id,
                    containers = view.containers.len(),
                    "deployment running"
                );
                Ok(view)
            }
            Err((creating, e)) => {
                error!(deployment_id = %id, error = %e, "failed to record deployment");
                self.abandon_creation(&resource.address, &id, creating, &e)
                    .await;
                Err(e)
            }
        }
    }

    async fn record_creation(
        &self,
        creating: Deployment<Creating>,
        containers: &[ContainerInfo],
    ) -> Result<DeploymentView, CreationFailure> {
        if let Err(e) = self.registry.insert_deployment(creating.data()).await {
            return Err((None, e));
        }

        let mut records = Vec::with_capacity(containers.len());
        for info in containers {
            let record = DeploymentContainer::from_agent(creating.data(), info);
            if let Err(e) = self.registry.insert_container(&record).await {
                return Err((Some(creating), e));
            }
            records.push(record);
        }

        let id = *creating.id();
        let written = async {
            self.registry
                .update_deployment_status(&id, DeploymentStatus::Running, None)
                .await?;
            self.registry
                .update_container_status(&id, ContainerStatus::Running)
                .await
        };
        if let Err(e) = written.await {
            return Err((Some(creating), e));
        }

        for record in &mut records {
            record.status = ContainerStatus::Running;
        }
        Ok(DeploymentView {
            deployment: creating.activate().into_data(),
            containers: records,
        })
    }

    /// Best effort: every step is attempted and failures are only logged.
    async fn abandon_creation(
        &self,
        address: &str,
        id: &DeploymentId,
        creating: Option<Deployment<Creating>>,
        cause: &ControlError,
    ) {
        if let Some(creating) = creating {
            let failed = creating.fail(cause.to_string());
            if let Err(e) = self
                .registry
                .update_deployment_status(id, failed.status(), failed.data().error.as_deref())
                .await
            {
                warn!(deployment_id = %id, error = %e, "failed to mark deployment failed");
            }
        }

        let request = DeploymentControlRequest {
            deployment_id: id.to_string(),
        };
        if let Err(e) = self
            .agent
            .control_deployment(address, LifecycleOp::Delete, &request)
            .await
        {
            warn!(deployment_id = %id, error = %e, "failed to remove deployment from host");
        }
    }

    /// Start, stop or delete one of a developer's deployments.
    ///
    /// Start and stop require a running or stopped deployment. Deleting a
    /// deleted deployment returns it unchanged. If the host no longer has
    /// the deployment it is recorded as deleted.
    pub async fn control_app(
        &self,
        developer_id: DeveloperId,
        id: DeploymentId,
        op: LifecycleOp,
    ) -> ControlResult<AppDeployment> {
        let data = self.owned_deployment(&developer_id, &id).await?;
        let resource = self.resource(&data.resource_id).await?;
        let any = AnyDeployment::from_persisted(data);
        let request = DeploymentControlRequest {
            deployment_id: id.to_string(),
        };

        if op == LifecycleOp::Delete {
            if any.is_terminal() {
                return Ok(any.delete().into_data());
            }
            match self
                .agent
                .control_deployment(&resource.address, op, &request)
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    warn!(deployment_id = %id, "deployment already gone from host");
                }
                Err(e) => return Err(e),
            }
            let deleted = any.delete();
            self.save(deleted.data(), ContainerStatus::Deleted).await?;
            info!(deployment_id = %id, "deployment deleted");
            return Ok(deleted.into_data());
        }

        let target = match op {
            LifecycleOp::Stop => DeploymentStatus::Stopped,
            _ => DeploymentStatus::Running,
        };
        let live = any.try_into_live(target.as_str())?;

        match self
            .agent
            .control_deployment(&resource.address, op, &request)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                warn!(deployment_id = %id, op = %op, "deployment missing on host, marking deleted");
                let deleted = live.delete();
                self.save(deleted.data(), ContainerStatus::Deleted).await?;
                return Err(ControlError::not_found(format!(
                    "deployment {id} no longer exists on its host"
                )));
            }
            Err(e) => return Err(e),
        }

        let updated = if op == LifecycleOp::Stop {
            let stopped = live.stop();
            self.save(stopped.data(), ContainerStatus::Stopped).await?;
            stopped.into_data()
        } else {
            let running = live.start();
            self.save(running.data(), ContainerStatus::Running).await?;
            running.into_data()
        };

        info!(
            deployment_id = %id,
            op = %op,
            status = %updated.status,
            "deployment lifecycle command applied"
        );
        Ok(updated)
    }

    async fn save(
        &self,
        deployment: &AppDeployment,
        containers: ContainerStatus,
    ) -> ControlResult<()> {
        self.registry
            .update_deployment_status(
                &deployment.id,
                deployment.status,
                deployment.error.as_deref(),
            )
            .await?;
        self.registry
            .update_container_status(&deployment.id, containers)
            .await
    }

    /// Get one of a developer's deployments with its containers.
    pub async fn get_app(
        &self,
        developer_id: DeveloperId,
        id: DeploymentId,
    ) -> ControlResult<DeploymentView> {
        let deployment = self.owned_deployment(&developer_id, &id).await?;
        let containers = self.registry.list_containers(&id).await?;
        Ok(DeploymentView {
            deployment,
            containers,
        })
    }

    /// List a developer's deployments, newest first.
    pub async fn list_apps(&self, developer_id: DeveloperId) -> ControlResult<Vec<AppDeployment>> {
        self.registry.list_deployments(&developer_id).await
    }
}
