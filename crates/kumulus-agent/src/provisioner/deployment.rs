//! Application deployment lifecycle.

use kumulus_proto::validate::validate_identifier;
use kumulus_proto::{
    ContainerInfo, ContainerRole, ContainerStatus, ContainerStatusReport, CreateAppRequest,
    CreateAppResponse, DeploymentControlResponse, LifecycleOp,
};
use tracing::{error, info, warn};

use super::{network_name, Provisioner, Teardown};
use crate::catalog::{app_spec, AppSpec, Resources};
use crate::error::{AgentError, AgentResult};
use crate::ports;
use crate::runtime::RunSpec;

/// Hostname the main container uses to reach its database.
const DATABASE_ALIAS: &str = "db";

impl Provisioner {
    /// Create the network and containers of an application deployment.
    ///
    /// The database container, when the app has one, is started before the
    /// main container. If any step fails, everything created under the
    /// deployment id is torn down before the original error is returned.
    pub async fn create_deployment(
        &self,
        request: &CreateAppRequest,
    ) -> AgentResult<CreateAppResponse> {
        validate_identifier(&request.deployment_id)?;
        let expected_network = network_name(&request.deployment_id);
        if request.network_name != expected_network {
            return Err(AgentError::validation(format!(
                "network name must be '{expected_network}'"
            )));
        }
        if request.cpu == Some(0) {
            return Err(AgentError::validation("cpu must be at least 1"));
        }

        let spec = app_spec(request.app_type);

        info!(
            deployment_id = %request.deployment_id,
            app_type = %request.app_type,
            network = %request.network_name,
            "creating deployment"
        );

        match self.provision_stack(request, spec).await {
            Ok(containers) => {
                info!(
                    deployment_id = %request.deployment_id,
                    containers = containers.len(),
                    "deployment running"
                );
                Ok(CreateAppResponse {
                    deployment_id: request.deployment_id.clone(),
                    network_name: request.network_name.clone(),
                    containers,
                })
            }
            Err(err) => {
                error!(
                    deployment_id = %request.deployment_id,
                    error = %err,
                    "deployment creation failed, tearing down"
                );
                self.teardown_deployment(&request.deployment_id).await;
                Err(err)
            }
        }
    }

    async fn provision_stack(
        &self,
        request: &CreateAppRequest,
        spec: &AppSpec,
    ) -> AgentResult<Vec<ContainerInfo>> {
        let id = &request.deployment_id;
        let network = &request.network_name;

        self.runtime.create_network(network).await?;

        let mut containers = Vec::with_capacity(2);

        if let Some(db) = spec.database {
            let run = RunSpec::new(ContainerRole::Database.container_name(id), db.image)
                .network(network)
                .network_alias(DATABASE_ALIAS)
                .envs(db.env.iter().copied())
                .cpus(db.resources.cpu)
                .memory(db.resources.memory);

            self.runtime.run(&run).await?;
            containers.push(container_info(
                &run,
                ContainerRole::Database,
                db.resources,
                Some(db.internal_port),
            ));
        }

        let host_port = ports::allocate(
            self.ports.as_ref(),
            self.port_ranges.for_app(request.app_type),
        )?;
        let resources = Resources {
            cpu: request.cpu.unwrap_or(spec.resources.cpu),
            memory: request.memory.unwrap_or(spec.resources.memory),
        };

        let mut run = RunSpec::new(ContainerRole::Main.container_name(id), spec.image)
            .network(network)
            .envs(spec.env.iter().copied())
            .cpus(resources.cpu)
            .memory(resources.memory)
            .publish(host_port, spec.container_port);
        for binding in spec.volumes {
            run = run.volume(*binding);
        }

        self.runtime.run(&run).await?;
        containers.push(container_info(
            &run,
            ContainerRole::Main,
            resources,
            Some(spec.container_port),
        ));

        Ok(containers)
    }

    /// Start, stop or delete every container of a deployment.
    pub async fn control_deployment(
        &self,
        deployment_id: &str,
        op: LifecycleOp,
    ) -> AgentResult<DeploymentControlResponse> {
        validate_identifier(deployment_id)?;

        let members = self.discover(deployment_id).await?;
        let network = network_name(deployment_id);

        match op {
            LifecycleOp::Start => {
                if members.is_empty() {
                    return Err(deployment_not_found(deployment_id));
                }
                if !self.runtime.network_exists(&network).await? {
                    return Err(AgentError::not_found(format!(
                        "network {network} not found"
                    )));
                }
                for (name, _) in &members {
                    self.runtime.start(name).await?;
                }
            }
            LifecycleOp::Stop => {
                if members.is_empty() {
                    return Err(deployment_not_found(deployment_id));
                }
                for (name, _) in members.iter().rev() {
                    self.runtime.stop(name).await?;
                }
            }
            LifecycleOp::Delete => {
                if members.is_empty() {
                    // Drop a network left behind by an earlier partial delete.
                    if matches!(self.runtime.network_exists(&network).await, Ok(true)) {
                        if let Err(e) = self.runtime.remove_network(&network).await {
                            warn!(deployment_id, error = %e, "failed to remove orphaned network");
                        }
                    }
                    return Err(deployment_not_found(deployment_id));
                }
                self.teardown_deployment(deployment_id).await;
            }
        }

        info!(
            deployment_id,
            op = %op,
            containers = members.len(),
            "deployment lifecycle command applied"
        );

        let status = op.resulting_status();
        Ok(DeploymentControlResponse {
            deployment_id: deployment_id.to_owned(),
            status,
            containers: members
                .into_iter()
                .map(|(id, role)| ContainerStatusReport { id, role, status })
                .collect(),
        })
    }

    /// Member containers in start order (database first).
    async fn discover(&self, deployment_id: &str) -> AgentResult<Vec<(String, ContainerRole)>> {
        let mut members: Vec<_> = self
            .runtime
            .containers_with_prefix(&format!("{deployment_id}-"))
            .await?
            .into_iter()
            .map(|name| {
                let role = ContainerRole::from_container_name(&name);
                (name, role)
            })
            .collect();

        members.sort_by(|(a_name, a_role), (b_name, b_role)| {
            a_role
                .start_rank()
                .cmp(&b_role.start_rank())
                .then_with(|| a_name.cmp(b_name))
        });

        Ok(members)
    }

    /// Stop and remove every container and the network of a deployment.
    ///
    /// Returns the number of steps that failed; failures are logged, never
    /// raised.
    async fn teardown_deployment(&self, deployment_id: &str) -> usize {
        let mut teardown = Teardown::new(deployment_id);

        match self.discover(deployment_id).await {
            Ok(members) => {
                for (name, _) in members.iter().rev() {
                    teardown.record(self.runtime.stop(name).await);
                    teardown.record(self.runtime.remove(name).await);
                }
            }
            Err(e) => teardown.push(e),
        }

        let network = network_name(deployment_id);
        match self.runtime.network_exists(&network).await {
            Ok(true) => teardown.record(self.runtime.remove_network(&network).await),
            Ok(false) => {}
            Err(e) => teardown.push(e),
        }

        teardown.finish()
    }
}

fn deployment_not_found(deployment_id: &str) -> AgentError {
    AgentError::not_found(format!("deployment {deployment_id} not found"))
}

fn container_info(
    run: &RunSpec,
    role: ContainerRole,
    resources: Resources,
    internal_port: Option<u16>,
) -> ContainerInfo {
    // The first published port is the one developers reach.
    let port = run.published_ports().first().map(|(host, _)| *host);
    ContainerInfo {
        id: run.name().to_owned(),
        role,
        image: run.image().to_owned(),
        cpu: resources.cpu,
        memory_mb: resources.memory.megabytes(),
        port,
        internal_port,
        environment: run.environment().clone(),
        volumes: run.volumes().to_vec(),
        status: ContainerStatus::Running,
    }
}
