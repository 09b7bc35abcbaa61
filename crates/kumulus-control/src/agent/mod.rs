//! Calls into the provisioning agent running on each provider host.

mod client;

pub use client::HttpAgentClient;

use async_trait::async_trait;
use kumulus_proto::{
    CreateAppRequest, CreateAppResponse, CreateVmRequest, CreateVmResponse,
    DeploymentControlRequest, DeploymentControlResponse, LifecycleOp, VmControlRequest,
    VmControlResponse,
};

use crate::error::ControlResult;

/// Operations the orchestrator performs on a host.
///
/// `address` is the resource's address; implementations decide how to reach
/// the agent there. Errors follow the control-plane taxonomy: a missing VM
/// or deployment is `NotFound`, a rejected request is `Validation`, a host
/// command failure is `AgentFailure` and an exceeded deadline is
/// `AgentTimeout`.
#[async_trait]
pub trait ProvisioningAgent: Send + Sync {
    /// Build and run a VM container.
    async fn create_vm(
        &self,
        address: &str,
        request: &CreateVmRequest,
    ) -> ControlResult<CreateVmResponse>;

    /// Start, stop or delete a VM.
    async fn control_vm(
        &self,
        address: &str,
        op: LifecycleOp,
        request: &VmControlRequest,
    ) -> ControlResult<VmControlResponse>;

    /// Create an application deployment's network and containers.
    async fn create_app(
        &self,
        address: &str,
        request: &CreateAppRequest,
    ) -> ControlResult<CreateAppResponse>;

    /// Start, stop or delete an application deployment.
    async fn control_deployment(
        &self,
        address: &str,
        op: LifecycleOp,
        request: &DeploymentControlRequest,
    ) -> ControlResult<DeploymentControlResponse>;
}
