//! Wire types shared between the Kumulus control plane and the per-host
//! provisioning agent.
//!
//! The agent speaks JSON over HTTP. Every request and response body that
//! crosses that boundary lives here, together with the small value types
//! both sides validate independently (resource sizes, usernames, SSH keys,
//! host identifiers).

#![forbid(unsafe_code)]

pub mod agent;
pub mod app;
pub mod error;
pub mod size;
pub mod validate;

pub use agent::{
    CommandDetails, ContainerInfo, ContainerStatus, ContainerStatusReport, CreateAppRequest,
    CreateAppResponse, CreateVmRequest, CreateVmResponse, DeploymentControlRequest,
    DeploymentControlResponse, ErrorBody, LifecycleOp, VmControlRequest, VmControlResponse,
};
pub use app::{AppType, ContainerRole};
pub use error::ProtoError;
pub use size::Size;

/// Default TCP port the provisioning agent listens on.
pub const AGENT_DEFAULT_PORT: u16 = 8800;
