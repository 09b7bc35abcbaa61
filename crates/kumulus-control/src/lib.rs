//! Kumulus control plane.
//!
//! This crate places developer workloads on provider hosts and keeps the
//! resource registry in step with what the hosts actually run.
//!
//! # Architecture
//!
//! The control plane is responsible for:
//!
//! - **Scheduling**: picking the provider resource for each new VM or
//!   deployment, by provider score and current load
//! - **Orchestration**: sequencing scheduler, agent and registry calls so
//!   that a failed host operation never leaves a registry row behind
//! - **Registry**: durable record of providers, resources, developers, VMs
//!   and deployments (PostgreSQL, or in memory for tests and local runs)
//! - **API surface**: developer lifecycle endpoints and provider
//!   administration
//!
//! # State Machine
//!
//! Application deployments follow a state machine enforced at compile time
//! using the typestate pattern:
//!
//! ```text
//! Creating ──▶ Running ⇄ Stopped
//!    │            │         │
//!    ▼            ▼         ▼
//!  Failed ─────▶ Deleted ◀──┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use kumulus_control::{Deployment, Creating};
//!
//! let creating = Deployment::<Creating>::create(data);
//! let running = creating.activate();
//! let stopped = running.stop();
//!
//! // This would not compile:
//! // let invalid = stopped.activate();
//! ```

#![forbid(unsafe_code)]

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod service;
pub mod state;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root
pub use agent::{HttpAgentClient, ProvisioningAgent};
pub use config::ControlConfig;
pub use error::{ControlError, ControlResult};
pub use orchestrator::{CreateApp, CreateVm, DeploymentView, Orchestrator};
pub use scheduler::{PlacementPolicy, Scheduler, ScoreFirst, MAX_LOAD};
pub use service::ControlService;
pub use state::{
    AnyDeployment, Creating, Deleted, Deployment, DeploymentState, Failed, LiveDeployment,
    Running, Stopped,
};
pub use store::{MemoryRegistry, PostgresRegistry, Registry};
pub use types::{
    AppDeployment, DeploymentContainer, DeploymentId, DeploymentStatus, Developer, DeveloperId,
    DeveloperVm, PlacementCandidate, Provider, ProviderId, ProviderResource, ResourceId, VmId,
    VmStatus,
};
