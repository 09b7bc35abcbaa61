//! Kumulus provisioning agent.
//!
//! One agent runs on every provider host. It exposes a small HTTP API that
//! the control plane drives, and turns each call into container, image and
//! network operations on the local docker daemon:
//!
//! - **VMs** are single Ubuntu containers running `sshd`, built from a typed
//!   image template and published on a port from the VM range.
//! - **Deployments** are application stacks (main container plus an
//!   optional database) on a private network named after the deployment.
//!
//! The agent keeps no state of its own. Failed creations are torn down
//! synchronously before the error is returned.

#![forbid(unsafe_code)]

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod housekeeping;
pub mod image;
pub mod ports;
pub mod provisioner;
pub mod runtime;
pub mod service;

pub use config::AgentConfig;
pub use error::{AgentError, AgentResult};
pub use provisioner::Provisioner;
pub use runtime::{ContainerRuntime, DockerCli, RunSpec};
pub use service::AgentService;
