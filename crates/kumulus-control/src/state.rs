//! Typestate pattern for the deployment state machine.
//!
//! Deployment states are encoded in the type system so that an invalid
//! transition does not compile:
//!
//! ```text
//! Creating ──▶ Running ⇄ Stopped
//!    │            │         │
//!    ▼            ▼         ▼
//!  Failed ─────▶ Deleted ◀──┘
//! ```
//!
//! Records loaded from the registry carry their state at runtime; they enter
//! the typed world through [`AnyDeployment::from_persisted`].

use std::marker::PhantomData;

use chrono::Utc;

use crate::error::{ControlError, ControlResult};
use crate::types::{AppDeployment, DeploymentId, DeploymentStatus};

/// Marker trait for deployment states.
pub trait DeploymentState: private::Sealed + Send + Sync {
    /// Get the persisted status representation.
    fn persisted() -> DeploymentStatus;
}

mod private {
    pub trait Sealed {}
}

/// Agent call succeeded; registry rows are being written.
#[derive(Debug, Clone, Copy)]
pub struct Creating;

/// Every container is running.
#[derive(Debug, Clone, Copy)]
pub struct Running;

/// Every container is stopped.
#[derive(Debug, Clone, Copy)]
pub struct Stopped;

/// Creation did not complete.
#[derive(Debug, Clone, Copy)]
pub struct Failed;

/// Removed from the host.
#[derive(Debug, Clone, Copy)]
pub struct Deleted;

macro_rules! deployment_state {
    ($($state:ident => $status:ident),* $(,)?) => {
        $(
            impl private::Sealed for $state {}

            impl DeploymentState for $state {
                fn persisted() -> DeploymentStatus {
                    DeploymentStatus::$status
                }
            }
        )*
    };
}

deployment_state! {
    Creating => Creating,
    Running => Running,
    Stopped => Stopped,
    Failed => Failed,
    Deleted => Deleted,
}

/// A deployment in a specific state.
#[derive(Debug)]
pub struct Deployment<S: DeploymentState> {
    data: AppDeployment,
    _state: PhantomData<S>,
}

impl<S: DeploymentState> Deployment<S> {
    /// Get a reference to the deployment record.
    #[must_use]
    pub const fn data(&self) -> &AppDeployment {
        &self.data
    }

    /// Get the deployment ID.
    #[must_use]
    pub const fn id(&self) -> &DeploymentId {
        &self.data.id
    }

    /// Get the current state as a persisted value.
    #[must_use]
    pub fn status(&self) -> DeploymentStatus {
        S::persisted()
    }

    /// Convert into the underlying record (consuming the deployment).
    #[must_use]
    pub fn into_data(self) -> AppDeployment {
        self.data
    }

    fn transition<T: DeploymentState>(mut self) -> Deployment<T> {
        self.data.status = T::persisted();
        self.data.updated_at = Utc::now();
        Deployment {
            data: self.data,
            _state: PhantomData,
        }
    }

    fn wrap(mut data: AppDeployment) -> Self {
        data.status = S::persisted();
        Self {
            data,
            _state: PhantomData,
        }
    }
}

impl Deployment<Creating> {
    /// Start tracking a deployment the agent has just created.
    #[must_use]
    pub fn create(data: AppDeployment) -> Self {
        Self::wrap(data)
    }

    /// All records written; the containers are live.
    #[must_use]
    pub fn activate(self) -> Deployment<Running> {
        self.transition()
    }

    /// Record why creation did not complete.
    #[must_use]
    pub fn fail(mut self, error: String) -> Deployment<Failed> {
        self.data.error = Some(error);
        self.transition()
    }

    /// Remove the deployment.
    #[must_use]
    pub fn delete(self) -> Deployment<Deleted> {
        self.transition()
    }
}

impl Deployment<Running> {
    /// Stop every container.
    #[must_use]
    pub fn stop(self) -> Deployment<Stopped> {
        self.transition()
    }

    /// Remove the deployment.
    #[must_use]
    pub fn delete(self) -> Deployment<Deleted> {
        self.transition()
    }
}

impl Deployment<Stopped> {
    /// Start every container.
    #[must_use]
    pub fn start(self) -> Deployment<Running> {
        self.transition()
    }

    /// Remove the deployment.
    #[must_use]
    pub fn delete(self) -> Deployment<Deleted> {
        self.transition()
    }
}

impl Deployment<Failed> {
    /// Remove whatever is left of a failed deployment.
    #[must_use]
    pub fn delete(self) -> Deployment<Deleted> {
        self.transition()
    }
}

/// A deployment whose containers exist and can be started or stopped.
#[derive(Debug)]
pub enum LiveDeployment {
    /// Currently running.
    Running(Deployment<Running>),
    /// Currently stopped.
    Stopped(Deployment<Stopped>),
}

impl LiveDeployment {
    /// Get a reference to the deployment record.
    #[must_use]
    pub const fn data(&self) -> &AppDeployment {
        match self {
            Self::Running(d) => d.data(),
            Self::Stopped(d) => d.data(),
        }
    }

    /// Move to running. A running deployment stays running.
    #[must_use]
    pub fn start(self) -> Deployment<Running> {
        match self {
            Self::Running(d) => d,
            Self::Stopped(d) => d.start(),
        }
    }

    /// Move to stopped. A stopped deployment stays stopped.
    #[must_use]
    pub fn stop(self) -> Deployment<Stopped> {
        match self {
            Self::Running(d) => d.stop(),
            Self::Stopped(d) => d,
        }
    }

    /// The host no longer has the deployment.
    #[must_use]
    pub fn delete(self) -> Deployment<Deleted> {
        match self {
            Self::Running(d) => d.delete(),
            Self::Stopped(d) => d.delete(),
        }
    }
}

/// A type-erased deployment that can be in any state.
#[derive(Debug)]
pub enum AnyDeployment {
    /// Deployment in creating state.
    Creating(Deployment<Creating>),
    /// Deployment in running state.
    Running(Deployment<Running>),
    /// Deployment in stopped state.
    Stopped(Deployment<Stopped>),
    /// Deployment in failed state.
    Failed(Deployment<Failed>),
    /// Deployment in deleted state.
    Deleted(Deployment<Deleted>),
}

impl AnyDeployment {
    /// Create an `AnyDeployment` from a record, trusting its status field.
    #[must_use]
    pub fn from_persisted(data: AppDeployment) -> Self {
        match data.status {
            DeploymentStatus::Creating => Self::Creating(Deployment::wrap(data)),
            DeploymentStatus::Running => Self::Running(Deployment::wrap(data)),
            DeploymentStatus::Stopped => Self::Stopped(Deployment::wrap(data)),
            DeploymentStatus::Failed => Self::Failed(Deployment::wrap(data)),
            DeploymentStatus::Deleted => Self::Deleted(Deployment::wrap(data)),
        }
    }

    /// Get a reference to the deployment record.
    #[must_use]
    pub const fn data(&self) -> &AppDeployment {
        match self {
            Self::Creating(d) => d.data(),
            Self::Running(d) => d.data(),
            Self::Stopped(d) => d.data(),
            Self::Failed(d) => d.data(),
            Self::Deleted(d) => d.data(),
        }
    }

    /// Get the current state.
    #[must_use]
    pub const fn status(&self) -> DeploymentStatus {
        match self {
            Self::Creating(_) => DeploymentStatus::Creating,
            Self::Running(_) => DeploymentStatus::Running,
            Self::Stopped(_) => DeploymentStatus::Stopped,
            Self::Failed(_) => DeploymentStatus::Failed,
            Self::Deleted(_) => DeploymentStatus::Deleted,
        }
    }

    /// Try to extract a deployment that can be started or stopped.
    ///
    /// `to` names the requested state for the error message.
    pub fn try_into_live(self, to: &'static str) -> ControlResult<LiveDeployment> {
        match self {
            Self::Running(d) => Ok(LiveDeployment::Running(d)),
            Self::Stopped(d) => Ok(LiveDeployment::Stopped(d)),
            other => Err(ControlError::InvalidStateTransition {
                from: other.status().as_str(),
                to,
            }),
        }
    }

    /// Transition to deleted from any state. Deleting twice is a no-op.
    #[must_use]
    pub fn delete(self) -> Deployment<Deleted> {
        match self {
            Self::Creating(d) => d.delete(),
            Self::Running(d) => d.delete(),
            Self::Stopped(d) => d.delete(),
            Self::Failed(d) => d.delete(),
            Self::Deleted(d) => d,
        }
    }

    /// Check if the deployment is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}
