//! Resource selection for new VMs and deployments.
//!
//! The scheduler reads placement candidates from the registry and hands them
//! to a [`PlacementPolicy`]. It never writes; the orchestrator records the
//! lease once the workload actually exists on the host.
//!
//! Selection and the subsequent placement are not atomic. Two concurrent
//! requests can both pick a resource at load 4 and push it to 6.

mod placement;

pub use placement::{PlacementPolicy, ScoreFirst};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ControlError, ControlResult};
use crate::store::Registry;
use crate::types::PlacementCandidate;

/// Number of live workloads at which a resource stops receiving new ones.
pub const MAX_LOAD: u32 = 5;

/// Picks the resource for the next workload.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<dyn Registry>,
    policy: Arc<dyn PlacementPolicy>,
}

impl Scheduler {
    /// Create a scheduler over a registry with the given policy.
    pub fn new(registry: Arc<dyn Registry>, policy: Arc<dyn PlacementPolicy>) -> Self {
        Self { registry, policy }
    }

    /// Select a resource, or fail with `CapacityExhausted`.
    pub async fn select_resource(&self) -> ControlResult<PlacementCandidate> {
        let mut candidates = self.registry.placement_candidates().await?;

        let Some(index) = self.policy.select(&candidates) else {
            warn!(
                policy = self.policy.name(),
                candidates = candidates.len(),
                "no resource has capacity"
            );
            return Err(ControlError::CapacityExhausted);
        };

        let chosen = candidates.swap_remove(index);
        debug!(
            policy = self.policy.name(),
            resource_id = %chosen.resource.id,
            provider_id = %chosen.resource.provider_id,
            score = chosen.score,
            load = chosen.load,
            "selected resource"
        );
        Ok(chosen)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("policy", &self.policy.name())
            .finish_non_exhaustive()
    }
}
