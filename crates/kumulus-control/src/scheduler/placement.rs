//! Placement policies for resource selection.

use std::cmp::Ordering;

use crate::types::PlacementCandidate;

/// Trait for placement policies.
pub trait PlacementPolicy: Send + Sync {
    /// Selects a candidate for a new workload.
    ///
    /// Returns the index of the chosen candidate, or `None` if no candidate
    /// can take more work.
    fn select(&self, candidates: &[PlacementCandidate]) -> Option<usize>;

    /// Returns the policy name.
    fn name(&self) -> &'static str;
}

/// Highest provider score first.
///
/// A resource is eligible while its load is below `max_load`. Equal scores
/// fall back to the provider leased least recently (never leased first),
/// then the lower load, then the lowest resource id.
#[derive(Debug, Clone, Copy)]
pub struct ScoreFirst {
    max_load: u32,
}

impl ScoreFirst {
    /// Creates a policy with the given load ceiling.
    #[must_use]
    pub const fn new(max_load: u32) -> Self {
        Self { max_load }
    }

    /// The load at which a resource stops receiving work.
    #[must_use]
    pub const fn max_load(&self) -> u32 {
        self.max_load
    }

    fn rank(a: &PlacementCandidate, b: &PlacementCandidate) -> Ordering {
        b.score
            .cmp(&a.score)
            // `None < Some(_)`, so never-leased providers sort first.
            .then_with(|| a.last_lease_at.cmp(&b.last_lease_at))
            .then_with(|| a.load.cmp(&b.load))
            .then_with(|| a.resource.id.cmp(&b.resource.id))
    }
}

impl Default for ScoreFirst {
    fn default() -> Self {
        Self::new(super::MAX_LOAD)
    }
}

impl PlacementPolicy for ScoreFirst {
    fn select(&self, candidates: &[PlacementCandidate]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| c.load < self.max_load)
            .min_by(|(_, a), (_, b)| Self::rank(a, b))
            .map(|(index, _)| index)
    }

    fn name(&self) -> &'static str {
        "score_first"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProviderId, ProviderResource, ResourceId};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn candidate(score: i32, load: u32) -> PlacementCandidate {
        PlacementCandidate {
            resource: ProviderResource {
                id: ResourceId::generate(),
                provider_id: ProviderId::generate(),
                address: "10.0.0.1".to_owned(),
                cpu_cores: 4,
                ram_mb: 8192,
                storage_gb: 100,
                bandwidth_mbps: 100,
                created_at: Utc::now(),
            },
            score,
            last_lease_at: None,
            load,
        }
    }

    #[test]
    fn empty_candidates() {
        assert_eq!(ScoreFirst::default().select(&[]), None);
    }

    #[test]
    fn full_resources_are_never_chosen() {
        let policy = ScoreFirst::new(5);
        let candidates = vec![candidate(100, 5), candidate(90, 7), candidate(10, 4)];
        assert_eq!(policy.select(&candidates), Some(2));

        let full = vec![candidate(100, 5), candidate(50, 5)];
        assert_eq!(policy.select(&full), None);
    }

    #[test]
    fn highest_score_wins() {
        let candidates = vec![candidate(40, 0), candidate(80, 4), candidate(60, 1)];
        assert_eq!(ScoreFirst::default().select(&candidates), Some(1));
    }

    #[test]
    fn equal_scores_prefer_oldest_lease() {
        let now = Utc::now();
        let mut recent = candidate(50, 0);
        recent.last_lease_at = Some(now);
        let mut older = candidate(50, 3);
        older.last_lease_at = Some(now - Duration::minutes(10));
        let never = candidate(50, 4);

        let policy = ScoreFirst::default();
        assert_eq!(
            policy.select(&[recent.clone(), older.clone(), never]),
            Some(2)
        );
        assert_eq!(policy.select(&[recent, older]), Some(1));
    }

    #[test]
    fn then_lower_load_then_lowest_id() {
        let policy = ScoreFirst::default();
        let busy = candidate(50, 3);
        let idle = candidate(50, 1);
        assert_eq!(policy.select(&[busy, idle]), Some(1));

        let mut a = candidate(50, 2);
        a.resource.id = ResourceId::from_uuid(Uuid::from_u128(2));
        let mut b = candidate(50, 2);
        b.resource.id = ResourceId::from_uuid(Uuid::from_u128(1));
        assert_eq!(policy.select(&[a, b]), Some(1));
    }

    #[test]
    fn policy_name() {
        assert_eq!(ScoreFirst::default().name(), "score_first");
    }
}
