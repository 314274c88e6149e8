//! Leader election: a pure mapping from view to leader.

use crate::{Hash, ValidatorId, View};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maps each view to exactly one leader.
pub trait Election: Send + Sync {
    /// The designated leader of `view`.
    fn leader_for(&self, view: View) -> ValidatorId;

    /// Is `validator` the leader of `view`?
    fn is_leader(&self, validator: ValidatorId, view: View) -> bool {
        self.leader_for(view) == validator
    }
}

/// Pseudo-random rotation: the leader index is derived from a hash of the view.
///
/// Every replica computes the same sequence, but consecutive views do not
/// follow committee order.
#[derive(Debug, Clone)]
pub struct RotationElection {
    committee: Vec<ValidatorId>,
}

impl RotationElection {
    /// Create a rotation over a non-empty committee.
    pub fn new(committee: Vec<ValidatorId>) -> Self {
        Self { committee }
    }
}

impl Election for RotationElection {
    fn leader_for(&self, view: View) -> ValidatorId {
        if self.committee.is_empty() {
            return ValidatorId(0);
        }
        let digest = Hash::from_bytes(&view.0.to_le_bytes());
        let index = digest.prefix_u64() % self.committee.len() as u64;
        self.committee[index as usize]
    }
}

/// Committee order, one view each.
#[derive(Debug, Clone)]
pub struct RoundRobinElection {
    committee: Vec<ValidatorId>,
}

impl RoundRobinElection {
    /// Create a round-robin schedule over a non-empty committee.
    pub fn new(committee: Vec<ValidatorId>) -> Self {
        Self { committee }
    }
}

impl Election for RoundRobinElection {
    fn leader_for(&self, view: View) -> ValidatorId {
        if self.committee.is_empty() {
            return ValidatorId(0);
        }
        self.committee[(view.0 % self.committee.len() as u64) as usize]
    }
}

/// One fixed leader for every view.
#[derive(Debug, Clone, Copy)]
pub struct StaticElection {
    leader: ValidatorId,
}

impl StaticElection {
    /// Create an election that always picks `leader`.
    pub fn new(leader: ValidatorId) -> Self {
        Self { leader }
    }
}

impl Election for StaticElection {
    fn leader_for(&self, _view: View) -> ValidatorId {
        self.leader
    }
}

/// Configurable choice of election scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ElectionKind {
    /// [`RotationElection`].
    #[default]
    Rotation,
    /// [`RoundRobinElection`].
    RoundRobin,
    /// [`StaticElection`] with the given leader.
    Static {
        /// The fixed leader.
        leader: ValidatorId,
    },
}

impl ElectionKind {
    /// Instantiate the scheme over `committee`.
    pub fn build(self, committee: Vec<ValidatorId>) -> Arc<dyn Election> {
        match self {
            ElectionKind::Rotation => Arc::new(RotationElection::new(committee)),
            ElectionKind::RoundRobin => Arc::new(RoundRobinElection::new(committee)),
            ElectionKind::Static { leader } => Arc::new(StaticElection::new(leader)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committee() -> Vec<ValidatorId> {
        (1..=4).map(ValidatorId).collect()
    }

    #[test]
    fn test_rotation_is_deterministic_and_consistent() {
        let a = RotationElection::new(committee());
        let b = RotationElection::new(committee());
        for view in 0..100 {
            let leader = a.leader_for(View(view));
            assert_eq!(leader, b.leader_for(View(view)));
            assert!(a.is_leader(leader, View(view)));
            assert!(committee().contains(&leader));
        }
    }

    #[test]
    fn test_rotation_reaches_every_member() {
        let election = RotationElection::new(committee());
        let mut seen: Vec<_> = (0..200).map(|v| election.leader_for(View(v))).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen, committee());
    }

    #[test]
    fn test_round_robin_order() {
        let election = RoundRobinElection::new(committee());
        assert_eq!(election.leader_for(View(0)), ValidatorId(1));
        assert_eq!(election.leader_for(View(1)), ValidatorId(2));
        assert_eq!(election.leader_for(View(5)), ValidatorId(2));
        assert!(!election.is_leader(ValidatorId(1), View(1)));
    }

    #[test]
    fn test_static_and_kind_parsing() {
        let election = ElectionKind::Static {
            leader: ValidatorId(3),
        }
        .build(committee());
        assert!(election.is_leader(ValidatorId(3), View(42)));

        let kind: ElectionKind = serde_json::from_str(r#"{"kind":"round_robin"}"#).unwrap();
        assert_eq!(kind, ElectionKind::RoundRobin);
    }
}
