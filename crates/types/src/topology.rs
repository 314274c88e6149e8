//! Topology trait and static implementation.
//!
//! The topology is a replica's view of who it is and who the committee is.

use crate::{PublicKey, ValidatorId, ValidatorSet, VotePower};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity and committee membership as seen by one replica.
pub trait Topology: Send + Sync {
    /// Get the local validator's ID.
    fn local_validator_id(&self) -> ValidatorId;

    /// Get the committee members in ascending id order.
    fn committee(&self) -> &[ValidatorId];

    /// Get the public key for a validator.
    fn public_key(&self, validator_id: ValidatorId) -> Option<&PublicKey>;

    // ═══════════════════════════════════════════════════════════════════════
    // Derived helpers
    // ═══════════════════════════════════════════════════════════════════════

    /// Number of committee members (N).
    fn committee_size(&self) -> usize {
        self.committee().len()
    }

    /// Get the index of a validator in the committee.
    fn committee_index(&self, validator_id: ValidatorId) -> Option<usize> {
        self.committee().binary_search(&validator_id).ok()
    }

    /// Get the validator at a committee index.
    fn validator_at(&self, index: usize) -> Option<ValidatorId> {
        self.committee().get(index).copied()
    }

    /// Check if a validator is a member of the committee.
    fn is_committee_member(&self, validator_id: ValidatorId) -> bool {
        self.committee_index(validator_id).is_some()
    }

    /// Check if `count` distinct signers form a supermajority.
    fn has_quorum(&self, count: usize) -> bool {
        VotePower::has_quorum(count as u64, self.committee_size() as u64)
    }

    /// Minimum number of distinct signers for a supermajority.
    fn quorum_threshold(&self) -> usize {
        VotePower::quorum_threshold(self.committee_size() as u64) as usize
    }

    /// Public keys for `validators`, in the same order. None if any is unknown.
    fn public_keys(&self, validators: &[ValidatorId]) -> Option<Vec<PublicKey>> {
        validators
            .iter()
            .map(|v| self.public_key(*v).cloned())
            .collect()
    }
}

/// A topology fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    local_validator_id: ValidatorId,
    committee: Vec<ValidatorId>,
    public_keys: HashMap<ValidatorId, PublicKey>,
}

impl StaticTopology {
    /// Create a topology for `local_validator_id` over a validator set.
    pub fn new(local_validator_id: ValidatorId, validator_set: ValidatorSet) -> Self {
        let committee = validator_set.ids();
        let public_keys = validator_set
            .validators
            .into_iter()
            .map(|v| (v.validator_id, v.public_key))
            .collect();

        Self {
            local_validator_id,
            committee,
            public_keys,
        }
    }

    /// The same committee seen from another validator.
    pub fn for_validator(&self, local_validator_id: ValidatorId) -> Self {
        Self {
            local_validator_id,
            ..self.clone()
        }
    }

    /// Create a topology as an Arc.
    pub fn into_arc(self) -> Arc<dyn Topology> {
        Arc::new(self)
    }
}

impl Topology for StaticTopology {
    fn local_validator_id(&self) -> ValidatorId {
        self.local_validator_id
    }

    fn committee(&self) -> &[ValidatorId] {
        &self.committee
    }

    fn public_key(&self, validator_id: ValidatorId) -> Option<&PublicKey> {
        self.public_keys.get(&validator_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyPair, KeyType, ValidatorInfo};

    fn topology(ids: &[u64]) -> StaticTopology {
        let set = ValidatorSet::new(
            ids.iter()
                .map(|id| {
                    let key = KeyPair::from_seed(KeyType::Ed25519, &[*id as u8; 32]).unwrap();
                    ValidatorInfo::new(ValidatorId(*id), key.public_key())
                })
                .collect(),
        );
        StaticTopology::new(ValidatorId(ids[0]), set)
    }

    #[test]
    fn test_committee_is_sorted() {
        let topology = topology(&[4, 2, 3, 1]);
        assert_eq!(
            topology.committee(),
            &[ValidatorId(1), ValidatorId(2), ValidatorId(3), ValidatorId(4)]
        );
        assert_eq!(topology.committee_index(ValidatorId(3)), Some(2));
        assert!(!topology.is_committee_member(ValidatorId(9)));
    }

    #[test]
    fn test_quorum_threshold_four() {
        let topology = topology(&[1, 2, 3, 4]);
        assert_eq!(topology.quorum_threshold(), 3);
        assert!(!topology.has_quorum(2));
        assert!(topology.has_quorum(3));
    }

    #[test]
    fn test_public_keys_fail_on_unknown() {
        let topology = topology(&[1, 2, 3, 4]);
        assert_eq!(
            topology
                .public_keys(&[ValidatorId(1), ValidatorId(2)])
                .map(|k| k.len()),
            Some(2)
        );
        assert!(topology
            .public_keys(&[ValidatorId(1), ValidatorId(7)])
            .is_none());
        assert_eq!(
            topology.for_validator(ValidatorId(3)).local_validator_id(),
            ValidatorId(3)
        );
    }
}
