//! Validator set definitions.

use crate::{PublicKey, ValidatorId};
use serde::{Deserialize, Serialize};

/// A single validator's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    /// Validator identifier.
    pub validator_id: ValidatorId,
    /// Key used to verify the validator's signatures.
    pub public_key: PublicKey,
}

impl ValidatorInfo {
    /// Create validator info.
    pub fn new(validator_id: ValidatorId, public_key: PublicKey) -> Self {
        Self {
            validator_id,
            public_key,
        }
    }
}

/// The fixed set of validators for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    /// Validators, kept sorted by id.
    pub validators: Vec<ValidatorInfo>,
}

impl ValidatorSet {
    /// Create a validator set. Entries are sorted by id and deduplicated.
    pub fn new(mut validators: Vec<ValidatorInfo>) -> Self {
        validators.sort_by_key(|v| v.validator_id);
        validators.dedup_by_key(|v| v.validator_id);
        Self { validators }
    }

    /// Number of validators (N).
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// True if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validator ids in ascending order.
    pub fn ids(&self) -> Vec<ValidatorId> {
        self.validators.iter().map(|v| v.validator_id).collect()
    }
}
