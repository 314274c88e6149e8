//! Block votes.

use crate::{block_vote_message, Hash, KeyPair, PublicKey, Signature, ValidatorId, View};
use serde::{Deserialize, Serialize};

/// A vote for a block.
///
/// Votes for the same (voter, block) are interchangeable: the store keeps the
/// latest one and counts the voter once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// View of the block being voted on.
    pub view: View,

    /// Validator casting the vote.
    pub voter: ValidatorId,

    /// Identifier of the block being voted on.
    pub block_id: Hash,

    /// Signature over `block_vote_message(view, block_id)`.
    pub signature: Signature,
}

impl Vote {
    /// Create and sign a vote.
    pub fn new(view: View, block_id: Hash, voter: ValidatorId, signing_key: &KeyPair) -> Self {
        let signature = signing_key.sign(&block_vote_message(view, &block_id));
        Self {
            view,
            voter,
            block_id,
            signature,
        }
    }

    /// The message that was signed.
    pub fn signing_message(&self) -> Vec<u8> {
        block_vote_message(self.view, &self.block_id)
    }

    /// Verify the signature against the voter's public key.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        public_key.verify(&self.signing_message(), &self.signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyType;

    #[test]
    fn test_vote_signature_binds_block_and_view() {
        let key = KeyPair::from_seed(KeyType::Bls12381, &[3; 32]).unwrap();
        let block_id = Hash::from_bytes(b"block");
        let vote = Vote::new(View(4), block_id, ValidatorId(3), &key);
        assert!(vote.verify(&key.public_key()));

        let mut moved = vote.clone();
        moved.view = View(5);
        assert!(!moved.verify(&key.public_key()));

        let mut retargeted = vote;
        retargeted.block_id = Hash::from_bytes(b"other");
        assert!(!retargeted.verify(&key.public_key()));
    }
}
