//! Properly signed fixtures for consensus tests.
//!
//! Validator ids start at 1. Keys are derived from fixed seeds, so every
//! fixture is reproducible across runs.

use canopy_types::{
    AggregateSignature, Block, Hash, KeyPair, KeyType, Payload, QuorumCertificate,
    StaticTopology, TimeoutMessage, Topology, ValidatorId, ValidatorInfo, ValidatorSet, View,
    Vote,
};
use std::sync::Arc;

/// A committee of `n` validators with their signing keys.
#[derive(Debug, Clone)]
pub struct TestCommittee {
    keys: Vec<KeyPair>,
    validator_set: ValidatorSet,
}

impl TestCommittee {
    /// A BLS12-381 committee of `n` validators with ids `1..=n`.
    pub fn new(n: u64) -> Self {
        Self::with_key_type(n, KeyType::Bls12381)
    }

    /// An Ed25519 committee of `n` validators with ids `1..=n`.
    pub fn new_ed25519(n: u64) -> Self {
        Self::with_key_type(n, KeyType::Ed25519)
    }

    fn with_key_type(n: u64, key_type: KeyType) -> Self {
        let keys: Vec<KeyPair> = (1..=n)
            .map(|id| {
                let mut seed = [0u8; 32];
                seed[..8].copy_from_slice(&id.to_le_bytes());
                seed[31] = 0xC0;
                KeyPair::from_seed(key_type, &seed).expect("fixed seeds derive keys")
            })
            .collect();
        let validator_set = ValidatorSet::new(
            keys.iter()
                .enumerate()
                .map(|(i, key)| ValidatorInfo::new(ValidatorId(i as u64 + 1), key.public_key()))
                .collect(),
        );
        Self {
            keys,
            validator_set,
        }
    }

    /// Committee size.
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// Validator ids in ascending order.
    pub fn ids(&self) -> Vec<ValidatorId> {
        self.validator_set.ids()
    }

    /// The validator set.
    pub fn validator_set(&self) -> &ValidatorSet {
        &self.validator_set
    }

    /// Signing key of validator `id`.
    pub fn key(&self, id: u64) -> &KeyPair {
        &self.keys[(id - 1) as usize]
    }

    /// The committee as seen by validator `id`.
    pub fn topology(&self, id: u64) -> Arc<dyn Topology> {
        StaticTopology::new(ValidatorId(id), self.validator_set.clone()).into_arc()
    }

    /// A signed vote.
    pub fn vote(&self, voter: u64, view: View, block_id: Hash) -> Vote {
        Vote::new(view, block_id, ValidatorId(voter), self.key(voter))
    }

    /// A QC signed by `signers` (ascending ids).
    pub fn qc(&self, view: View, block_id: Hash, signers: &[u64]) -> QuorumCertificate {
        let votes: Vec<Vote> = signers
            .iter()
            .map(|s| self.vote(*s, view, block_id))
            .collect();
        let signatures: Vec<_> = votes.iter().map(|v| v.signature.clone()).collect();
        QuorumCertificate::new(
            view,
            block_id,
            AggregateSignature::aggregate(&signatures).expect("signatures share a key type"),
            signers.iter().map(|s| ValidatorId(*s)).collect(),
            ValidatorId(signers[0]),
        )
    }

    /// A QC for `block` signed by the first quorum of the committee.
    pub fn certify(&self, block: &Block) -> QuorumCertificate {
        let quorum = (self.size() * 2) / 3 + 1;
        let signers: Vec<u64> = (1..=quorum as u64).collect();
        self.qc(block.view, block.id, &signers)
    }

    /// A signed block with an empty payload.
    pub fn block(&self, view: View, qc: QuorumCertificate, proposer: u64) -> Block {
        Block::new(view, qc, Payload::empty(), ValidatorId(proposer), view.0 * 100)
            .signed(self.key(proposer))
    }

    /// A signed timeout.
    pub fn timeout(&self, sender: u64, view: View, high_qc: QuorumCertificate) -> TimeoutMessage {
        TimeoutMessage::new(view, ValidatorId(sender), high_qc, None, self.key(sender))
    }
}

/// An unsigned block for tree-structure tests that bypass verification.
pub fn unsigned_block(view: u64, qc_view: u64, parent: Hash, proposer: u64) -> Block {
    Block::new(
        View(view),
        QuorumCertificate::unsigned(View(qc_view), parent),
        Payload::empty(),
        ValidatorId(proposer),
        view * 100,
    )
}

/// An identifier no block will ever have.
pub fn random_id(label: &str) -> Hash {
    Hash::from_parts(&[b"fixture:", label.as_bytes()])
}
