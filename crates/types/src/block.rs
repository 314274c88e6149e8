//! Block and payload types for consensus.

use crate::{
    block_proposal_message, Hash, KeyPair, QuorumCertificate, Signature, ValidatorId, View,
    DOMAIN_BLOCK_ID,
};
use serde::{Deserialize, Serialize};

/// Opaque transaction batch carried by a block.
///
/// Consensus never interprets the transactions; it only commits to them
/// through [`Payload::hash`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Raw transactions in proposal order.
    pub transactions: Vec<Vec<u8>>,
}

impl Payload {
    /// Create a payload from raw transactions.
    pub fn new(transactions: Vec<Vec<u8>>) -> Self {
        Self { transactions }
    }

    /// A payload with no transactions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True if the batch carries nothing.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Commitment to the batch contents. Each transaction is length-prefixed.
    pub fn hash(&self) -> Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            hasher.update(&(tx.len() as u64).to_le_bytes());
            hasher.update(tx);
        }
        Hash::from_raw(*hasher.finalize().as_bytes())
    }
}

/// A proposed block.
///
/// Blocks are immutable once built: `id` is derived from every other field
/// except the signature, and the proposer signs the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// View in which the block was proposed.
    pub view: View,

    /// Deterministic hash of the signable fields.
    pub id: Hash,

    /// Identifier of the parent block.
    pub prev_id: Hash,

    /// Validator that proposed this block.
    pub proposer: ValidatorId,

    /// Certificate of the ancestor this block extends.
    pub qc: QuorumCertificate,

    /// Proposer signature over the id.
    pub signature: Signature,

    /// Milliseconds since the runner's epoch when the block was built.
    pub timestamp: u64,

    /// Transactions carried by the block.
    pub payload: Payload,
}

impl Block {
    /// Build an unsigned block extending the block certified by `qc`.
    pub fn new(
        view: View,
        qc: QuorumCertificate,
        payload: Payload,
        proposer: ValidatorId,
        timestamp: u64,
    ) -> Self {
        let prev_id = qc.block_id;
        let id = Self::compute_id(view, &prev_id, proposer, &qc, timestamp, &payload);
        Self {
            view,
            id,
            prev_id,
            proposer,
            qc,
            signature: Signature::zero(),
            timestamp,
            payload,
        }
    }

    /// Attach the proposer's signature.
    pub fn signed(mut self, key: &KeyPair) -> Self {
        self.signature = key.sign(&self.signing_message());
        self
    }

    /// The fixed genesis block every replica starts from.
    pub fn genesis() -> Self {
        Self::new(
            View::GENESIS,
            QuorumCertificate::pre_genesis(),
            Payload::empty(),
            ValidatorId(0),
            0,
        )
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.view == View::GENESIS && self.prev_id == Hash::ZERO
    }

    /// Hash the signable fields of a block.
    pub fn compute_id(
        view: View,
        prev_id: &Hash,
        proposer: ValidatorId,
        qc: &QuorumCertificate,
        timestamp: u64,
        payload: &Payload,
    ) -> Hash {
        Hash::from_parts(&[
            DOMAIN_BLOCK_ID,
            &view.0.to_le_bytes(),
            prev_id.as_bytes(),
            &proposer.0.to_le_bytes(),
            &qc.view.0.to_le_bytes(),
            qc.block_id.as_bytes(),
            &timestamp.to_le_bytes(),
            payload.hash().as_bytes(),
        ])
    }

    /// True if `id` matches the block's contents.
    pub fn has_valid_id(&self) -> bool {
        self.id
            == Self::compute_id(
                self.view,
                &self.prev_id,
                self.proposer,
                &self.qc,
                self.timestamp,
                &self.payload,
            )
    }

    /// The message the proposer signs.
    pub fn signing_message(&self) -> Vec<u8> {
        block_proposal_message(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_stable() {
        let a = Block::genesis();
        let b = Block::genesis();
        assert_eq!(a.id, b.id);
        assert!(a.is_genesis());
        assert!(a.has_valid_id());
        assert_eq!(QuorumCertificate::genesis().block_id, a.id);
    }

    #[test]
    fn test_id_covers_payload_and_qc() {
        let qc = QuorumCertificate::genesis();
        let a = Block::new(View(1), qc.clone(), Payload::empty(), ValidatorId(1), 10);
        let b = Block::new(
            View(1),
            qc.clone(),
            Payload::new(vec![b"tx".to_vec()]),
            ValidatorId(1),
            10,
        );
        let c = Block::new(View(2), qc, Payload::empty(), ValidatorId(1), 10);

        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.prev_id, a.qc.block_id);
    }

    #[test]
    fn test_tampered_block_fails_id_check() {
        let mut block = Block::new(
            View(1),
            QuorumCertificate::genesis(),
            Payload::empty(),
            ValidatorId(1),
            10,
        );
        block.payload = Payload::new(vec![b"injected".to_vec()]);
        assert!(!block.has_valid_id());
    }

    #[test]
    fn test_payload_hash_is_length_prefixed() {
        let split = Payload::new(vec![b"ab".to_vec(), b"c".to_vec()]);
        let joined = Payload::new(vec![b"a".to_vec(), b"bc".to_vec()]);
        assert_ne!(split.hash(), joined.hash());
    }

    #[test]
    fn test_signed_block_verifies() {
        let key = KeyPair::from_seed(crate::KeyType::Ed25519, &[9; 32]).unwrap();
        let block = Block::new(
            View(1),
            QuorumCertificate::genesis(),
            Payload::empty(),
            ValidatorId(1),
            10,
        )
        .signed(&key);

        assert!(key
            .public_key()
            .verify(&block.signing_message(), &block.signature));
    }
}
