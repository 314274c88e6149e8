//! Quorum certificates.

use crate::{
    block_vote_message, AggregateSignature, Block, Hash, Topology, ValidatorId, View, VotePower,
};
use serde::{Deserialize, Serialize};

/// Aggregated proof that a supermajority voted for a specific block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumCertificate {
    /// View of the certified block.
    pub view: View,

    /// Identifier of the certified block.
    pub block_id: Hash,

    /// Signature of every signer over `block_vote_message(view, block_id)`.
    pub aggregated_signature: AggregateSignature,

    /// Signers in ascending id order.
    pub signers: Vec<ValidatorId>,

    /// Replica that assembled the certificate.
    pub leader: ValidatorId,
}

impl QuorumCertificate {
    /// Create a certificate from already-aggregated parts.
    pub fn new(
        view: View,
        block_id: Hash,
        aggregated_signature: AggregateSignature,
        signers: Vec<ValidatorId>,
        leader: ValidatorId,
    ) -> Self {
        Self {
            view,
            block_id,
            aggregated_signature,
            signers,
            leader,
        }
    }

    /// The certificate for the genesis block.
    pub fn genesis() -> Self {
        Self::signerless(View::GENESIS, Block::genesis().id)
    }

    /// The placeholder certificate embedded in the genesis block itself.
    pub(crate) fn pre_genesis() -> Self {
        Self::signerless(View::GENESIS, Hash::ZERO)
    }

    fn signerless(view: View, block_id: Hash) -> Self {
        Self {
            view,
            block_id,
            aggregated_signature: AggregateSignature::Empty,
            signers: Vec::new(),
            leader: ValidatorId(0),
        }
    }

    /// Check if this is the genesis certificate.
    pub fn is_genesis(&self) -> bool {
        self.view == View::GENESIS && self.signers.is_empty()
    }

    /// Number of distinct signers.
    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }

    /// The message every signer signed.
    pub fn signing_message(&self) -> Vec<u8> {
        block_vote_message(self.view, &self.block_id)
    }

    /// Verify quorum size, committee membership and the aggregate signature.
    pub fn verify(&self, topology: &dyn Topology) -> Result<(), CertificateError> {
        if self.is_genesis() {
            return if *self == Self::genesis() {
                Ok(())
            } else {
                Err(CertificateError::ForgedGenesis)
            };
        }

        verify_signers(&self.signers, topology)?;
        let pubkeys = topology
            .public_keys(&self.signers)
            .ok_or(CertificateError::UnknownSigner)?;
        if !self
            .aggregated_signature
            .verify(&self.signing_message(), &pubkeys)
        {
            return Err(CertificateError::InvalidSignature);
        }
        Ok(())
    }

    /// An unsigned certificate for building block trees in tests.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn unsigned(view: View, block_id: Hash) -> Self {
        Self::signerless(view, block_id)
    }
}

/// Check that a signer list is strictly ascending, known, and a quorum.
pub(crate) fn verify_signers(
    signers: &[ValidatorId],
    topology: &dyn Topology,
) -> Result<(), CertificateError> {
    if signers.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(CertificateError::UnsortedSigners);
    }
    if let Some(unknown) = signers.iter().find(|s| !topology.is_committee_member(**s)) {
        return Err(CertificateError::NotInCommittee(*unknown));
    }
    let total = topology.committee_size() as u64;
    if !VotePower::has_quorum(signers.len() as u64, total) {
        return Err(CertificateError::InsufficientQuorum {
            signers: signers.len(),
            required: VotePower::quorum_threshold(total) as usize,
        });
    }
    Ok(())
}

/// Reasons a certificate fails verification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CertificateError {
    /// Signer count below the supermajority.
    #[error("insufficient quorum: {signers} signers, {required} required")]
    InsufficientQuorum {
        /// Signers present.
        signers: usize,
        /// Signers required.
        required: usize,
    },

    /// Signer list not strictly ascending (duplicates or reordering).
    #[error("signer list is not strictly ascending")]
    UnsortedSigners,

    /// A signer is not part of the committee.
    #[error("signer {0} is not in the committee")]
    NotInCommittee(ValidatorId),

    /// A signer has no registered public key.
    #[error("signer has no public key")]
    UnknownSigner,

    /// Aggregate signature does not verify.
    #[error("aggregate signature does not verify")]
    InvalidSignature,

    /// A signerless certificate that is not the genesis certificate.
    #[error("signerless certificate does not certify genesis")]
    ForgedGenesis,
}
