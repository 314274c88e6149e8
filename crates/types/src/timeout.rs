//! Timeout messages and timeout certificates for view synchronization.

use crate::quorum_certificate::verify_signers;
use crate::{
    timeout_message, AggregateSignature, CertificateError, KeyPair, PublicKey, QuorumCertificate,
    Signature, Topology, ValidatorId, View,
};
use serde::{Deserialize, Serialize};

/// Broadcast when a replica's local timer for `view` fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutMessage {
    /// The view that timed out.
    pub view: View,

    /// Replica that timed out.
    pub sender: ValidatorId,

    /// Highest QC known to the sender.
    pub high_qc: QuorumCertificate,

    /// Highest TC known to the sender, if any.
    pub high_tc: Option<TimeoutCertificate>,

    /// Signature over `timeout_message(view)`.
    pub signature: Signature,
}

impl TimeoutMessage {
    /// Create and sign a timeout message.
    pub fn new(
        view: View,
        sender: ValidatorId,
        high_qc: QuorumCertificate,
        high_tc: Option<TimeoutCertificate>,
        signing_key: &KeyPair,
    ) -> Self {
        let signature = signing_key.sign(&timeout_message(view));
        Self {
            view,
            sender,
            high_qc,
            high_tc,
            signature,
        }
    }

    /// The message that was signed.
    pub fn signing_message(&self) -> Vec<u8> {
        timeout_message(self.view)
    }

    /// Verify the signature against the sender's public key.
    pub fn verify(&self, public_key: &PublicKey) -> bool {
        public_key.verify(&self.signing_message(), &self.signature)
    }
}

/// Aggregated proof that a supermajority timed out `view`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutCertificate {
    /// The view that timed out.
    pub view: View,

    /// Signers in ascending id order.
    pub signers: Vec<ValidatorId>,

    /// Signature of every signer over `timeout_message(view)`.
    pub aggregated_signature: AggregateSignature,

    /// Highest QC reported by any signer.
    pub high_qc: QuorumCertificate,
}

impl TimeoutCertificate {
    /// Assemble a certificate from timeouts for the same view.
    ///
    /// `timeouts` must be sorted by sender; the caller guarantees quorum.
    pub fn from_timeouts(
        view: View,
        timeouts: &[&TimeoutMessage],
    ) -> Result<Self, crate::AggregateError> {
        let signatures: Vec<Signature> = timeouts.iter().map(|t| t.signature.clone()).collect();
        let aggregated_signature = AggregateSignature::aggregate(&signatures)?;
        let high_qc = timeouts
            .iter()
            .map(|t| &t.high_qc)
            .max_by_key(|qc| qc.view)
            .cloned()
            .unwrap_or_else(QuorumCertificate::genesis);

        Ok(Self {
            view,
            signers: timeouts.iter().map(|t| t.sender).collect(),
            aggregated_signature,
            high_qc,
        })
    }

    /// Number of distinct signers.
    pub fn signer_count(&self) -> usize {
        self.signers.len()
    }

    /// Verify quorum, membership, the aggregate signature and the carried QC.
    pub fn verify(&self, topology: &dyn Topology) -> Result<(), CertificateError> {
        verify_signers(&self.signers, topology)?;
        let pubkeys = topology
            .public_keys(&self.signers)
            .ok_or(CertificateError::UnknownSigner)?;
        if !self
            .aggregated_signature
            .verify(&timeout_message(self.view), &pubkeys)
        {
            return Err(CertificateError::InvalidSignature);
        }
        self.high_qc.verify(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Hash, KeyType, StaticTopology, ValidatorInfo, ValidatorSet};

    fn committee() -> (Vec<KeyPair>, StaticTopology) {
        let keys: Vec<_> = (1..=4u8)
            .map(|i| KeyPair::from_seed(KeyType::Ed25519, &[i; 32]).unwrap())
            .collect();
        let set = ValidatorSet::new(
            keys.iter()
                .enumerate()
                .map(|(i, k)| ValidatorInfo::new(ValidatorId(i as u64 + 1), k.public_key()))
                .collect(),
        );
        (keys, StaticTopology::new(ValidatorId(1), set))
    }

    #[test]
    fn test_tc_carries_highest_qc() {
        let (keys, topology) = committee();
        let low = QuorumCertificate::genesis();
        let mut high = QuorumCertificate::unsigned(View(3), Hash::from_bytes(b"b3"));
        high.leader = ValidatorId(2);

        let t1 = TimeoutMessage::new(View(7), ValidatorId(1), low.clone(), None, &keys[0]);
        let t2 = TimeoutMessage::new(View(7), ValidatorId(2), high.clone(), None, &keys[1]);
        let t3 = TimeoutMessage::new(View(7), ValidatorId(3), low, None, &keys[2]);

        let tc = TimeoutCertificate::from_timeouts(View(7), &[&t1, &t2, &t3]).unwrap();
        assert_eq!(tc.high_qc, high);
        assert_eq!(
            tc.signers,
            vec![ValidatorId(1), ValidatorId(2), ValidatorId(3)]
        );
        // Carried QC is unsigned here, so full verification must fail on it.
        assert!(tc.verify(&topology).is_err());
    }

    #[test]
    fn test_tc_with_genesis_qc_verifies() {
        let (keys, topology) = committee();
        let timeouts: Vec<_> = (0..3)
            .map(|i| {
                TimeoutMessage::new(
                    View(2),
                    ValidatorId(i as u64 + 1),
                    QuorumCertificate::genesis(),
                    None,
                    &keys[i],
                )
            })
            .collect();
        let refs: Vec<_> = timeouts.iter().collect();
        let tc = TimeoutCertificate::from_timeouts(View(2), &refs).unwrap();
        assert_eq!(tc.verify(&topology), Ok(()));

        let mut forged = tc;
        forged.view = View(3);
        assert_eq!(
            forged.verify(&topology),
            Err(CertificateError::InvalidSignature)
        );
    }

    #[test]
    fn test_timeout_signature() {
        let (keys, _) = committee();
        let tmo = TimeoutMessage::new(
            View(9),
            ValidatorId(1),
            QuorumCertificate::genesis(),
            None,
            &keys[0],
        );
        assert!(tmo.verify(&keys[0].public_key()));
        assert!(!tmo.verify(&keys[1].public_key()));
    }
}
