//! Cryptographic key pairs and signatures.
//!
//! Supports:
//! - ED25519: Fast signing, certificates carry a batch of signatures
//! - BLS12-381: Signature aggregation, certificates carry one signature

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// ED25519 - Fast, widely supported.
    Ed25519,
    /// BLS12-381 - Supports signature aggregation.
    Bls12381,
}

/// A cryptographic key pair for signing.
#[derive(Clone)]
pub enum KeyPair {
    /// ED25519 key pair.
    Ed25519(ed25519_dalek::SigningKey),
    /// BLS12-381 key pair.
    Bls12381(blst::min_pk::SecretKey),
}

impl KeyPair {
    /// Generate a new random Ed25519 keypair.
    pub fn generate_ed25519() -> Self {
        let mut csprng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        KeyPair::Ed25519(signing_key)
    }

    /// Generate a new random BLS12-381 keypair.
    pub fn generate_bls() -> Result<Self, KeyError> {
        let mut ikm = [0u8; 32];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut ikm);
        Self::from_seed(KeyType::Bls12381, &ikm)
    }

    /// Generate a keypair from a seed (for testing/simulation).
    pub fn from_seed(key_type: KeyType, seed: &[u8; 32]) -> Result<Self, KeyError> {
        match key_type {
            KeyType::Ed25519 => Ok(KeyPair::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                seed,
            ))),
            KeyType::Bls12381 => blst::min_pk::SecretKey::key_gen(seed, &[])
                .map(KeyPair::Bls12381)
                .map_err(|_| KeyError::InvalidSeed),
        }
    }

    /// The algorithm behind this key.
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyPair::Ed25519(_) => KeyType::Ed25519,
            KeyPair::Bls12381(_) => KeyType::Bls12381,
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        match self {
            KeyPair::Ed25519(signing_key) => {
                use ed25519_dalek::Signer;
                let sig = signing_key.sign(message);
                Signature::Ed25519(sig.to_bytes().to_vec())
            }
            KeyPair::Bls12381(sk) => {
                let sig = sk.sign(message, &[], &[]);
                Signature::Bls12381(sig.to_bytes().to_vec())
            }
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::Ed25519(signing_key) => {
                PublicKey::Ed25519(signing_key.verifying_key().to_bytes())
            }
            KeyPair::Bls12381(sk) => PublicKey::Bls12381(sk.sk_to_pk().to_bytes().to_vec()),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({:?})", self.public_key())
    }
}

/// A public key for signature verification.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PublicKey {
    /// ED25519 public key (32 bytes).
    Ed25519([u8; 32]),
    /// BLS12-381 public key (48 bytes compressed).
    Bls12381(Vec<u8>),
}

impl PublicKey {
    /// Verify a signature.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        match (self, signature) {
            (PublicKey::Ed25519(pk_bytes), Signature::Ed25519(sig_bytes)) => {
                use ed25519_dalek::Verifier;
                let pk = match ed25519_dalek::VerifyingKey::from_bytes(pk_bytes) {
                    Ok(pk) => pk,
                    Err(_) => return false,
                };
                let sig_array: [u8; 64] = match sig_bytes.as_slice().try_into() {
                    Ok(arr) => arr,
                    Err(_) => return false,
                };
                let sig = ed25519_dalek::Signature::from_bytes(&sig_array);
                pk.verify(message, &sig).is_ok()
            }
            (PublicKey::Bls12381(pk_bytes), Signature::Bls12381(sig_bytes)) => {
                let pk = match blst::min_pk::PublicKey::from_bytes(pk_bytes) {
                    Ok(pk) => pk,
                    Err(_) => return false,
                };
                let sig = match blst::min_pk::Signature::from_bytes(sig_bytes) {
                    Ok(sig) => sig,
                    Err(_) => return false,
                };
                sig.verify(true, message, &[], &[], &pk, true) == blst::BLST_ERROR::BLST_SUCCESS
            }
            _ => false, // Mismatched types
        }
    }

    /// Aggregate multiple BLS public keys.
    pub fn aggregate_bls(pubkeys: &[PublicKey]) -> Result<Self, AggregateError> {
        if pubkeys.is_empty() {
            return Err(AggregateError::Empty);
        }

        let bls_pks: Vec<_> = pubkeys
            .iter()
            .filter_map(|pk| match pk {
                PublicKey::Bls12381(bytes) => blst::min_pk::PublicKey::from_bytes(bytes).ok(),
                _ => None,
            })
            .collect();

        if bls_pks.len() != pubkeys.len() {
            return Err(AggregateError::MixedTypes);
        }

        let refs: Vec<&blst::min_pk::PublicKey> = bls_pks.iter().collect();
        let agg = blst::min_pk::AggregatePublicKey::aggregate(&refs, false)
            .map_err(|_| AggregateError::AggregationFailed)?;

        Ok(PublicKey::Bls12381(agg.to_public_key().to_bytes().to_vec()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicKey::Ed25519(bytes) => {
                let hex = hex::encode(bytes);
                write!(f, "PublicKey::Ed25519({}..)", &hex[..16])
            }
            PublicKey::Bls12381(bytes) => {
                let hex = hex::encode(bytes);
                let head = hex.get(..8).unwrap_or(&hex);
                let tail = hex.get(hex.len().saturating_sub(8)..).unwrap_or(&hex);
                write!(f, "PublicKey::Bls12381({head}..{tail})")
            }
        }
    }
}

/// A cryptographic signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signature {
    /// ED25519 signature (64 bytes).
    Ed25519(Vec<u8>),
    /// BLS12-381 signature (96 bytes compressed).
    Bls12381(Vec<u8>),
}

impl Signature {
    /// Create a zero/placeholder signature (genesis and unsigned fixtures).
    pub fn zero() -> Self {
        Signature::Ed25519(vec![0u8; 64])
    }

    /// Get signature as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Signature::Ed25519(bytes) => bytes.as_slice(),
            Signature::Bls12381(bytes) => bytes.as_slice(),
        }
    }

    /// Aggregate multiple BLS signatures.
    pub fn aggregate_bls(signatures: &[Signature]) -> Result<Self, AggregateError> {
        if signatures.is_empty() {
            return Err(AggregateError::Empty);
        }

        let bls_sigs: Vec<_> = signatures
            .iter()
            .filter_map(|s| match s {
                Signature::Bls12381(bytes) => blst::min_pk::Signature::from_bytes(bytes).ok(),
                _ => None,
            })
            .collect();

        if bls_sigs.len() != signatures.len() {
            return Err(AggregateError::MixedTypes);
        }

        let refs: Vec<&blst::min_pk::Signature> = bls_sigs.iter().collect();
        let agg = blst::min_pk::AggregateSignature::aggregate(&refs, true)
            .map_err(|_| AggregateError::AggregationFailed)?;

        Ok(Signature::Bls12381(agg.to_signature().to_bytes().to_vec()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, bytes) = match self {
            Signature::Ed25519(bytes) => ("Ed25519", bytes),
            Signature::Bls12381(bytes) => ("Bls12381", bytes),
        };
        let hex = hex::encode(bytes);
        write!(f, "Signature::{}({}..)", name, hex.get(..16).unwrap_or(&hex))
    }
}

/// The signature carried by a certificate.
///
/// BLS signatures over one message collapse into a single aggregate. Ed25519
/// signatures cannot be aggregated, so they travel as a batch ordered like the
/// certificate's signer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateSignature {
    /// No signers (genesis certificate).
    Empty,
    /// One BLS signature aggregated from every signer.
    Bls(Signature),
    /// Individual signatures, one per signer.
    Batch(Vec<Signature>),
}

impl AggregateSignature {
    /// Combine signatures produced over the same message.
    pub fn aggregate(signatures: &[Signature]) -> Result<Self, AggregateError> {
        let Some(first) = signatures.first() else {
            return Err(AggregateError::Empty);
        };

        match first {
            Signature::Bls12381(_) => Signature::aggregate_bls(signatures).map(Self::Bls),
            Signature::Ed25519(_) => {
                if signatures
                    .iter()
                    .all(|s| matches!(s, Signature::Ed25519(_)))
                {
                    Ok(Self::Batch(signatures.to_vec()))
                } else {
                    Err(AggregateError::MixedTypes)
                }
            }
        }
    }

    /// Verify against the public keys of the signers, in signer order.
    pub fn verify(&self, message: &[u8], pubkeys: &[PublicKey]) -> bool {
        match self {
            AggregateSignature::Empty => pubkeys.is_empty(),
            AggregateSignature::Bls(signature) => match PublicKey::aggregate_bls(pubkeys) {
                Ok(aggregate_key) => aggregate_key.verify(message, signature),
                Err(_) => false,
            },
            AggregateSignature::Batch(signatures) => {
                signatures.len() == pubkeys.len()
                    && signatures
                        .iter()
                        .zip(pubkeys)
                        .all(|(signature, pk)| pk.verify(message, signature))
            }
        }
    }

    /// Number of component signatures (1 for an aggregated BLS signature).
    pub fn len(&self) -> usize {
        match self {
            AggregateSignature::Empty => 0,
            AggregateSignature::Bls(_) => 1,
            AggregateSignature::Batch(signatures) => signatures.len(),
        }
    }

    /// True for the genesis (signer-less) form.
    pub fn is_empty(&self) -> bool {
        matches!(self, AggregateSignature::Empty)
    }
}

/// Errors that can occur during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// Empty list provided.
    #[error("Cannot aggregate empty list")]
    Empty,

    /// Mixed key/signature types.
    #[error("Cannot aggregate mixed types (ED25519 and BLS)")]
    MixedTypes,

    /// Aggregation operation failed.
    #[error("Aggregation failed")]
    AggregationFailed,
}

/// Errors from key construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// The seed was rejected by the key derivation.
    #[error("Seed cannot derive a key")]
    InvalidSeed,
}
