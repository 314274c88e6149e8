//! Core types for Canopy consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, cryptographic keys and signatures
//! - **Identifiers**: ValidatorId, View, VotePower
//! - **Consensus types**: Block, Vote, QuorumCertificate, TimeoutMessage,
//!   TimeoutCertificate
//! - **Collaborators**: Topology (identity and committee), Election
//!
//! This crate does not depend on any other workspace crate.

mod crypto;
mod hash;
mod identifiers;
mod signing;

// Consensus types
mod block;
mod election;
mod quorum_certificate;
mod timeout;
mod topology;
mod validator;
mod vote;

pub use crypto::{
    AggregateError, AggregateSignature, KeyError, KeyPair, KeyType, PublicKey, Signature,
};
pub use hash::{Hash, HexError};
pub use identifiers::{ValidatorId, View, VotePower};
pub use signing::{
    block_proposal_message, block_vote_message, timeout_message, DOMAIN_BLOCK_ID,
    DOMAIN_BLOCK_PROPOSAL, DOMAIN_BLOCK_VOTE, DOMAIN_TIMEOUT,
};

pub use block::{Block, Payload};
pub use election::{Election, ElectionKind, RotationElection, RoundRobinElection, StaticElection};
pub use quorum_certificate::{CertificateError, QuorumCertificate};
pub use timeout::{TimeoutCertificate, TimeoutMessage};
pub use topology::{StaticTopology, Topology};
pub use validator::{ValidatorInfo, ValidatorSet};
pub use vote::Vote;

/// Marker for types that travel over the network.
///
/// The type id is stable across versions and is what a transport uses to
/// dispatch an incoming frame to the right decoder.
pub trait NetworkMessage {
    /// Stable identifier for the message type.
    fn message_type_id() -> &'static str;
}
