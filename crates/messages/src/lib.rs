//! Network messages for the consensus protocol.
//!
//! Every message a replica can receive is one variant of the closed
//! [`ConsensusMessage`] enum. Receivers dispatch with a `match`, never by
//! runtime type lookup.

pub mod gossip;

pub use gossip::{ProposalGossip, TimeoutCertificateGossip, TimeoutGossip, VoteGossip};

use canopy_types::{NetworkMessage, ValidatorId, View};
use serde::{Deserialize, Serialize};

/// Every message exchanged between replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum ConsensusMessage {
    /// Block proposal.
    Proposal(ProposalGossip),
    /// Vote on a block.
    Vote(VoteGossip),
    /// Local view timer expired at the sender.
    Timeout(TimeoutGossip),
    /// A supermajority timed out a view.
    TimeoutCertificate(TimeoutCertificateGossip),
}

impl ConsensusMessage {
    /// Stable type id of the wrapped message.
    pub fn message_type_id(&self) -> &'static str {
        match self {
            ConsensusMessage::Proposal(_) => ProposalGossip::message_type_id(),
            ConsensusMessage::Vote(_) => VoteGossip::message_type_id(),
            ConsensusMessage::Timeout(_) => TimeoutGossip::message_type_id(),
            ConsensusMessage::TimeoutCertificate(_) => TimeoutCertificateGossip::message_type_id(),
        }
    }

    /// The view the message refers to.
    pub fn view(&self) -> View {
        match self {
            ConsensusMessage::Proposal(gossip) => gossip.block.view,
            ConsensusMessage::Vote(gossip) => gossip.vote.view,
            ConsensusMessage::Timeout(gossip) => gossip.timeout.view,
            ConsensusMessage::TimeoutCertificate(gossip) => gossip.certificate.view,
        }
    }

    /// The validator that authored the message, where it names one.
    pub fn author(&self) -> Option<ValidatorId> {
        match self {
            ConsensusMessage::Proposal(gossip) => Some(gossip.block.proposer),
            ConsensusMessage::Vote(gossip) => Some(gossip.vote.voter),
            ConsensusMessage::Timeout(gossip) => Some(gossip.timeout.sender),
            ConsensusMessage::TimeoutCertificate(_) => None,
        }
    }
}

impl From<ProposalGossip> for ConsensusMessage {
    fn from(gossip: ProposalGossip) -> Self {
        ConsensusMessage::Proposal(gossip)
    }
}

impl From<VoteGossip> for ConsensusMessage {
    fn from(gossip: VoteGossip) -> Self {
        ConsensusMessage::Vote(gossip)
    }
}

impl From<TimeoutGossip> for ConsensusMessage {
    fn from(gossip: TimeoutGossip) -> Self {
        ConsensusMessage::Timeout(gossip)
    }
}

impl From<TimeoutCertificateGossip> for ConsensusMessage {
    fn from(gossip: TimeoutCertificateGossip) -> Self {
        ConsensusMessage::TimeoutCertificate(gossip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_test_helpers::TestCommittee;
    use canopy_types::{Block, Payload, QuorumCertificate};

    #[test]
    fn test_json_envelope_is_tagged() {
        let committee = TestCommittee::new(4);
        let vote = committee.vote(1, View(3), canopy_types::Hash::from_bytes(b"b"));
        let message = ConsensusMessage::from(VoteGossip::new(vote.clone()));

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "vote");

        let decoded: ConsensusMessage = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.author(), Some(vote.voter));
    }

    #[test]
    fn test_dispatch_metadata() {
        let block = Block::new(
            View(1),
            QuorumCertificate::genesis(),
            Payload::empty(),
            ValidatorId(2),
            0,
        );
        let message = ConsensusMessage::from(ProposalGossip::new(block));
        assert_eq!(message.message_type_id(), "consensus.proposal");
        assert_eq!(message.view(), View(1));
    }
}
