//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! Each message travels as a `(type id, body)` pair. The body is the JSON
//! encoding of the gossip struct:
//!
//! ```text
//! "consensus.vote"  {"vote":{"view":7,"block_id":...}}
//! ```
//!
//! # Type Dispatch
//!
//! The message type is carried next to the body, not inside it, so the
//! receiver picks the decoder before touching the payload.

use canopy_core::Event;
use canopy_messages::{
    ConsensusMessage, ProposalGossip, TimeoutCertificateGossip, TimeoutGossip, VoteGossip,
};
use canopy_types::NetworkMessage;
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message too short")]
    MessageTooShort,

    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Unknown message type: {0}")]
    UnknownType(String),
}

/// Encode a message body for the wire. The type id travels separately as
/// [`ConsensusMessage::message_type_id`].
pub fn encode_message(message: &ConsensusMessage) -> Result<Vec<u8>, CodecError> {
    match message {
        ConsensusMessage::Proposal(gossip) => serde_json::to_vec(gossip),
        ConsensusMessage::Vote(gossip) => serde_json::to_vec(gossip),
        ConsensusMessage::Timeout(gossip) => serde_json::to_vec(gossip),
        ConsensusMessage::TimeoutCertificate(gossip) => serde_json::to_vec(gossip),
    }
    .map_err(CodecError::Encode)
}

/// Decode a wire body into the event it delivers.
pub fn decode_message(type_id: &str, data: &[u8]) -> Result<Event, CodecError> {
    if data.is_empty() {
        return Err(CodecError::MessageTooShort);
    }

    let message = match type_id {
        t if t == ProposalGossip::message_type_id() => {
            ConsensusMessage::Proposal(decode_body(data)?)
        }
        t if t == VoteGossip::message_type_id() => ConsensusMessage::Vote(decode_body(data)?),
        t if t == TimeoutGossip::message_type_id() => {
            ConsensusMessage::Timeout(decode_body(data)?)
        }
        t if t == TimeoutCertificateGossip::message_type_id() => {
            ConsensusMessage::TimeoutCertificate(decode_body(data)?)
        }
        other => return Err(CodecError::UnknownType(other.to_string())),
    };
    Ok(Event::from(message))
}

fn decode_body<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(data).map_err(CodecError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_types::{
        Block, Hash, KeyPair, KeyType, Payload, QuorumCertificate, TimeoutMessage, ValidatorId,
        View, Vote,
    };

    fn key() -> KeyPair {
        KeyPair::from_seed(KeyType::Ed25519, &[7; 32]).unwrap()
    }

    #[test]
    fn test_vote_survives_the_wire() {
        let vote = Vote::new(View(3), Hash::from_bytes(b"block"), ValidatorId(2), &key());
        let message = ConsensusMessage::from(VoteGossip::new(vote.clone()));

        let bytes = encode_message(&message).unwrap();
        let event = decode_message(message.message_type_id(), &bytes).unwrap();

        assert_eq!(event, Event::VoteReceived { vote });
    }

    #[test]
    fn test_proposal_and_timeout_survive_the_wire() {
        let block = Block::new(
            View(1),
            QuorumCertificate::genesis(),
            Payload::new(vec![b"tx".to_vec()]),
            ValidatorId(1),
            42,
        )
        .signed(&key());
        let proposal = ConsensusMessage::from(ProposalGossip::new(block.clone()));
        let event = decode_message(
            proposal.message_type_id(),
            &encode_message(&proposal).unwrap(),
        )
        .unwrap();
        assert_eq!(event, Event::ProposalReceived { block });

        let timeout =
            TimeoutMessage::new(View(4), ValidatorId(1), QuorumCertificate::genesis(), None, &key());
        let message = ConsensusMessage::from(TimeoutGossip::new(timeout.clone()));
        let event =
            decode_message(message.message_type_id(), &encode_message(&message).unwrap()).unwrap();
        assert_eq!(event, Event::TimeoutReceived { timeout });
    }

    #[test]
    fn test_type_id_selects_decoder() {
        let vote = Vote::new(View(3), Hash::from_bytes(b"block"), ValidatorId(2), &key());
        let bytes = encode_message(&VoteGossip::new(vote).into()).unwrap();

        assert!(matches!(
            decode_message("consensus.proposal", &bytes),
            Err(CodecError::Decode(_))
        ));
        assert!(matches!(
            decode_message("consensus.unknown", &bytes),
            Err(CodecError::UnknownType(_))
        ));
        assert!(matches!(
            decode_message("consensus.vote", &[]),
            Err(CodecError::MessageTooShort)
        ));
    }
}
