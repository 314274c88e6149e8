//! Vote gossip message.

use canopy_types::{NetworkMessage, Vote};
use serde::{Deserialize, Serialize};

/// A vote, sent to the next leader or broadcast depending on the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteGossip {
    /// The vote being gossiped.
    pub vote: Vote,
}

impl VoteGossip {
    /// Create a new vote gossip message.
    pub fn new(vote: Vote) -> Self {
        Self { vote }
    }

    /// Consume and return the inner vote.
    pub fn into_vote(self) -> Vote {
        self.vote
    }
}

impl NetworkMessage for VoteGossip {
    fn message_type_id() -> &'static str {
        "consensus.vote"
    }
}
