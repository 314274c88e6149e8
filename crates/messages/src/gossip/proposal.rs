//! Proposal gossip message.

use canopy_types::{Block, NetworkMessage};
use serde::{Deserialize, Serialize};

/// A leader's block proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalGossip {
    /// The proposed block.
    pub block: Block,
}

impl ProposalGossip {
    /// Create a new proposal gossip message.
    pub fn new(block: Block) -> Self {
        Self { block }
    }

    /// Consume and return the inner block.
    pub fn into_block(self) -> Block {
        self.block
    }
}

impl NetworkMessage for ProposalGossip {
    fn message_type_id() -> &'static str {
        "consensus.proposal"
    }
}
