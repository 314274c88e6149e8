//! Timeout gossip message.

use canopy_types::{NetworkMessage, TimeoutMessage};
use serde::{Deserialize, Serialize};

/// Timeout for a view. A supermajority of these for the same view forms a TC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutGossip {
    /// The timeout being gossiped.
    pub timeout: TimeoutMessage,
}

impl TimeoutGossip {
    /// Create a new timeout gossip message.
    pub fn new(timeout: TimeoutMessage) -> Self {
        Self { timeout }
    }

    /// Consume and return the inner timeout.
    pub fn into_timeout(self) -> TimeoutMessage {
        self.timeout
    }
}

impl NetworkMessage for TimeoutGossip {
    fn message_type_id() -> &'static str {
        "consensus.timeout"
    }
}
