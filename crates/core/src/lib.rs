//! Core types for the consensus state machine.
//!
//! - [`Event`]: everything a replica reacts to (network input, timers, payloads)
//! - [`Action`]: everything a replica asks its runner to do
//! - [`StateMachine`]: the synchronous, deterministic handler between them
//!
//! Runners (the deterministic simulator and the tokio production runner)
//! own all I/O. The state machine never blocks.

mod error;
mod mempool;
mod traits;

pub use error::FatalError;
pub use mempool::{Mempool, QueueMempool};
pub use traits::StateMachine;

use canopy_messages::ConsensusMessage;
use canopy_types::{
    Block, Payload, TimeoutCertificate, TimeoutMessage, ValidatorId, View, Vote,
};
use std::time::Duration;

/// Timers a replica can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// Local timeout for a view.
    View(View),
}

impl TimerId {
    /// The event delivered when this timer fires.
    pub fn into_event(self) -> Event {
        match self {
            TimerId::View(view) => Event::ViewTimer { view },
        }
    }
}

/// Ordering class used by runners when events are due at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    /// Lifecycle and locally produced input.
    Internal = 0,
    /// Timer expiry.
    Timer = 1,
    /// Messages from other replicas.
    Network = 2,
}

/// Input to a replica's state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════
    /// Replica starts participating: enter the first view.
    Start,

    /// Payload requested via [`Action::RequestPayload`] is available.
    PayloadReady {
        /// View the payload was requested for.
        view: View,
        /// Transactions to propose.
        payload: Payload,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// The local timer for `view` expired.
    ViewTimer {
        /// The view that timed out.
        view: View,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// A block proposal arrived.
    ProposalReceived {
        /// The proposed block.
        block: Block,
    },

    /// A vote arrived.
    VoteReceived {
        /// The vote.
        vote: Vote,
    },

    /// A timeout message arrived.
    TimeoutReceived {
        /// The timeout.
        timeout: TimeoutMessage,
    },

    /// A timeout certificate arrived.
    TimeoutCertificateReceived {
        /// The certificate.
        certificate: TimeoutCertificate,
    },
}

impl Event {
    /// Ordering class of this event.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::Start | Event::PayloadReady { .. } => EventPriority::Internal,
            Event::ViewTimer { .. } => EventPriority::Timer,
            Event::ProposalReceived { .. }
            | Event::VoteReceived { .. }
            | Event::TimeoutReceived { .. }
            | Event::TimeoutCertificateReceived { .. } => EventPriority::Network,
        }
    }

    /// Human-readable name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::Start => "Start",
            Event::PayloadReady { .. } => "PayloadReady",
            Event::ViewTimer { .. } => "ViewTimer",
            Event::ProposalReceived { .. } => "ProposalReceived",
            Event::VoteReceived { .. } => "VoteReceived",
            Event::TimeoutReceived { .. } => "TimeoutReceived",
            Event::TimeoutCertificateReceived { .. } => "TimeoutCertificateReceived",
        }
    }
}

impl From<ConsensusMessage> for Event {
    fn from(message: ConsensusMessage) -> Self {
        match message {
            ConsensusMessage::Proposal(gossip) => Event::ProposalReceived {
                block: gossip.block,
            },
            ConsensusMessage::Vote(gossip) => Event::VoteReceived { vote: gossip.vote },
            ConsensusMessage::Timeout(gossip) => Event::TimeoutReceived {
                timeout: gossip.timeout,
            },
            ConsensusMessage::TimeoutCertificate(gossip) => Event::TimeoutCertificateReceived {
                certificate: gossip.certificate,
            },
        }
    }
}

/// Output of a replica's state machine, executed by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Send to one replica.
    SendTo {
        /// Recipient.
        to: ValidatorId,
        /// Message.
        message: ConsensusMessage,
    },

    /// Send to every other replica.
    Broadcast {
        /// Message.
        message: ConsensusMessage,
    },

    /// Send to a chosen subset (quorum multicast).
    Multicast {
        /// Recipients.
        to: Vec<ValidatorId>,
        /// Message.
        message: ConsensusMessage,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Arm (or re-arm) a timer.
    SetTimer {
        /// Timer to arm.
        id: TimerId,
        /// Delay until it fires.
        duration: Duration,
    },

    /// Disarm a timer. No-op if it is not armed.
    CancelTimer {
        /// Timer to disarm.
        id: TimerId,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Collaborators
    // ═══════════════════════════════════════════════════════════════════════
    /// Pull a payload from the mempool and answer with [`Event::PayloadReady`].
    RequestPayload {
        /// View being proposed for.
        view: View,
    },

    /// A block became final.
    EmitCommittedBlock {
        /// The committed block.
        block: Block,
    },

    /// A block was discarded by a commit on a conflicting branch.
    EmitForkedBlock {
        /// The forked block.
        block: Block,
    },
}

impl Action {
    /// Human-readable name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::SendTo { .. } => "SendTo",
            Action::Broadcast { .. } => "Broadcast",
            Action::Multicast { .. } => "Multicast",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::RequestPayload { .. } => "RequestPayload",
            Action::EmitCommittedBlock { .. } => "EmitCommittedBlock",
            Action::EmitForkedBlock { .. } => "EmitForkedBlock",
        }
    }
}
