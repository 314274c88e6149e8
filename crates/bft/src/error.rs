//! Error types for the block store, the safety rules and block validation.

use canopy_types::{CertificateError, Hash, ValidatorId, View};

/// Errors from [`crate::BlockChain`] lookups and commits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// No block with this id is stored.
    #[error("block {0:?} not found")]
    NotFound(Hash),

    /// No stored block was proposed in this view.
    #[error("no block at {0}")]
    NoBlockAtView(View),

    /// Commit target is not stored.
    #[error("cannot commit unknown block {0:?}")]
    UnknownBlock(Hash),
}

/// Errors from [`crate::SafetyRules`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SafetyError {
    /// The certified block has not arrived yet; the caller should buffer.
    #[error("certified block {0:?} is not known")]
    UnknownBlock(Hash),

    /// The parent needed to evaluate a rule is not stored.
    #[error("parent {0:?} is not known")]
    MissingParent(Hash),

    /// Voting again at or below the last voted view.
    #[error("stale vote for {view}, already voted at {last_voted}")]
    StaleVote {
        /// View of the attempted vote.
        view: View,
        /// Last view voted in.
        last_voted: View,
    },
}

impl From<ChainError> for SafetyError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::NotFound(id) | ChainError::UnknownBlock(id) => {
                SafetyError::MissingParent(id)
            }
            ChainError::NoBlockAtView(_) => SafetyError::MissingParent(Hash::ZERO),
        }
    }
}

/// Why a proposal was refused. Logged and dropped, never escalated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockRejection {
    /// Block view is below the current view.
    #[error("stale block at {block_view}, current {current_view}")]
    Stale {
        /// View of the block.
        block_view: View,
        /// Current pacemaker view.
        current_view: View,
    },

    /// Proposer is not the elected leader of the block's view.
    #[error("{proposer} is not the leader of {view}")]
    InvalidLeader {
        /// Claimed proposer.
        proposer: ValidatorId,
        /// View of the block.
        view: View,
    },

    /// The id does not match the contents.
    #[error("block id does not match contents")]
    InvalidId,

    /// Proposer signature does not verify.
    #[error("invalid proposer signature")]
    InvalidSignature,

    /// The embedded QC does not verify.
    #[error("invalid QC: {0}")]
    InvalidQc(#[from] CertificateError),

    /// The embedded QC is not older than the block.
    #[error("QC at {qc_view} does not precede block at {block_view}")]
    QcNotBeforeBlock {
        /// View of the QC.
        qc_view: View,
        /// View of the block.
        block_view: View,
    },

    /// The embedded QC certifies a block other than the declared parent.
    #[error("QC certifies {qc_block:?} but parent is {prev_id:?}")]
    ParentNotCertified {
        /// Declared parent.
        prev_id: Hash,
        /// Block the embedded QC certifies.
        qc_block: Hash,
    },
}
