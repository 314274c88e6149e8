//! Domain-separated signing for cryptographic operations.
//!
//! Every signed message starts with a domain tag so a signature produced in
//! one context can never be replayed in another.
//!
//! # Domain Tags
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `block_id:` | Preimage of a block identifier |
//! | `block_proposal:` | Proposer signature over a block id |
//! | `block_vote:` | Votes and QC aggregate signatures |
//! | `timeout:` | Timeout messages and TC aggregate signatures |

use crate::{Hash, View};

/// Domain tag for the block identifier preimage.
///
/// Format: `block_id:` || view || prev_id || proposer || qc_view || qc_block_id || timestamp || payload_hash
pub const DOMAIN_BLOCK_ID: &[u8] = b"block_id:";

/// Domain tag for proposer signatures.
///
/// Format: `block_proposal:` || block_id
pub const DOMAIN_BLOCK_PROPOSAL: &[u8] = b"block_proposal:";

/// Domain tag for block votes.
///
/// Format: `block_vote:` || view || block_id
pub const DOMAIN_BLOCK_VOTE: &[u8] = b"block_vote:";

/// Domain tag for timeout messages.
///
/// Format: `timeout:` || view
///
/// The sender's high QC is deliberately outside the signed bytes so that all
/// timeouts for a view sign the same message and aggregate into one TC.
pub const DOMAIN_TIMEOUT: &[u8] = b"timeout:";

/// Build the signing message for a block proposal.
pub fn block_proposal_message(block_id: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_BLOCK_PROPOSAL.len() + 32);
    message.extend_from_slice(DOMAIN_BLOCK_PROPOSAL);
    message.extend_from_slice(block_id.as_bytes());
    message
}

/// Build the signing message for a block vote.
///
/// This is used for:
/// - Individual vote signatures
/// - QC aggregated signature verification
pub fn block_vote_message(view: View, block_id: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_BLOCK_VOTE.len() + 40);
    message.extend_from_slice(DOMAIN_BLOCK_VOTE);
    message.extend_from_slice(&view.0.to_le_bytes());
    message.extend_from_slice(block_id.as_bytes());
    message
}

/// Build the signing message for a timeout.
///
/// This is used for:
/// - Individual timeout signatures
/// - TC aggregated signature verification
pub fn timeout_message(view: View) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_TIMEOUT.len() + 8);
    message.extend_from_slice(DOMAIN_TIMEOUT);
    message.extend_from_slice(&view.0.to_le_bytes());
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domains_do_not_collide() {
        let id = Hash::from_bytes(b"block");
        let vote = block_vote_message(View(3), &id);
        let proposal = block_proposal_message(&id);
        let timeout = timeout_message(View(3));

        assert!(vote.starts_with(DOMAIN_BLOCK_VOTE));
        assert!(proposal.starts_with(DOMAIN_BLOCK_PROPOSAL));
        assert!(timeout.starts_with(DOMAIN_TIMEOUT));
        assert_ne!(vote, proposal);
    }

    #[test]
    fn test_vote_message_binds_view() {
        let id = Hash::from_bytes(b"block");
        assert_ne!(
            block_vote_message(View(3), &id),
            block_vote_message(View(4), &id)
        );
    }
}
