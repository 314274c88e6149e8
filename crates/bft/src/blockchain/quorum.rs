//! Vote accumulation and QC construction.

use canopy_types::{
    AggregateSignature, Hash, QuorumCertificate, Signature, ValidatorId, View, Vote, VotePower,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// Collects votes per `(view, block)` and builds each block's QC at most once.
///
/// Votes only combine when they agree on both the view and the block, so the
/// view carried by a QC is the view every signer signed.
#[derive(Debug, Clone)]
pub(crate) struct Quorum {
    /// Votes per `(view, block)`, keyed by voter so a repeat overwrites.
    votes: HashMap<(View, Hash), BTreeMap<ValidatorId, Vote>>,

    /// Blocks whose QC was already built here, with the QC's view.
    built: HashMap<Hash, View>,

    committee_size: u64,
}

impl Quorum {
    pub(crate) fn new(committee_size: usize) -> Self {
        Self {
            votes: HashMap::new(),
            built: HashMap::new(),
            committee_size: committee_size as u64,
        }
    }

    /// Record a vote. Returns the QC the first time the distinct voters for
    /// one `(view, block)` pair exceed two thirds of the committee.
    pub(crate) fn add(&mut self, vote: Vote) -> Option<QuorumCertificate> {
        if self.built.contains_key(&vote.block_id) {
            return None;
        }

        let key = (vote.view, vote.block_id);
        let voters = self.votes.entry(key).or_default();
        voters.insert(vote.voter, vote.clone());

        let count = voters.len() as u64;
        if !VotePower::has_quorum(count, self.committee_size) {
            debug!(
                block = ?vote.block_id,
                view = vote.view.0,
                votes = count,
                committee = self.committee_size,
                "Vote recorded"
            );
            return None;
        }

        let signatures: Vec<Signature> = voters.values().map(|v| v.signature.clone()).collect();
        let aggregated_signature = match AggregateSignature::aggregate(&signatures) {
            Ok(signature) => signature,
            Err(e) => {
                warn!(block = ?vote.block_id, error = ?e, "Failed to aggregate vote signatures");
                return None;
            }
        };
        let signers: Vec<ValidatorId> = voters.keys().copied().collect();

        self.built.insert(vote.block_id, vote.view);
        self.votes.retain(|(_, id), _| *id != vote.block_id);

        debug!(block = ?vote.block_id, view = vote.view.0, signers = signers.len(), "QC built");
        Some(QuorumCertificate::new(
            vote.view,
            vote.block_id,
            aggregated_signature,
            signers,
            vote.voter,
        ))
    }

    /// Number of distinct votes recorded for a block still collecting,
    /// summed over the views they were cast in.
    pub(crate) fn vote_count(&self, block_id: &Hash) -> usize {
        self.votes
            .iter()
            .filter(|((_, id), _)| id == block_id)
            .map(|(_, voters)| voters.len())
            .sum()
    }

    /// Number of `(view, block)` pairs still collecting votes.
    pub(crate) fn pending_pairs(&self) -> usize {
        self.votes.len()
    }

    /// Drop all vote state for a block.
    pub(crate) fn forget(&mut self, block_id: &Hash) {
        self.votes.retain(|(_, id), _| id != block_id);
        self.built.remove(block_id);
    }

    /// Drop vote state for every view below `view`, including votes for
    /// blocks this replica never stored.
    pub(crate) fn prune_below(&mut self, view: View) {
        let before = self.votes.len();
        self.votes.retain(|(v, _), _| *v >= view);
        self.built.retain(|_, v| *v >= view);
        let dropped = before - self.votes.len();
        if dropped > 0 {
            debug!(below = view.0, dropped, "Pruned stale vote sets");
        }
    }
}
