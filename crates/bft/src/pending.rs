//! Input held back until a dependency arrives.
//!
//! - blocks whose parent is unknown, keyed by the missing id
//! - QCs built from votes before their block arrived
//! - blocks a replica declined to vote for yet, retried as certificates land
//! - echo filters for the broadcast variants

use canopy_types::{Block, Hash, QuorumCertificate, ValidatorId, View};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::warn;

/// Out-of-order proposals and certificates.
#[derive(Debug, Clone)]
pub struct PendingBuffers {
    /// Blocks waiting on a missing parent, keyed by that parent. Insertion
    /// ordered so the oldest wait is evicted first.
    blocks: IndexMap<Hash, Vec<Block>>,
    buffered_ids: HashSet<Hash>,
    max_blocks: usize,

    /// QCs waiting for the block they certify.
    qcs: IndexMap<Hash, QuorumCertificate>,

    /// Blocks whose vote was declined, with their views.
    deferred_votes: IndexMap<Hash, View>,
}

impl PendingBuffers {
    /// Create empty buffers holding at most `max_blocks` blocks.
    pub fn new(max_blocks: usize) -> Self {
        Self {
            blocks: IndexMap::new(),
            buffered_ids: HashSet::new(),
            max_blocks,
            qcs: IndexMap::new(),
            deferred_votes: IndexMap::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Blocks
    // ═══════════════════════════════════════════════════════════════════════

    /// Hold `block` until `missing` arrives. Returns false if the block was
    /// already held.
    pub fn buffer_block(&mut self, missing: Hash, block: Block) -> bool {
        if !self.buffered_ids.insert(block.id) {
            return false;
        }
        self.blocks.entry(missing).or_default().push(block);

        while self.buffered_ids.len() > self.max_blocks {
            let Some((_, evicted)) = self.blocks.shift_remove_index(0) else {
                break;
            };
            for block in evicted {
                warn!(block = ?block.id, view = block.view.0, "Evicting buffered block");
                self.buffered_ids.remove(&block.id);
            }
        }
        true
    }

    /// Release every block waiting on `id`.
    pub fn take_blocks(&mut self, id: &Hash) -> Vec<Block> {
        let released = self.blocks.shift_remove(id).unwrap_or_default();
        for block in &released {
            self.buffered_ids.remove(&block.id);
        }
        released
    }

    /// Is this block held?
    pub fn is_buffered(&self, id: &Hash) -> bool {
        self.buffered_ids.contains(id)
    }

    /// Number of blocks held.
    pub fn buffered_blocks(&self) -> usize {
        self.buffered_ids.len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Certificates
    // ═══════════════════════════════════════════════════════════════════════

    /// Hold a QC until its block arrives. A later QC for the same block
    /// replaces the earlier one only if it is from a higher view.
    pub fn buffer_qc(&mut self, qc: QuorumCertificate) {
        match self.qcs.get(&qc.block_id) {
            Some(existing) if existing.view >= qc.view => {}
            _ => {
                self.qcs.insert(qc.block_id, qc);
            }
        }
    }

    /// Release the QC waiting for `block_id`.
    pub fn take_qc(&mut self, block_id: &Hash) -> Option<QuorumCertificate> {
        self.qcs.shift_remove(block_id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Deferred votes
    // ═══════════════════════════════════════════════════════════════════════

    /// Remember a block whose vote was declined.
    pub fn defer_vote(&mut self, block_id: Hash, view: View) {
        self.deferred_votes.insert(block_id, view);
        while self.deferred_votes.len() > self.max_blocks {
            self.deferred_votes.shift_remove_index(0);
        }
    }

    /// Drain deferred blocks still above `last_voted`, oldest first.
    pub fn take_deferred_votes(&mut self, last_voted: View) -> Vec<Hash> {
        self.deferred_votes
            .drain(..)
            .filter(|(_, view)| *view > last_voted)
            .map(|(id, _)| id)
            .collect()
    }

    /// Whether any vote is deferred.
    pub fn has_deferred_votes(&self) -> bool {
        !self.deferred_votes.is_empty()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Cleanup
    // ═══════════════════════════════════════════════════════════════════════

    /// Drop everything that can no longer matter after a commit at `view`.
    pub fn prune_below(&mut self, view: View) {
        let buffered_ids = &mut self.buffered_ids;
        self.blocks.retain(|_, waiting| {
            waiting.retain(|block| {
                let keep = block.view > view;
                if !keep {
                    buffered_ids.remove(&block.id);
                }
                keep
            });
            !waiting.is_empty()
        });
        self.qcs.retain(|_, qc| qc.view >= view);
        self.deferred_votes.retain(|_, deferred| *deferred > view);
    }
}

/// Remembers which blocks and votes were already re-broadcast.
#[derive(Debug, Clone, Default)]
pub struct EchoFilter {
    blocks: HashSet<Hash>,
    votes: HashSet<(Hash, ValidatorId)>,
}

impl EchoFilter {
    /// True the first time a block id is offered.
    pub fn first_block(&mut self, id: Hash) -> bool {
        self.blocks.insert(id)
    }

    /// True the first time a (block, voter) pair is offered.
    pub fn first_vote(&mut self, block_id: Hash, voter: ValidatorId) -> bool {
        self.votes.insert((block_id, voter))
    }

    /// Forget committed or forked blocks.
    pub fn forget(&mut self, id: &Hash) {
        self.blocks.remove(id);
        self.votes.retain(|(block_id, _)| block_id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_test_helpers::{random_id, unsigned_block};

    #[test]
    fn test_blocks_released_by_missing_parent() {
        let mut pending = PendingBuffers::new(8);
        let parent = random_id("parent");
        let a = unsigned_block(3, 2, parent, 1);
        let b = unsigned_block(4, 2, parent, 2);

        assert!(pending.buffer_block(parent, a.clone()));
        assert!(!pending.buffer_block(parent, a.clone()));
        assert!(pending.buffer_block(parent, b.clone()));
        assert!(pending.is_buffered(&a.id));

        assert_eq!(pending.take_blocks(&parent), vec![a.clone(), b]);
        assert!(!pending.is_buffered(&a.id));
        assert!(pending.take_blocks(&parent).is_empty());
    }

    #[test]
    fn test_oldest_wait_evicted_when_full() {
        let mut pending = PendingBuffers::new(2);
        let first = unsigned_block(3, 2, random_id("p1"), 1);
        let second = unsigned_block(4, 3, random_id("p2"), 1);
        let third = unsigned_block(5, 4, random_id("p3"), 1);

        pending.buffer_block(random_id("p1"), first.clone());
        pending.buffer_block(random_id("p2"), second.clone());
        pending.buffer_block(random_id("p3"), third.clone());

        assert_eq!(pending.buffered_blocks(), 2);
        assert!(!pending.is_buffered(&first.id));
        assert!(pending.is_buffered(&third.id));
    }

    #[test]
    fn test_higher_qc_replaces_buffered() {
        let mut pending = PendingBuffers::new(8);
        let id = random_id("block");
        pending.buffer_qc(QuorumCertificate::unsigned(View(5), id));
        pending.buffer_qc(QuorumCertificate::unsigned(View(4), id));
        assert_eq!(pending.take_qc(&id).map(|qc| qc.view), Some(View(5)));
        assert_eq!(pending.take_qc(&id), None);
    }

    #[test]
    fn test_deferred_votes_drop_stale_views() {
        let mut pending = PendingBuffers::new(8);
        pending.defer_vote(random_id("a"), View(3));
        pending.defer_vote(random_id("b"), View(5));
        assert!(pending.has_deferred_votes());
        assert_eq!(pending.take_deferred_votes(View(4)), vec![random_id("b")]);
        assert!(!pending.has_deferred_votes());
    }

    #[test]
    fn test_prune_below_commit() {
        let mut pending = PendingBuffers::new(8);
        let old = unsigned_block(2, 1, random_id("p"), 1);
        let new = unsigned_block(7, 6, random_id("q"), 1);
        pending.buffer_block(random_id("p"), old.clone());
        pending.buffer_block(random_id("q"), new.clone());
        pending.prune_below(View(4));
        assert!(!pending.is_buffered(&old.id));
        assert!(pending.is_buffered(&new.id));
    }

    #[test]
    fn test_echo_once() {
        let mut echoed = EchoFilter::default();
        let id = random_id("block");
        assert!(echoed.first_block(id));
        assert!(!echoed.first_block(id));
        assert!(echoed.first_vote(id, ValidatorId(2)));
        assert!(!echoed.first_vote(id, ValidatorId(2)));
        assert!(echoed.first_vote(id, ValidatorId(3)));
        echoed.forget(&id);
        assert!(echoed.first_block(id));
    }
}
