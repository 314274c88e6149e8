//! Block tree storage, vote accumulation and commit bookkeeping.
//!
//! The chain owns every block a replica has accepted, the votes collected
//! for them, the highest QC seen, and the statistics of what was committed
//! and what was forked away.

mod forest;
mod quorum;

use crate::error::ChainError;
use canopy_types::{Block, Hash, QuorumCertificate, View, Vote};
use forest::LevelledForest;
use quorum::Quorum;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Blocks finalized and discarded by one `commit_block` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Newly committed blocks, root to tip.
    pub committed: Vec<Block>,

    /// Blocks on conflicting branches that can never be committed now.
    pub forked: Vec<Block>,
}

/// Counters describing the committed chain.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChainStats {
    /// Blocks committed so far (genesis excluded).
    pub committed_blocks: u64,

    /// Blocks discarded as forks.
    pub forked_blocks: u64,

    /// Sum over committed blocks of the views between proposal and commit.
    pub total_intervals: u64,

    /// View of the newest committed block.
    pub highest_committed_view: View,
}

impl ChainStats {
    /// Committed blocks per forked block (forks counted plus one).
    pub fn chain_growth(&self) -> f64 {
        self.committed_blocks as f64 / (self.forked_blocks + 1) as f64
    }

    /// Mean number of views a block waited before commit.
    pub fn block_intervals(&self) -> f64 {
        if self.committed_blocks == 0 {
            return 0.0;
        }
        self.total_intervals as f64 / self.committed_blocks as f64
    }

    /// Share of decided blocks that were forked away.
    pub fn forking_rate(&self) -> f64 {
        let decided = self.committed_blocks + self.forked_blocks;
        if decided == 0 {
            return 0.0;
        }
        self.forked_blocks as f64 / decided as f64
    }
}

/// In-memory block tree plus quorum state.
#[derive(Debug, Clone)]
pub struct BlockChain {
    forest: LevelledForest,
    quorum: Quorum,
    high_qc: QuorumCertificate,

    /// QCs seen per block, whoever built them.
    certified: HashMap<Hash, QuorumCertificate>,

    stats: ChainStats,
}

impl BlockChain {
    /// Create a chain holding only genesis, for a committee of `committee_size`.
    pub fn new(committee_size: usize) -> Self {
        let genesis = Block::genesis();
        let genesis_qc = QuorumCertificate::genesis();
        let mut certified = HashMap::new();
        certified.insert(genesis.id, genesis_qc.clone());

        Self {
            forest: LevelledForest::new(genesis),
            quorum: Quorum::new(committee_size),
            high_qc: genesis_qc,
            certified,
            stats: ChainStats::default(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Blocks
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a block without validation. Inserting a known id is a no-op.
    pub fn add_block(&mut self, block: Block) {
        let id = block.id;
        let view = block.view;
        if self.forest.add(block) {
            debug!(block = ?id, view = view.0, "Block added");
        }
    }

    /// Is the block stored?
    pub fn contains(&self, id: &Hash) -> bool {
        self.forest.contains(id)
    }

    /// Look a block up by id.
    pub fn block(&self, id: &Hash) -> Result<&Block, ChainError> {
        self.forest.get(id).ok_or(ChainError::NotFound(*id))
    }

    /// The block `id` extends.
    pub fn parent_block(&self, id: &Hash) -> Result<&Block, ChainError> {
        let block = self.block(id)?;
        self.block(&block.prev_id)
    }

    /// The parent of the parent of `id`.
    pub fn grandparent_block(&self, id: &Hash) -> Result<&Block, ChainError> {
        let parent = self.parent_block(id)?;
        self.block(&parent.prev_id)
    }

    /// The first block stored at `view`.
    pub fn block_by_view(&self, view: View) -> Result<&Block, ChainError> {
        self.forest
            .at_level(view)
            .next()
            .ok_or(ChainError::NoBlockAtView(view))
    }

    /// Blocks directly extending `id`.
    pub fn children(&self, id: &Hash) -> Vec<&Block> {
        self.forest.children(id).collect()
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> usize {
        self.forest.len()
    }

    /// Lowest view still stored, which is the view of the last committed block.
    pub fn lowest_view(&self) -> View {
        self.forest.lowest_level()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Votes and certificates
    // ═══════════════════════════════════════════════════════════════════════

    /// Record a vote; returns the QC when this vote completes a quorum.
    ///
    /// Votes for views below the last commit are ignored.
    pub fn add_vote(&mut self, vote: Vote) -> Option<QuorumCertificate> {
        if vote.view < self.forest.lowest_level() {
            return None;
        }
        self.quorum.add(vote)
    }

    /// Distinct votes collected for a block that has no QC yet.
    pub fn vote_count(&self, block_id: &Hash) -> usize {
        self.quorum.vote_count(block_id)
    }

    /// Number of `(view, block)` vote sets that have not reached a quorum.
    pub fn pending_vote_sets(&self) -> usize {
        self.quorum.pending_pairs()
    }

    /// The highest QC seen.
    pub fn high_qc(&self) -> &QuorumCertificate {
        &self.high_qc
    }

    /// Replace the highest QC if `qc` is from a later view.
    pub fn update_high_qc(&mut self, qc: &QuorumCertificate) -> bool {
        if qc.view > self.high_qc.view {
            debug!(old = self.high_qc.view.0, new = qc.view.0, "High QC updated");
            self.high_qc = qc.clone();
            return true;
        }
        false
    }

    /// Remember that a block is certified.
    pub fn record_certified(&mut self, qc: &QuorumCertificate) {
        if qc.view >= self.forest.lowest_level() {
            self.certified
                .entry(qc.block_id)
                .or_insert_with(|| qc.clone());
        }
    }

    /// The QC seen for a block, if any.
    pub fn certified(&self, id: &Hash) -> Option<&QuorumCertificate> {
        self.certified.get(id)
    }

    /// QC of the deepest certified block (ties broken by view).
    pub fn longest_certified_tail(&self) -> QuorumCertificate {
        self.certified
            .iter()
            .filter_map(|(id, qc)| Some(((self.forest.depth(id)?, qc.view), qc)))
            .max_by_key(|(key, _)| *key)
            .map(|(_, qc)| qc.clone())
            .unwrap_or_else(|| self.high_qc.clone())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Commit
    // ═══════════════════════════════════════════════════════════════════════

    /// Commit `id` and every uncommitted ancestor, then prune below it.
    ///
    /// `cur_view` is only used for interval statistics.
    pub fn commit_block(&mut self, id: &Hash, cur_view: View) -> Result<CommitOutcome, ChainError> {
        let target = self
            .forest
            .get(id)
            .cloned()
            .ok_or(ChainError::UnknownBlock(*id))?;
        let lowest = self.forest.lowest_level();
        if target.view <= lowest {
            return Ok(CommitOutcome::default());
        }

        let mut committed = Vec::new();
        let mut on_path: HashSet<Hash> = HashSet::new();
        let mut cursor = Some(target.clone());
        while let Some(block) = cursor {
            on_path.insert(block.id);
            if block.view <= lowest {
                break;
            }
            cursor = self.forest.get(&block.prev_id).cloned();
            committed.push(block);
        }
        committed.reverse();

        let forked: Vec<Block> = self
            .forest
            .prune_up_to(target.view)
            .into_iter()
            .filter(|block| !on_path.contains(&block.id))
            .collect();

        for block in committed.iter().chain(forked.iter()) {
            if block.id != target.id {
                self.quorum.forget(&block.id);
                self.certified.remove(&block.id);
            }
        }
        // The old root was pruned too but is neither committed nor forked now.
        self.certified.retain(|_, qc| qc.view >= target.view);
        self.quorum.prune_below(target.view);

        for block in &committed {
            self.stats.total_intervals += cur_view.distance_from(block.view);
        }
        self.stats.committed_blocks += committed.len() as u64;
        self.stats.forked_blocks += forked.len() as u64;
        self.stats.highest_committed_view = target.view;

        info!(
            block = ?target.id,
            view = target.view.0,
            committed = committed.len(),
            forked = forked.len(),
            "Committed"
        );

        Ok(CommitOutcome { committed, forked })
    }

    /// Commit statistics.
    pub fn stats(&self) -> ChainStats {
        self.stats
    }

    /// One-line summary of the chain's progress.
    pub fn chain_status(&self) -> String {
        format!(
            "committed={} forked={} highest_committed_view={} high_qc_view={} growth={:.3} intervals={:.3} forking_rate={:.3}",
            self.stats.committed_blocks,
            self.stats.forked_blocks,
            self.stats.highest_committed_view.0,
            self.high_qc.view.0,
            self.stats.chain_growth(),
            self.stats.block_intervals(),
            self.stats.forking_rate(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_test_helpers::{random_id, unsigned_block, TestCommittee};
    use canopy_types::ValidatorId;

    /// genesis <- b1 <- b2 <- b3, with b2' forking off b1.
    fn chain_with_fork() -> (BlockChain, Vec<Block>, Block) {
        let mut chain = BlockChain::new(4);
        let genesis = Block::genesis();
        let b1 = unsigned_block(1, 0, genesis.id, 1);
        let b2 = unsigned_block(2, 1, b1.id, 2);
        let b2_fork = unsigned_block(2, 1, b1.id, 3);
        let b3 = unsigned_block(3, 2, b2.id, 4);
        for block in [&b1, &b2, &b2_fork, &b3] {
            chain.add_block(block.clone());
        }
        (chain, vec![b1, b2, b3], b2_fork)
    }

    #[test]
    fn test_add_block_is_idempotent() {
        let mut chain = BlockChain::new(4);
        let b1 = unsigned_block(1, 0, Block::genesis().id, 1);
        chain.add_block(b1.clone());
        let before = (chain.block_count(), chain.children(&Block::genesis().id).len());

        chain.add_block(b1.clone());

        assert_eq!(
            (chain.block_count(), chain.children(&Block::genesis().id).len()),
            before
        );
        assert_eq!(chain.block(&b1.id), Ok(&b1));
    }

    #[test]
    fn test_lookups() {
        let (chain, path, fork) = chain_with_fork();
        let [b1, b2, b3] = [&path[0], &path[1], &path[2]];

        assert_eq!(chain.parent_block(&b3.id), Ok(b2));
        assert_eq!(chain.grandparent_block(&b3.id), Ok(b1));
        assert_eq!(chain.block_by_view(View(3)), Ok(b3));
        assert_eq!(chain.children(&b1.id).len(), 2);
        assert!(chain.contains(&fork.id));

        let missing = random_id("missing");
        assert_eq!(chain.block(&missing), Err(ChainError::NotFound(missing)));
        assert_eq!(
            chain.block_by_view(View(9)),
            Err(ChainError::NoBlockAtView(View(9)))
        );
    }

    #[test]
    fn test_quorum_of_four_builds_qc_once() {
        let committee = TestCommittee::new(4);
        let mut chain = BlockChain::new(4);
        let x = random_id("X");

        assert_eq!(chain.add_vote(committee.vote(1, View(5), x)), None);
        assert_eq!(chain.add_vote(committee.vote(2, View(5), x)), None);
        let qc = chain
            .add_vote(committee.vote(3, View(5), x))
            .expect("third vote completes the quorum");

        assert_eq!(qc.view, View(5));
        assert_eq!(qc.block_id, x);
        assert_eq!(qc.signers, vec![ValidatorId(1), ValidatorId(2), ValidatorId(3)]);
        assert_eq!(qc.verify(committee.topology(1).as_ref()), Ok(()));

        assert_eq!(chain.add_vote(committee.vote(1, View(5), x)), None);
        assert_eq!(chain.add_vote(committee.vote(4, View(5), x)), None);
    }

    #[test]
    fn test_duplicate_votes_do_not_count_twice() {
        let committee = TestCommittee::new(4);
        let mut chain = BlockChain::new(4);
        let x = random_id("X");

        for _ in 0..3 {
            assert_eq!(chain.add_vote(committee.vote(2, View(1), x)), None);
        }
        assert_eq!(chain.vote_count(&x), 1);
        assert_eq!(chain.add_vote(committee.vote(4, View(1), x)), None);
        assert!(chain.add_vote(committee.vote(1, View(1), x)).is_some());
    }

    #[test]
    fn test_votes_from_different_views_do_not_combine() {
        let committee = TestCommittee::new(4);
        let mut chain = BlockChain::new(4);
        let x = random_id("X");

        assert_eq!(chain.add_vote(committee.vote(1, View(2), x)), None);
        assert_eq!(chain.add_vote(committee.vote(2, View(2), x)), None);
        assert_eq!(chain.add_vote(committee.vote(3, View(9), x)), None);
        assert_eq!(chain.vote_count(&x), 3);

        let qc = chain
            .add_vote(committee.vote(4, View(2), x))
            .expect("three votes in view 2");
        assert_eq!(qc.view, View(2));
        assert_eq!(qc.signers, vec![ValidatorId(1), ValidatorId(2), ValidatorId(4)]);
        assert_eq!(qc.verify(committee.topology(1).as_ref()), Ok(()));
        assert_eq!(chain.vote_count(&x), 0);
    }

    #[test]
    fn test_commit_drops_votes_for_unknown_blocks() {
        let (mut chain, path, _) = chain_with_fork();
        let committee = TestCommittee::new(4);
        for view in 1..=3 {
            let ghost = random_id(&format!("ghost-{view}"));
            chain.add_vote(committee.vote(1, View(view), ghost));
        }
        let later = random_id("later");
        chain.add_vote(committee.vote(2, View(4), later));
        assert_eq!(chain.pending_vote_sets(), 4);

        chain.commit_block(&path[2].id, View(4)).unwrap();

        assert_eq!(chain.pending_vote_sets(), 2);
        assert_eq!(chain.vote_count(&later), 1);
    }

    #[test]
    fn test_high_qc_only_moves_forward() {
        let mut chain = BlockChain::new(4);
        let qc5 = QuorumCertificate::unsigned(View(5), random_id("b5"));
        let qc3 = QuorumCertificate::unsigned(View(3), random_id("b3"));

        assert!(chain.update_high_qc(&qc5));
        assert!(!chain.update_high_qc(&qc3));
        assert!(!chain.update_high_qc(&qc5));
        assert_eq!(chain.high_qc(), &qc5);
    }

    #[test]
    fn test_commit_returns_path_and_forks() {
        let (mut chain, path, fork) = chain_with_fork();
        let [b1, b2, b3] = [&path[0], &path[1], &path[2]];

        let first = chain.commit_block(&b1.id, View(4)).unwrap();
        assert_eq!(first.committed, vec![b1.clone()]);
        assert!(first.forked.is_empty());

        let second = chain.commit_block(&b3.id, View(5)).unwrap();
        assert_eq!(second.committed, vec![b2.clone(), b3.clone()]);
        assert_eq!(second.forked, vec![fork.clone()]);
        assert!(!chain.contains(&fork.id));
        assert!(!chain.contains(&b1.id));

        let stats = chain.stats();
        assert_eq!(stats.committed_blocks, 3);
        assert_eq!(stats.forked_blocks, 1);
        assert_eq!(stats.highest_committed_view, View(3));
        // (4-1) + (5-2) + (5-3)
        assert_eq!(stats.total_intervals, 8);
        assert!((stats.forking_rate() - 0.25).abs() < f64::EPSILON);
        assert!((stats.chain_growth() - 1.5).abs() < f64::EPSILON);
        assert!(chain.chain_status().contains("committed=3"));
    }

    #[test]
    fn test_commit_unknown_block_fails() {
        let mut chain = BlockChain::new(4);
        let missing = random_id("missing");
        assert_eq!(
            chain.commit_block(&missing, View(1)),
            Err(ChainError::UnknownBlock(missing))
        );
    }

    #[test]
    fn test_recommit_is_empty() {
        let (mut chain, path, _) = chain_with_fork();
        chain.commit_block(&path[1].id, View(3)).unwrap();
        assert_eq!(
            chain.commit_block(&path[1].id, View(4)),
            Ok(CommitOutcome::default())
        );
    }

    #[test]
    fn test_longest_certified_tail_prefers_depth() {
        let (mut chain, path, fork) = chain_with_fork();
        let qc_fork = QuorumCertificate::unsigned(View(2), fork.id);
        let qc_b3 = QuorumCertificate::unsigned(View(3), path[2].id);
        chain.record_certified(&qc_fork);
        assert_eq!(chain.longest_certified_tail(), qc_fork);
        chain.record_certified(&qc_b3);
        assert_eq!(chain.longest_certified_tail(), qc_b3);
        assert_eq!(chain.certified(&fork.id), Some(&qc_fork));
    }
}
