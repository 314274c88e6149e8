//! Streamlet: vote for proposals extending a longest notarized chain, and
//! finalize the middle of three notarized blocks with consecutive views.

use super::{advance_last_voted, ForkChoice, SafetyRules, VoteRouting};
use crate::blockchain::BlockChain;
use crate::error::SafetyError;
use canopy_types::{Block, Hash, QuorumCertificate, View};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone)]
struct NotarizedEntry {
    view: View,
    /// Notarized ancestors, genesis excluded.
    depth: u64,
    qc: QuorumCertificate,
}

/// Safety state of a Streamlet replica.
#[derive(Debug, Clone)]
pub struct Streamlet {
    last_voted: View,
    notarized: HashMap<Hash, NotarizedEntry>,

    /// Depth of the longest notarized chain and its tips.
    longest: u64,
    tips: Vec<Hash>,

    /// Certificates whose parent is not notarized yet, keyed by parent.
    pending: HashMap<Hash, Vec<QuorumCertificate>>,
}

impl Default for Streamlet {
    fn default() -> Self {
        Self::new()
    }
}

impl Streamlet {
    /// Fresh state: genesis is the only notarized block.
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let mut notarized = HashMap::new();
        notarized.insert(
            genesis.id,
            NotarizedEntry {
                view: genesis.view,
                depth: 0,
                qc: QuorumCertificate::genesis(),
            },
        );
        Self {
            last_voted: View::GENESIS,
            notarized,
            longest: 0,
            tips: vec![genesis.id],
            pending: HashMap::new(),
        }
    }

    /// Depth of the longest notarized chain.
    pub fn longest_notarized(&self) -> u64 {
        self.longest
    }

    fn is_notarized(&self, id: &Hash) -> bool {
        self.notarized.contains_key(id)
    }
}

impl SafetyRules for Streamlet {
    fn update_state_by_qc(
        &mut self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<(), SafetyError> {
        if qc.is_genesis() || self.is_notarized(&qc.block_id) {
            return Ok(());
        }
        if !chain.contains(&qc.block_id) {
            return Err(SafetyError::UnknownBlock(qc.block_id));
        }

        let mut work = vec![qc.clone()];
        while let Some(qc) = work.pop() {
            let Ok(block) = chain.block(&qc.block_id) else {
                continue;
            };
            if self.is_notarized(&block.id) {
                continue;
            }
            let Some(parent_depth) = self.notarized.get(&block.prev_id).map(|e| e.depth) else {
                self.pending.entry(block.prev_id).or_default().push(qc);
                continue;
            };

            let depth = parent_depth + 1;
            debug!(block = ?block.id, view = block.view.0, depth, "Notarized");
            match depth.cmp(&self.longest) {
                std::cmp::Ordering::Greater => {
                    self.longest = depth;
                    self.tips = vec![block.id];
                }
                std::cmp::Ordering::Equal => self.tips.push(block.id),
                std::cmp::Ordering::Less => {}
            }
            self.notarized.insert(
                block.id,
                NotarizedEntry {
                    view: block.view,
                    depth,
                    qc,
                },
            );
            work.extend(self.pending.remove(&block.id).unwrap_or_default());
        }
        Ok(())
    }

    fn update_state_by_view(&mut self, view: View) -> Result<(), SafetyError> {
        advance_last_voted(&mut self.last_voted, view)
    }

    fn voting_rule(&self, _chain: &BlockChain, block: &Block) -> Result<bool, SafetyError> {
        if block.view.0 <= 2 {
            return Ok(true);
        }
        Ok(block.view > self.last_voted && self.tips.contains(&block.prev_id))
    }

    fn commit_rule(
        &self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<Option<Block>, SafetyError> {
        if !self.is_notarized(&qc.block_id) {
            return Ok(None);
        }
        let Ok(third) = chain.block(&qc.block_id) else {
            return Ok(None);
        };
        let Ok(second) = chain.block(&third.prev_id) else {
            return Ok(None);
        };
        let Ok(first) = chain.block(&second.prev_id) else {
            return Ok(None);
        };
        let all_notarized = self.is_notarized(&second.id) && self.is_notarized(&first.id);
        let consecutive = first.view.next() == second.view && second.view.next() == third.view;
        Ok((all_notarized && consecutive).then(|| second.clone()))
    }

    fn fork_choice(&self, chain: &BlockChain, _mode: ForkChoice) -> QuorumCertificate {
        self.tips
            .iter()
            .filter_map(|id| self.notarized.get(id))
            .max_by_key(|entry| entry.view)
            .map(|entry| entry.qc.clone())
            .unwrap_or_else(|| chain.high_qc().clone())
    }

    fn vote_routing(&self) -> VoteRouting {
        VoteRouting::Broadcast
    }

    fn on_commit(&mut self, committed: &[Block]) {
        let Some(tip) = committed.last() else {
            return;
        };
        let committed_view = tip.view;
        self.notarized.retain(|_, entry| entry.view >= committed_view);
        self.pending
            .retain(|_, waiting| waiting.iter().any(|qc| qc.view > committed_view));
    }

    fn last_voted_view(&self) -> View {
        self.last_voted
    }

    fn preferred_view(&self) -> View {
        self.tips
            .iter()
            .filter_map(|id| self.notarized.get(id))
            .map(|entry| entry.view)
            .max()
            .unwrap_or(View::GENESIS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::test_chain;
    use canopy_test_helpers::unsigned_block;

    #[test]
    fn test_commits_middle_of_three_consecutive_views() {
        let (chain, blocks, qcs) = test_chain::linear(&[3, 4, 5]);
        let mut rules = Streamlet::new();
        for qc in &qcs {
            rules.update_state_by_qc(&chain, qc).unwrap();
        }
        assert_eq!(rules.longest_notarized(), 3);
        assert_eq!(rules.commit_rule(&chain, &qcs[2]), Ok(Some(blocks[1].clone())));
        assert_eq!(rules.fork_choice(&chain, ForkChoice::Highest), qcs[2]);
    }

    #[test]
    fn test_view_gap_prevents_commit() {
        let (chain, _, qcs) = test_chain::linear(&[3, 4, 6]);
        let mut rules = Streamlet::new();
        for qc in &qcs {
            rules.update_state_by_qc(&chain, qc).unwrap();
        }
        assert_eq!(rules.commit_rule(&chain, &qcs[2]), Ok(None));
    }

    #[test]
    fn test_votes_only_extend_longest_tips() {
        let (mut chain, blocks, qcs) = test_chain::linear(&[1, 2]);
        let mut rules = Streamlet::new();
        // Notarize b2 before b1: it waits for its parent.
        rules.update_state_by_qc(&chain, &qcs[1]).unwrap();
        assert_eq!(rules.longest_notarized(), 0);
        rules.update_state_by_qc(&chain, &qcs[0]).unwrap();
        assert_eq!(rules.longest_notarized(), 2);
        assert_eq!(rules.preferred_view(), View(2));

        let on_tip = unsigned_block(3, 2, blocks[1].id, 1);
        let on_old = unsigned_block(4, 1, blocks[0].id, 1);
        chain.add_block(on_tip.clone());
        chain.add_block(on_old.clone());
        assert_eq!(rules.voting_rule(&chain, &on_tip), Ok(true));
        assert_eq!(rules.voting_rule(&chain, &on_old), Ok(false));
    }
}
