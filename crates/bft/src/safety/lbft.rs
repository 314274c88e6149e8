//! Broadcast voting over a notarized chain.
//!
//! Every replica broadcasts its vote, so every replica builds every QC. A
//! certified block is notarized at the height after its parent. Heights that
//! hold exactly one block with consecutive views finalize the middle one.

use super::{advance_last_voted, ForkChoice, SafetyRules, VoteRouting};
use crate::blockchain::BlockChain;
use crate::error::SafetyError;
use canopy_types::{Block, Hash, QuorumCertificate, View};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A certified block on the notarized chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notarized {
    /// The block.
    pub block: Block,
    /// Its certificate.
    pub qc: QuorumCertificate,
}

/// Safety state of a broadcast-voting replica.
#[derive(Debug, Clone)]
pub struct Lbft {
    last_voted: View,

    /// Notarized blocks by height. Height 0 is the last committed block.
    notarized_chain: Vec<Vec<Notarized>>,

    notarized_ids: HashSet<Hash>,

    /// Certificates whose parent is not notarized yet, keyed by parent.
    pending: HashMap<Hash, Vec<QuorumCertificate>>,
}

impl Default for Lbft {
    fn default() -> Self {
        Self::new()
    }
}

impl Lbft {
    /// Fresh state: the notarized chain holds genesis.
    pub fn new() -> Self {
        let genesis = Notarized {
            block: Block::genesis(),
            qc: QuorumCertificate::genesis(),
        };
        let mut notarized_ids = HashSet::new();
        notarized_ids.insert(genesis.block.id);
        Self {
            last_voted: View::GENESIS,
            notarized_chain: vec![vec![genesis]],
            notarized_ids,
            pending: HashMap::new(),
        }
    }

    /// Number of notarized heights held.
    pub fn notarized_height(&self) -> usize {
        self.notarized_chain.len()
    }

    fn tail(&self) -> &[Notarized] {
        self.notarized_chain.last().map_or(&[], Vec::as_slice)
    }

    fn height_of(&self, id: &Hash) -> Option<usize> {
        self.notarized_chain
            .iter()
            .rposition(|level| level.iter().any(|n| n.block.id == *id))
    }

    /// Notarize `block`, then anything that was waiting on it.
    fn notarize(&mut self, chain: &BlockChain, block: Block, qc: QuorumCertificate) {
        let mut work = vec![(block, qc)];
        while let Some((block, qc)) = work.pop() {
            if self.notarized_ids.contains(&block.id) {
                continue;
            }
            let Some(parent_height) = self.height_of(&block.prev_id) else {
                debug!(block = ?block.id, view = block.view.0, "Parent not notarized, pending");
                self.pending.entry(block.prev_id).or_default().push(qc);
                continue;
            };

            let height = parent_height + 1;
            let id = block.id;
            debug!(block = ?id, view = block.view.0, height, "Notarized");
            self.notarized_ids.insert(id);
            let entry = Notarized { block, qc };
            match self.notarized_chain.get_mut(height) {
                Some(level) => level.push(entry),
                None => self.notarized_chain.push(vec![entry]),
            }

            for waiting in self.pending.remove(&id).unwrap_or_default() {
                if let Ok(child) = chain.block(&waiting.block_id) {
                    work.push((child.clone(), waiting));
                }
            }
        }
    }
}

impl SafetyRules for Lbft {
    fn update_state_by_qc(
        &mut self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<(), SafetyError> {
        if qc.is_genesis() || self.notarized_ids.contains(&qc.block_id) {
            return Ok(());
        }
        let block = chain
            .block(&qc.block_id)
            .map_err(|_| SafetyError::UnknownBlock(qc.block_id))?
            .clone();
        self.notarize(chain, block, qc.clone());
        Ok(())
    }

    fn update_state_by_view(&mut self, view: View) -> Result<(), SafetyError> {
        advance_last_voted(&mut self.last_voted, view)
    }

    fn voting_rule(&self, _chain: &BlockChain, block: &Block) -> Result<bool, SafetyError> {
        if block.view.0 <= 2 {
            return Ok(true);
        }
        let extends_tail = self.tail().iter().any(|n| n.block.id == block.prev_id);
        Ok(block.view > self.last_voted && extends_tail)
    }

    fn commit_rule(
        &self,
        _chain: &BlockChain,
        _qc: &QuorumCertificate,
    ) -> Result<Option<Block>, SafetyError> {
        let height = self.notarized_chain.len();
        if height < 3 {
            return Ok(None);
        }
        fn single(level: &[Notarized]) -> Option<&Block> {
            match level {
                [only] => Some(&only.block),
                _ => None,
            }
        }
        let last_three = &self.notarized_chain[height - 3..];
        let (Some(first), Some(second), Some(third)) = (
            single(&last_three[0]),
            single(&last_three[1]),
            single(&last_three[2]),
        ) else {
            return Ok(None);
        };
        let consecutive = first.view.next() == second.view && second.view.next() == third.view;
        Ok(consecutive.then(|| second.clone()))
    }

    fn fork_choice(&self, chain: &BlockChain, _mode: ForkChoice) -> QuorumCertificate {
        self.tail()
            .iter()
            .max_by_key(|n| n.block.view)
            .map(|n| n.qc.clone())
            .unwrap_or_else(|| chain.high_qc().clone())
    }

    fn vote_routing(&self) -> VoteRouting {
        VoteRouting::Broadcast
    }

    fn echoes_messages(&self) -> bool {
        true
    }

    fn on_commit(&mut self, committed: &[Block]) {
        let Some(tip) = committed.last() else {
            return;
        };
        let Some(height) = self.height_of(&tip.id) else {
            return;
        };
        for level in self.notarized_chain.drain(..height) {
            for n in level {
                self.notarized_ids.remove(&n.block.id);
            }
        }
        // Only the committed block survives at the new base height.
        if let Some(base) = self.notarized_chain.first_mut() {
            let dropped: Vec<Hash> = base
                .iter()
                .filter(|n| n.block.id != tip.id)
                .map(|n| n.block.id)
                .collect();
            base.retain(|n| n.block.id == tip.id);
            for id in dropped {
                self.notarized_ids.remove(&id);
            }
        }
        let committed_view = tip.view;
        self.pending
            .retain(|_, waiting| waiting.iter().any(|qc| qc.view > committed_view));
    }

    fn last_voted_view(&self) -> View {
        self.last_voted
    }

    fn preferred_view(&self) -> View {
        self.tail()
            .iter()
            .map(|n| n.block.view)
            .max()
            .unwrap_or(View::GENESIS)
    }
}
