//! Two-chain HotStuff: a block is final once its child is certified in the
//! directly following view.

use super::{advance_last_voted, require_certified_block, SafetyRules};
use crate::blockchain::BlockChain;
use crate::error::SafetyError;
use canopy_types::{Block, QuorumCertificate, View};

/// Safety state of a two-chain replica.
#[derive(Debug, Clone, Default)]
pub struct TwoChain {
    last_voted: View,
    preferred: View,
}

impl TwoChain {
    /// Fresh state at genesis.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SafetyRules for TwoChain {
    fn update_state_by_qc(
        &mut self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<(), SafetyError> {
        require_certified_block(chain, qc)?;
        if qc.view.0 >= 2 && qc.view > self.preferred {
            self.preferred = qc.view;
        }
        Ok(())
    }

    fn update_state_by_view(&mut self, view: View) -> Result<(), SafetyError> {
        advance_last_voted(&mut self.last_voted, view)
    }

    fn voting_rule(&self, chain: &BlockChain, block: &Block) -> Result<bool, SafetyError> {
        chained_voting_rule(chain, block, self.last_voted, self.preferred)
    }

    fn commit_rule(
        &self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<Option<Block>, SafetyError> {
        if qc.is_genesis() {
            return Ok(None);
        }
        let parent = chain.parent_block(&qc.block_id)?;
        Ok((parent.view.next() == qc.view).then(|| parent.clone()))
    }

    fn last_voted_view(&self) -> View {
        self.last_voted
    }

    fn preferred_view(&self) -> View {
        self.preferred
    }
}

/// Voting rule of the chained variants: the first two views always vote,
/// later blocks need a fresh view and a parent no older than the preferred
/// view.
pub(crate) fn chained_voting_rule(
    chain: &BlockChain,
    block: &Block,
    last_voted: View,
    preferred: View,
) -> Result<bool, SafetyError> {
    if block.view.0 <= 2 {
        return Ok(true);
    }
    let parent = chain
        .block(&block.prev_id)
        .map_err(|_| SafetyError::MissingParent(block.prev_id))?;
    Ok(block.view > last_voted && parent.view >= preferred)
}
