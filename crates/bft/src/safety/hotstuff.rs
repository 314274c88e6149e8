//! Classic three-chain HotStuff.

use super::{advance_last_voted, require_certified_block, two_chain::chained_voting_rule, SafetyRules};
use crate::blockchain::BlockChain;
use crate::error::SafetyError;
use canopy_types::{Block, QuorumCertificate, View};

/// Safety state of a three-chain replica. The preferred view is the view of
/// the parent of the highest certified block.
#[derive(Debug, Clone, Default)]
pub struct HotStuff {
    last_voted: View,
    preferred: View,
}

impl HotStuff {
    /// Fresh state at genesis.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SafetyRules for HotStuff {
    fn update_state_by_qc(
        &mut self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<(), SafetyError> {
        require_certified_block(chain, qc)?;
        if qc.view.0 <= 2 {
            return Ok(());
        }
        let parent = chain.parent_block(&qc.block_id)?;
        if parent.view > self.preferred {
            self.preferred = parent.view;
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
        let grandparent = chain.parent_block(&parent.id)?;
        let consecutive =
            grandparent.view.next() == parent.view && parent.view.next() == qc.view;
        Ok(consecutive.then(|| grandparent.clone()))
    }

    fn last_voted_view(&self) -> View {
        self.last_voted
    }

    fn preferred_view(&self) -> View {
        self.preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::test_chain;

    #[test]
    fn test_three_chain_commits_exactly_the_first_block() {
        // b1@2 <- b2@3 <- b3@4 <- b4@5; qc4 certifies b3 at view 4.
        let (mut chain, blocks, qcs) = test_chain::linear(&[2, 3, 4, 5]);
        let mut rules = HotStuff::new();

        rules.update_state_by_qc(&chain, &qcs[1]).unwrap();
        assert_eq!(rules.commit_rule(&chain, &qcs[1]).ok().flatten(), None);

        rules.update_state_by_qc(&chain, &qcs[2]).unwrap();
        assert_eq!(rules.preferred_view(), View(3));
        let target = rules
            .commit_rule(&chain, &qcs[2])
            .unwrap()
            .expect("three consecutive views");
        assert_eq!(target, blocks[0]);

        let outcome = chain.commit_block(&target.id, View(5)).unwrap();
        assert_eq!(outcome.committed, vec![blocks[0].clone()]);
        assert!(outcome.forked.is_empty());
    }

    #[test]
    fn test_gap_in_chain_prevents_commit() {
        let (chain, _, qcs) = test_chain::linear(&[2, 3, 5]);
        let rules = HotStuff::new();
        assert_eq!(rules.commit_rule(&chain, &qcs[2]), Ok(None));
    }

    #[test]
    fn test_two_chain_is_not_enough() {
        // b1@2 <- b2@3: the grandparent is genesis at view 0.
        let (chain, _, qcs) = test_chain::linear(&[2, 3]);
        let rules = HotStuff::new();
        assert_eq!(rules.commit_rule(&chain, &qcs[1]), Ok(None));
    }
}
