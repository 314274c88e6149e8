//! Fast HotStuff: two-chain safety with the commit decided when a proposal
//! arrives whose QC certifies the directly preceding view.

use super::{CommitTrigger, SafetyRules, TwoChain};
use crate::blockchain::BlockChain;
use crate::error::SafetyError;
use canopy_types::{Block, QuorumCertificate, View};

/// Safety state of a fast replica.
#[derive(Debug, Clone, Default)]
pub struct FastHotStuff {
    rules: TwoChain,
}

impl FastHotStuff {
    /// Fresh state at genesis.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SafetyRules for FastHotStuff {
    fn update_state_by_qc(
        &mut self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<(), SafetyError> {
        self.rules.update_state_by_qc(chain, qc)
    }

    fn update_state_by_view(&mut self, view: View) -> Result<(), SafetyError> {
        self.rules.update_state_by_view(view)
    }

    fn voting_rule(&self, chain: &BlockChain, block: &Block) -> Result<bool, SafetyError> {
        self.rules.voting_rule(chain, block)
    }

    fn commit_rule(
        &self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<Option<Block>, SafetyError> {
        self.rules.commit_rule(chain, qc)
    }

    fn commit_trigger(&self) -> CommitTrigger {
        CommitTrigger::Proposal
    }

    fn last_voted_view(&self) -> View {
        self.rules.last_voted_view()
    }

    fn preferred_view(&self) -> View {
        self.rules.preferred_view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::test_chain;

    #[test]
    fn test_commit_on_proposal_carrying_consecutive_qc() {
        // b1@2 <- b2@3 <- b3@4: b3 carries qc(b2) at view 3.
        let (chain, blocks, _) = test_chain::linear(&[2, 3, 4]);
        let rules = FastHotStuff::new();
        let proposal = &blocks[2];
        assert_eq!(proposal.qc.view.next(), proposal.view);
        assert_eq!(
            rules.commit_rule(&chain, &proposal.qc),
            Ok(Some(blocks[0].clone()))
        );
        assert_eq!(rules.commit_trigger(), CommitTrigger::Proposal);
    }
}
