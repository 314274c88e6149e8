//! Safety rules: when to vote, what to commit, which QC to extend.
//!
//! Every protocol variant shares the engine and the data model. What differs
//! is captured by [`SafetyRules`]: the voting rule, the commit rule, the fork
//! choice, and a few routing hooks.

mod fast;
mod hotstuff;
mod lbft;
mod streamlet;
mod two_chain;

pub use fast::FastHotStuff;
pub use hotstuff::HotStuff;
pub use lbft::{Lbft, Notarized};
pub use streamlet::Streamlet;
pub use two_chain::TwoChain;

use crate::blockchain::BlockChain;
use crate::error::SafetyError;
use canopy_types::{Block, QuorumCertificate, View};
use serde::{Deserialize, Serialize};

/// Which safety rules a replica runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    /// Classic three-chain HotStuff.
    #[serde(rename = "hotstuff")]
    HotStuff,
    /// Two-chain HotStuff.
    #[default]
    TwoChain,
    /// Fast HotStuff: commit decided on proposal receipt.
    Fast,
    /// Leaderless broadcast voting over a notarized chain.
    Lbft,
    /// Streamlet: notarized chains, commit on three consecutive views.
    Streamlet,
}

/// Which certified block a new proposal extends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForkChoice {
    /// The highest QC known.
    #[default]
    Highest,
    /// The QC of the deepest certified block.
    Longest,
    /// Byzantine only: extend the QC one below the highest, forking out the
    /// latest certified block.
    Forking,
}

/// When the engine evaluates the commit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTrigger {
    /// On every processed QC.
    Certificate,
    /// On a proposal whose QC certifies the directly preceding view.
    Proposal,
}

/// Where a replica sends its votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteRouting {
    /// To the leader of the next view.
    NextLeader,
    /// To everyone.
    Broadcast,
}

/// The policy a protocol engine is generic over.
pub trait SafetyRules: Send {
    /// Update safety state from a QC. Fails with
    /// [`SafetyError::UnknownBlock`] when the certified block has not
    /// arrived, in which case the caller buffers the QC.
    fn update_state_by_qc(
        &mut self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<(), SafetyError>;

    /// Record a vote in `view`. Fails with [`SafetyError::StaleVote`] if
    /// `view` is behind the last vote.
    fn update_state_by_view(&mut self, view: View) -> Result<(), SafetyError>;

    /// May this replica vote for `block`?
    fn voting_rule(&self, chain: &BlockChain, block: &Block) -> Result<bool, SafetyError>;

    /// The block `qc` makes final, if any.
    fn commit_rule(
        &self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<Option<Block>, SafetyError>;

    /// The QC a new proposal extends.
    fn fork_choice(&self, chain: &BlockChain, mode: ForkChoice) -> QuorumCertificate {
        default_fork_choice(chain, mode)
    }

    /// When commits are evaluated.
    fn commit_trigger(&self) -> CommitTrigger {
        CommitTrigger::Certificate
    }

    /// Where votes go.
    fn vote_routing(&self) -> VoteRouting {
        VoteRouting::NextLeader
    }

    /// Whether received proposals and votes are re-broadcast once.
    fn echoes_messages(&self) -> bool {
        false
    }

    /// Called after blocks are committed, root to tip.
    fn on_commit(&mut self, _committed: &[Block]) {}

    /// Last view voted in.
    fn last_voted_view(&self) -> View;

    /// Lowest parent view a block may extend and still get a vote.
    fn preferred_view(&self) -> View;
}

/// Fork choice shared by the leader-based variants.
pub(crate) fn default_fork_choice(chain: &BlockChain, mode: ForkChoice) -> QuorumCertificate {
    let high_qc = chain.high_qc();
    match mode {
        ForkChoice::Highest => high_qc.clone(),
        ForkChoice::Longest => chain.longest_certified_tail(),
        ForkChoice::Forking => chain
            .block(&high_qc.block_id)
            .map(|block| block.qc.clone())
            .unwrap_or_else(|_| high_qc.clone()),
    }
}

/// The block certified by `qc` must be stored (genesis always is).
fn require_certified_block(
    chain: &BlockChain,
    qc: &QuorumCertificate,
) -> Result<(), SafetyError> {
    if !qc.is_genesis() && !chain.contains(&qc.block_id) {
        return Err(SafetyError::UnknownBlock(qc.block_id));
    }
    Ok(())
}

/// Advance `last_voted` to `view`, refusing to go backwards.
fn advance_last_voted(last_voted: &mut View, view: View) -> Result<(), SafetyError> {
    if view < *last_voted {
        return Err(SafetyError::StaleVote {
            view,
            last_voted: *last_voted,
        });
    }
    *last_voted = view;
    Ok(())
}

/// Build the strategy for a configured variant.
pub fn new_safety_rules(variant: ProtocolVariant) -> Box<dyn SafetyRules> {
    match variant {
        ProtocolVariant::HotStuff => Box::new(HotStuff::new()),
        ProtocolVariant::TwoChain => Box::new(TwoChain::new()),
        ProtocolVariant::Fast => Box::new(FastHotStuff::new()),
        ProtocolVariant::Lbft => Box::new(Lbft::new()),
        ProtocolVariant::Streamlet => Box::new(Streamlet::new()),
    }
}

impl SafetyRules for Box<dyn SafetyRules> {
    fn update_state_by_qc(
        &mut self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<(), SafetyError> {
        (**self).update_state_by_qc(chain, qc)
    }

    fn update_state_by_view(&mut self, view: View) -> Result<(), SafetyError> {
        (**self).update_state_by_view(view)
    }

    fn voting_rule(&self, chain: &BlockChain, block: &Block) -> Result<bool, SafetyError> {
        (**self).voting_rule(chain, block)
    }

    fn commit_rule(
        &self,
        chain: &BlockChain,
        qc: &QuorumCertificate,
    ) -> Result<Option<Block>, SafetyError> {
        (**self).commit_rule(chain, qc)
    }

    fn fork_choice(&self, chain: &BlockChain, mode: ForkChoice) -> QuorumCertificate {
        (**self).fork_choice(chain, mode)
    }

    fn commit_trigger(&self) -> CommitTrigger {
        (**self).commit_trigger()
    }

    fn vote_routing(&self) -> VoteRouting {
        (**self).vote_routing()
    }

    fn echoes_messages(&self) -> bool {
        (**self).echoes_messages()
    }

    fn on_commit(&mut self, committed: &[Block]) {
        (**self).on_commit(committed)
    }

    fn last_voted_view(&self) -> View {
        (**self).last_voted_view()
    }

    fn preferred_view(&self) -> View {
        (**self).preferred_view()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            variant: ProtocolVariant,
        }
        for (name, variant) in [
            ("hotstuff", ProtocolVariant::HotStuff),
            ("two_chain", ProtocolVariant::TwoChain),
            ("fast", ProtocolVariant::Fast),
            ("lbft", ProtocolVariant::Lbft),
            ("streamlet", ProtocolVariant::Streamlet),
        ] {
            let parsed: Wrapper = toml::from_str(&format!("variant = \"{name}\"")).unwrap();
            assert_eq!(parsed.variant, variant);
        }
    }

    #[test]
    fn test_boxed_rules_delegate() {
        let mut rules = new_safety_rules(ProtocolVariant::Lbft);
        assert_eq!(rules.vote_routing(), VoteRouting::Broadcast);
        assert!(rules.echoes_messages());
        rules.update_state_by_view(View(4)).unwrap();
        assert_eq!(rules.last_voted_view(), View(4));

        let fast = new_safety_rules(ProtocolVariant::Fast);
        assert_eq!(fast.commit_trigger(), CommitTrigger::Proposal);
    }

    #[test]
    fn test_forking_extends_below_high_qc() {
        let (mut chain, blocks, qcs) = test_chain::linear(&[1, 2, 3]);
        chain.update_high_qc(&qcs[2]);

        assert_eq!(default_fork_choice(&chain, ForkChoice::Highest), qcs[2]);
        let forking = default_fork_choice(&chain, ForkChoice::Forking);
        assert_eq!(forking.block_id, blocks[1].id);
    }
}
