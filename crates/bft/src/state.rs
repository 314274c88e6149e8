//! Protocol engine.
//!
//! One synchronous actor per replica owning the block tree, the pacemaker
//! and the safety state. Every event returns the actions the runner must
//! perform; nothing here blocks or performs I/O.

use canopy_core::{Action, Event, FatalError, StateMachine, TimerId};
use canopy_messages::{
    ConsensusMessage, ProposalGossip, TimeoutCertificateGossip, TimeoutGossip, VoteGossip,
};
use canopy_types::{
    Block, Election, Hash, KeyPair, Payload, QuorumCertificate, TimeoutCertificate,
    TimeoutMessage, Topology, ValidatorId, View, Vote,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

use crate::blockchain::BlockChain;
use crate::config::BftConfig;
use crate::error::{BlockRejection, SafetyError};
use crate::pacemaker::Pacemaker;
use crate::pending::{EchoFilter, PendingBuffers};
use crate::safety::{
    new_safety_rules, CommitTrigger, ForkChoice, SafetyRules, VoteRouting,
};

/// Engine counters for monitoring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BftStats {
    /// Proposals this replica made.
    pub proposals: u64,
    /// Votes this replica signed.
    pub votes_sent: u64,
    /// Local view timers that fired.
    pub view_timeouts: u64,
    /// TCs built locally.
    pub tcs_formed: u64,
    /// Proposals refused during validation.
    pub rejected_blocks: u64,
}

/// Replica running the safety rules `S`.
///
/// # Event flow
///
/// 1. **Start** → enter view 1
/// 2. **Proposal** → validate, store, process its QC, commit, vote
/// 3. **Vote** → collect; a quorum becomes a QC processed like any other
/// 4. **View timer** → broadcast a timeout; a quorum of timeouts is a TC
/// 5. **TC** → move to the view after the one that timed out
/// 6. **Payload** → the leader proposes on its fork choice
pub struct BftState<S: SafetyRules> {
    // ═══════════════════════════════════════════════════════════════════════
    // Identity
    // ═══════════════════════════════════════════════════════════════════════
    signing_key: KeyPair,
    topology: Arc<dyn Topology>,
    election: Arc<dyn Election>,

    // ═══════════════════════════════════════════════════════════════════════
    // Protocol State
    // ═══════════════════════════════════════════════════════════════════════
    chain: BlockChain,
    pacemaker: Pacemaker,
    safety: S,

    /// View of the newest committed block.
    highest_committed_view: View,

    /// Last view this replica proposed in.
    last_proposed_view: View,

    /// View whose timer is armed.
    timer_view: Option<View>,

    // ═══════════════════════════════════════════════════════════════════════
    // Pending State
    // ═══════════════════════════════════════════════════════════════════════
    pending: PendingBuffers,
    echoed: EchoFilter,

    // ═══════════════════════════════════════════════════════════════════════
    // Configuration
    // ═══════════════════════════════════════════════════════════════════════
    config: BftConfig,

    // ═══════════════════════════════════════════════════════════════════════
    // Time
    // ═══════════════════════════════════════════════════════════════════════
    now: Duration,

    // ═══════════════════════════════════════════════════════════════════════
    // Statistics
    // ═══════════════════════════════════════════════════════════════════════
    stats: BftStats,
}

impl<S: SafetyRules> std::fmt::Debug for BftState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BftState")
            .field("validator_id", &self.validator_id())
            .field("variant", &self.config.variant)
            .field("cur_view", &self.pacemaker.cur_view())
            .field("high_qc_view", &self.chain.high_qc().view)
            .field("highest_committed_view", &self.highest_committed_view)
            .field("last_voted_view", &self.safety.last_voted_view())
            .finish()
    }
}

impl BftState<Box<dyn SafetyRules>> {
    /// Build a replica whose election and safety rules come from `config`.
    pub fn from_config(
        signing_key: KeyPair,
        topology: Arc<dyn Topology>,
        config: BftConfig,
    ) -> Self {
        let election = config.election.build(topology.committee().to_vec());
        let safety = new_safety_rules(config.variant);
        Self::new(signing_key, topology, election, config, safety)
    }
}

impl<S: SafetyRules> BftState<S> {
    /// Create a replica at genesis. Nothing happens until [`Event::Start`].
    pub fn new(
        signing_key: KeyPair,
        topology: Arc<dyn Topology>,
        election: Arc<dyn Election>,
        config: BftConfig,
        safety: S,
    ) -> Self {
        Self {
            chain: BlockChain::new(topology.committee_size()),
            pacemaker: Pacemaker::new(topology.clone(), config.view_timeout()),
            pending: PendingBuffers::new(config.max_buffered_blocks),
            echoed: EchoFilter::default(),
            signing_key,
            topology,
            election,
            safety,
            highest_committed_view: View::GENESIS,
            last_proposed_view: View::GENESIS,
            timer_view: None,
            config,
            now: Duration::ZERO,
            stats: BftStats::default(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    fn validator_id(&self) -> ValidatorId {
        self.topology.local_validator_id()
    }

    fn is_leader(&self, view: View) -> bool {
        self.election.is_leader(self.validator_id(), view)
    }

    /// Current view.
    pub fn cur_view(&self) -> View {
        self.pacemaker.cur_view()
    }

    /// Highest QC known.
    pub fn high_qc(&self) -> &QuorumCertificate {
        self.chain.high_qc()
    }

    /// Highest TC known.
    pub fn high_tc(&self) -> Option<&TimeoutCertificate> {
        self.pacemaker.high_tc()
    }

    /// The block tree.
    pub fn chain(&self) -> &BlockChain {
        &self.chain
    }

    /// The safety state.
    pub fn safety(&self) -> &S {
        &self.safety
    }

    /// The configuration.
    pub fn config(&self) -> &BftConfig {
        &self.config
    }

    /// View of the newest committed block.
    pub fn highest_committed_view(&self) -> View {
        self.highest_committed_view
    }

    /// Engine counters.
    pub fn stats(&self) -> BftStats {
        self.stats
    }

    /// One-line summary of this replica's progress.
    pub fn chain_status(&self) -> String {
        format!(
            "[{}] view={} {}",
            self.validator_id(),
            self.pacemaker.cur_view().0,
            self.chain.chain_status()
        )
    }

    fn timestamp_ms(&self) -> u64 {
        self.now.as_millis() as u64
    }

    // ═══════════════════════════════════════════════════════════════════════
    // View Entry
    // ═══════════════════════════════════════════════════════════════════════

    fn on_start(&mut self) -> Vec<Action> {
        if self.pacemaker.cur_view() != View::GENESIS {
            return vec![];
        }
        self.pacemaker.advance_view(View::GENESIS);
        self.on_view_advanced()
    }

    /// Re-arm the view timer after the pacemaker moved and ask for a payload
    /// if this replica leads the new view.
    fn on_view_advanced(&mut self) -> Vec<Action> {
        let Some(&view) = self.pacemaker.drain_entered_views().last() else {
            return vec![];
        };
        let mut actions = Vec::new();
        if let Some(old) = self.timer_view.replace(view) {
            actions.push(Action::CancelTimer {
                id: TimerId::View(old),
            });
        }
        actions.push(Action::SetTimer {
            id: TimerId::View(view),
            duration: self.pacemaker.view_timeout(),
        });
        self.pacemaker.cleanup_below(view);

        let leader = self.election.leader_for(view);
        info!(view = view.0, leader = ?leader, "Entered view");
        if leader == self.validator_id() {
            actions.push(Action::RequestPayload { view });
        }
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Proposer Logic
    // ═══════════════════════════════════════════════════════════════════════

    /// Build, send and locally process a proposal for `view`.
    #[instrument(skip(self, payload), fields(view = view.0, txs = payload.len()))]
    fn on_payload_ready(
        &mut self,
        view: View,
        payload: Payload,
    ) -> Result<Vec<Action>, FatalError> {
        if view != self.pacemaker.cur_view() || !self.is_leader(view) {
            debug!(cur_view = self.pacemaker.cur_view().0, "Payload for a view we do not lead now");
            return Ok(vec![]);
        }
        if view <= self.last_proposed_view {
            debug!("Already proposed in this view");
            return Ok(vec![]);
        }

        let mode = self.config.effective_fork_choice();
        let qc = self.safety.fork_choice(&self.chain, mode);
        if qc.view >= view {
            warn!(qc_view = qc.view.0, "Fork choice is not below the proposal view");
            return Ok(vec![]);
        }
        self.last_proposed_view = view;
        self.stats.proposals += 1;

        let block = Block::new(view, qc, payload, self.validator_id(), self.timestamp_ms())
            .signed(&self.signing_key);
        info!(
            block = ?block.id,
            parent = ?block.prev_id,
            qc_view = block.qc.view.0,
            forking = mode == ForkChoice::Forking,
            "Proposing"
        );

        let message = ConsensusMessage::from(ProposalGossip::new(block.clone()));
        let mut actions = vec![if self.config.thrifty {
            Action::Multicast {
                to: self.quorum_subset(),
                message,
            }
        } else {
            Action::Broadcast { message }
        }];
        actions.extend(self.on_proposal(block)?);
        Ok(actions)
    }

    /// The other replicas completing a quorum with us, in committee order
    /// starting after this replica.
    fn quorum_subset(&self) -> Vec<ValidatorId> {
        let committee = self.topology.committee();
        let me = self.topology.committee_index(self.validator_id()).unwrap_or(0);
        let needed = self.topology.quorum_threshold().saturating_sub(1);
        (1..committee.len())
            .map(|offset| committee[(me + offset) % committee.len()])
            .take(needed)
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Block Reception
    // ═══════════════════════════════════════════════════════════════════════

    /// Process a proposal and every buffered block it unblocks.
    #[instrument(skip(self, block), fields(
        view = block.view.0,
        proposer = ?block.proposer,
        block = ?block.id
    ))]
    fn on_proposal(&mut self, block: Block) -> Result<Vec<Action>, FatalError> {
        let mut actions = Vec::new();
        let mut work = VecDeque::from([block]);
        while let Some(block) = work.pop_front() {
            let id = block.id;
            actions.extend(self.process_block(block)?);
            if self.chain.contains(&id) {
                work.extend(self.pending.take_blocks(&id));
            }
        }
        Ok(actions)
    }

    fn validate_block(&self, block: &Block) -> Result<(), BlockRejection> {
        let current_view = self.pacemaker.cur_view();
        if block.view < current_view {
            return Err(BlockRejection::Stale {
                block_view: block.view,
                current_view,
            });
        }
        if !self.election.is_leader(block.proposer, block.view) {
            return Err(BlockRejection::InvalidLeader {
                proposer: block.proposer,
                view: block.view,
            });
        }
        if !block.has_valid_id() {
            return Err(BlockRejection::InvalidId);
        }
        if block.proposer != self.validator_id() {
            let verified = self
                .topology
                .public_key(block.proposer)
                .is_some_and(|pk| pk.verify(&block.signing_message(), &block.signature));
            if !verified {
                return Err(BlockRejection::InvalidSignature);
            }
        }
        if block.qc.view >= block.view {
            return Err(BlockRejection::QcNotBeforeBlock {
                qc_view: block.qc.view,
                block_view: block.view,
            });
        }
        if block.prev_id != block.qc.block_id {
            return Err(BlockRejection::ParentNotCertified {
                prev_id: block.prev_id,
                qc_block: block.qc.block_id,
            });
        }
        block.qc.verify(self.topology.as_ref())?;
        Ok(())
    }

    fn process_block(&mut self, block: Block) -> Result<Vec<Action>, FatalError> {
        if self.chain.contains(&block.id) || self.pending.is_buffered(&block.id) {
            trace!(block = ?block.id, "Block already known");
            return Ok(vec![]);
        }
        if let Err(rejection) = self.validate_block(&block) {
            self.stats.rejected_blocks += 1;
            warn!(
                block = ?block.id,
                view = block.view.0,
                proposer = ?block.proposer,
                error = %rejection,
                "Rejected proposal"
            );
            return Ok(vec![]);
        }

        if !self.chain.contains(&block.prev_id) {
            if block.qc.view < self.chain.lowest_view() {
                debug!(block = ?block.id, qc_view = block.qc.view.0, "Block extends a pruned branch");
                return Ok(vec![]);
            }
            debug!(block = ?block.id, missing = ?block.prev_id, "Parent unknown, buffering block");
            self.pending.buffer_block(block.prev_id, block);
            return Ok(vec![]);
        }

        let mut actions = Vec::new();
        if self.safety.echoes_messages()
            && block.proposer != self.validator_id()
            && self.echoed.first_block(block.id)
        {
            actions.push(Action::Broadcast {
                message: ProposalGossip::new(block.clone()).into(),
            });
        }

        self.chain.add_block(block.clone());
        actions.extend(self.process_certificate(block.qc.clone())?);
        if let Some(qc) = self.pending.take_qc(&block.id) {
            actions.extend(self.process_certificate(qc)?);
        }

        if self.safety.commit_trigger() == CommitTrigger::Proposal
            && block.qc.view.0 >= 2
            && block.qc.view.next() == block.view
        {
            match self.safety.commit_rule(&self.chain, &block.qc) {
                Ok(Some(target)) => actions.extend(self.commit(&target.id)?),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "Commit rule not evaluable on proposal"),
            }
        }

        actions.extend(self.try_vote(&block)?);
        Ok(actions)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Voting
    // ═══════════════════════════════════════════════════════════════════════

    fn try_vote(&mut self, block: &Block) -> Result<Vec<Action>, FatalError> {
        if block.view <= self.safety.last_voted_view() {
            trace!(block = ?block.id, "Already voted at or after this view");
            return Ok(vec![]);
        }
        match self.safety.voting_rule(&self.chain, block) {
            Ok(true) => self.cast_vote(block),
            Ok(false) => {
                debug!(
                    block = ?block.id,
                    view = block.view.0,
                    preferred = self.safety.preferred_view().0,
                    "Voting rule declined, deferring"
                );
                self.pending.defer_vote(block.id, block.view);
                Ok(vec![])
            }
            Err(e) => {
                debug!(block = ?block.id, error = %e, "Cannot evaluate voting rule");
                Ok(vec![])
            }
        }
    }

    fn cast_vote(&mut self, block: &Block) -> Result<Vec<Action>, FatalError> {
        if let Err(e) = self.safety.update_state_by_view(block.view) {
            debug!(error = %e, "Refusing to vote");
            return Ok(vec![]);
        }
        let vote = Vote::new(block.view, block.id, self.validator_id(), &self.signing_key);
        self.stats.votes_sent += 1;

        let mut actions = Vec::new();
        match self.safety.vote_routing() {
            VoteRouting::NextLeader => {
                let next_leader = self.election.leader_for(block.view.next());
                debug!(block = ?block.id, to = ?next_leader, "Voting");
                if next_leader == self.validator_id() {
                    actions.extend(self.process_vote(vote)?);
                } else {
                    actions.push(Action::SendTo {
                        to: next_leader,
                        message: VoteGossip::new(vote).into(),
                    });
                }
            }
            VoteRouting::Broadcast => {
                debug!(block = ?block.id, "Voting to all");
                actions.push(Action::Broadcast {
                    message: VoteGossip::new(vote.clone()).into(),
                });
                actions.extend(self.process_vote(vote)?);
            }
        }
        Ok(actions)
    }

    /// Retry votes declined earlier, now that the safety state moved.
    fn retry_deferred_votes(&mut self) -> Result<Vec<Action>, FatalError> {
        if !self.pending.has_deferred_votes() {
            return Ok(vec![]);
        }
        let mut actions = Vec::new();
        for id in self
            .pending
            .take_deferred_votes(self.safety.last_voted_view())
        {
            let Ok(block) = self.chain.block(&id).cloned() else {
                continue;
            };
            actions.extend(self.try_vote(&block)?);
        }
        Ok(actions)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Vote Collection
    // ═══════════════════════════════════════════════════════════════════════

    #[instrument(skip(self, vote), fields(
        view = vote.view.0,
        voter = ?vote.voter,
        block = ?vote.block_id
    ))]
    fn on_vote(&mut self, vote: Vote) -> Result<Vec<Action>, FatalError> {
        if vote.voter == self.validator_id() {
            trace!("Own vote echoed back");
            return Ok(vec![]);
        }
        let Some(public_key) = self.topology.public_key(vote.voter) else {
            warn!("Vote from validator not in committee");
            return Ok(vec![]);
        };
        if !vote.verify(public_key) {
            warn!("Vote has invalid signature");
            return Ok(vec![]);
        }

        let mut actions = Vec::new();
        if self.safety.echoes_messages() && self.echoed.first_vote(vote.block_id, vote.voter) {
            actions.push(Action::Broadcast {
                message: VoteGossip::new(vote.clone()).into(),
            });
        }
        actions.extend(self.process_vote(vote)?);
        Ok(actions)
    }

    /// Count a verified vote.
    fn process_vote(&mut self, vote: Vote) -> Result<Vec<Action>, FatalError> {
        if let Ok(block) = self.chain.block(&vote.block_id) {
            if block.view != vote.view {
                warn!(
                    voter = ?vote.voter,
                    vote_view = vote.view.0,
                    block_view = block.view.0,
                    "Vote view does not match its block"
                );
                return Ok(vec![]);
            }
        }
        let Some(mut qc) = self.chain.add_vote(vote) else {
            return Ok(vec![]);
        };
        qc.leader = self.validator_id();
        if !self.chain.contains(&qc.block_id) {
            debug!(block = ?qc.block_id, view = qc.view.0, "QC for unknown block, buffering");
            self.pending.buffer_qc(qc);
            return Ok(vec![]);
        }
        self.process_certificate(qc)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QC and Commit Logic
    // ═══════════════════════════════════════════════════════════════════════

    /// Apply a verified QC: safety state, high QC, view, commit.
    fn process_certificate(&mut self, qc: QuorumCertificate) -> Result<Vec<Action>, FatalError> {
        let mut actions = Vec::new();

        if self.config.byzantine
            && self.config.effective_fork_choice() == ForkChoice::Forking
            && self.is_leader(qc.view.next())
        {
            debug!(view = qc.view.0, "Byzantine leader skips safety update");
            self.chain.update_high_qc(&qc);
            self.chain.record_certified(&qc);
            if self.pacemaker.advance_view(qc.view).is_some() {
                actions.extend(self.on_view_advanced());
            }
            return Ok(actions);
        }

        match self.safety.update_state_by_qc(&self.chain, &qc) {
            Ok(()) => {}
            Err(SafetyError::UnknownBlock(id)) => {
                debug!(block = ?id, view = qc.view.0, "Certified block unknown, buffering QC");
                self.pending.buffer_qc(qc);
                return Ok(actions);
            }
            Err(e) => debug!(view = qc.view.0, error = %e, "Safety state not updated"),
        }

        self.chain.update_high_qc(&qc);
        self.chain.record_certified(&qc);
        if self.pacemaker.advance_view(qc.view).is_some() {
            actions.extend(self.on_view_advanced());
        }

        if self.safety.commit_trigger() == CommitTrigger::Certificate {
            match self.safety.commit_rule(&self.chain, &qc) {
                Ok(Some(target)) => actions.extend(self.commit(&target.id)?),
                Ok(None) => {}
                Err(e) => trace!(view = qc.view.0, error = %e, "Commit rule not evaluable"),
            }
        }

        actions.extend(self.retry_deferred_votes()?);
        Ok(actions)
    }

    /// Finalize `target` and its uncommitted ancestors.
    fn commit(&mut self, target: &Hash) -> Result<Vec<Action>, FatalError> {
        let view = match self.chain.block(target) {
            Ok(block) => block.view,
            Err(e) => {
                return Err(FatalError::InvariantBroken(format!(
                    "commit target vanished: {e}"
                )))
            }
        };
        if view <= self.highest_committed_view {
            return Ok(vec![]);
        }

        let outcome = self
            .chain
            .commit_block(target, self.pacemaker.cur_view())
            .map_err(|e| FatalError::InvariantBroken(format!("commit failed: {e}")))?;
        self.highest_committed_view = view;
        self.safety.on_commit(&outcome.committed);
        self.pending.prune_below(view);

        let mut actions = Vec::with_capacity(outcome.committed.len() + outcome.forked.len());
        for block in outcome.committed {
            debug!(block = ?block.id, view = block.view.0, "Committed block");
            self.echoed.forget(&block.id);
            actions.push(Action::EmitCommittedBlock { block });
        }
        for block in outcome.forked {
            debug!(block = ?block.id, view = block.view.0, "Forked block");
            self.echoed.forget(&block.id);
            actions.push(Action::EmitForkedBlock { block });
        }
        Ok(actions)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Timeouts
    // ═══════════════════════════════════════════════════════════════════════

    #[instrument(skip(self), fields(view = view.0))]
    fn on_view_timer(&mut self, view: View) -> Result<Vec<Action>, FatalError> {
        let mut actions = Vec::new();
        let cur_view = self.pacemaker.cur_view();
        if view < cur_view {
            trace!(cur_view = cur_view.0, "Stale view timer");
            return Ok(actions);
        }
        let mut advanced = false;
        if view > cur_view {
            if let Some(prev) = view.prev() {
                advanced = self.pacemaker.advance_view(prev).is_some();
                actions.extend(self.on_view_advanced());
            }
        }

        self.stats.view_timeouts += 1;
        info!(high_qc_view = self.chain.high_qc().view.0, "View timed out");
        let tmo = self
            .pacemaker
            .timeout_for(view, self.chain.high_qc().clone(), &self.signing_key);
        actions.push(Action::Broadcast {
            message: TimeoutGossip::new(tmo.clone()).into(),
        });
        // Entering the view already armed its timer.
        if !advanced {
            actions.push(Action::SetTimer {
                id: TimerId::View(view),
                duration: self.pacemaker.view_timeout(),
            });
        }
        actions.extend(self.process_timeout(tmo)?);
        Ok(actions)
    }

    #[instrument(skip(self, tmo), fields(view = tmo.view.0, sender = ?tmo.sender))]
    fn on_timeout(&mut self, tmo: TimeoutMessage) -> Result<Vec<Action>, FatalError> {
        if tmo.view < self.pacemaker.cur_view() {
            trace!(cur_view = self.pacemaker.cur_view().0, "Stale timeout");
            return Ok(vec![]);
        }
        if tmo.sender == self.validator_id() {
            return Ok(vec![]);
        }
        let Some(public_key) = self.topology.public_key(tmo.sender) else {
            warn!("Timeout from validator not in committee");
            return Ok(vec![]);
        };
        if !tmo.verify(public_key) {
            warn!("Timeout has invalid signature");
            return Ok(vec![]);
        }
        self.process_timeout(tmo)
    }

    /// Count a verified timeout, adopting the certificates it carries.
    fn process_timeout(&mut self, tmo: TimeoutMessage) -> Result<Vec<Action>, FatalError> {
        let mut actions = Vec::new();

        if tmo.high_qc.view > self.chain.high_qc().view {
            match tmo.high_qc.verify(self.topology.as_ref()) {
                Ok(()) => {
                    self.chain.update_high_qc(&tmo.high_qc);
                    self.chain.record_certified(&tmo.high_qc);
                }
                Err(e) => warn!(sender = ?tmo.sender, error = %e, "Timeout carries invalid QC"),
            }
        }
        if let Some(tc) = &tmo.high_tc {
            if tc.view >= self.pacemaker.cur_view() {
                actions.extend(self.on_timeout_certificate(tc.clone()));
            }
        }

        if let Some(tc) = self.pacemaker.process_remote_timeout(tmo) {
            self.stats.tcs_formed += 1;
            actions.push(Action::Broadcast {
                message: TimeoutCertificateGossip::new(tc.clone()).into(),
            });
            actions.extend(self.adopt_timeout_certificate(tc));
        }
        Ok(actions)
    }

    /// Verify and adopt a TC from the network.
    #[instrument(skip(self, tc), fields(view = tc.view.0))]
    fn on_timeout_certificate(&mut self, tc: TimeoutCertificate) -> Vec<Action> {
        if tc.view < self.pacemaker.cur_view() {
            trace!("Stale TC");
            return vec![];
        }
        if let Err(e) = tc.verify(self.topology.as_ref()) {
            warn!(error = %e, "Invalid TC");
            return vec![];
        }
        self.adopt_timeout_certificate(tc)
    }

    fn adopt_timeout_certificate(&mut self, tc: TimeoutCertificate) -> Vec<Action> {
        self.pacemaker.update_high_tc(&tc);
        if self.chain.update_high_qc(&tc.high_qc) {
            self.chain.record_certified(&tc.high_qc);
        }
        if self.pacemaker.advance_view(tc.view).is_some() {
            return self.on_view_advanced();
        }
        vec![]
    }
}

impl<S: SafetyRules> StateMachine for BftState<S> {
    fn handle(&mut self, event: Event) -> Result<Vec<Action>, FatalError> {
        trace!(event = event.type_name(), validator = ?self.validator_id(), "Handling event");
        match event {
            Event::Start => Ok(self.on_start()),
            Event::PayloadReady { view, payload } => self.on_payload_ready(view, payload),
            Event::ViewTimer { view } => self.on_view_timer(view),
            Event::ProposalReceived { block } => self.on_proposal(block),
            Event::VoteReceived { vote } => self.on_vote(vote),
            Event::TimeoutReceived { timeout } => self.on_timeout(timeout),
            Event::TimeoutCertificateReceived { certificate } => {
                Ok(self.on_timeout_certificate(certificate))
            }
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}
