//! Replica configuration.

use crate::safety::{ForkChoice, ProtocolVariant};
use canopy_types::ElectionKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable per-replica protocol configuration.
///
/// Identity, keys and the validator set travel separately (as the replica's
/// `Topology` and `KeyPair`); this struct only carries tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BftConfig {
    /// Which safety rules the replica runs.
    pub variant: ProtocolVariant,

    /// Which QC new proposals extend.
    pub fork_choice: ForkChoice,

    /// Leader election scheme.
    pub election: ElectionKind,

    /// Local view timer, in milliseconds.
    pub view_timeout_ms: u64,

    /// Fault injection: act as a Byzantine replica. Only affects the
    /// `Forking` fork choice.
    pub byzantine: bool,

    /// Send proposals to a quorum subset instead of everyone.
    pub thrifty: bool,

    /// Maximum transactions pulled from the mempool per proposal.
    pub max_payload: usize,

    /// Upper bound on blocks held while waiting for a missing dependency.
    pub max_buffered_blocks: usize,
}

impl Default for BftConfig {
    fn default() -> Self {
        Self {
            variant: ProtocolVariant::TwoChain,
            fork_choice: ForkChoice::Highest,
            election: ElectionKind::Rotation,
            view_timeout_ms: 1_000,
            byzantine: false,
            thrifty: false,
            max_payload: 400,
            max_buffered_blocks: 1_024,
        }
    }
}

impl BftConfig {
    /// Create a configuration with default tunables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the protocol variant.
    pub fn with_variant(mut self, variant: ProtocolVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set the fork choice policy.
    pub fn with_fork_choice(mut self, fork_choice: ForkChoice) -> Self {
        self.fork_choice = fork_choice;
        self
    }

    /// Set the election scheme.
    pub fn with_election(mut self, election: ElectionKind) -> Self {
        self.election = election;
        self
    }

    /// Set the local view timeout.
    pub fn with_view_timeout(mut self, timeout: Duration) -> Self {
        self.view_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Mark this replica Byzantine.
    pub fn with_byzantine(mut self, byzantine: bool) -> Self {
        self.byzantine = byzantine;
        self
    }

    /// Enable quorum-subset proposal multicast.
    pub fn with_thrifty(mut self, thrifty: bool) -> Self {
        self.thrifty = thrifty;
        self
    }

    /// Set the per-proposal payload limit.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Local view timer as a duration.
    pub fn view_timeout(&self) -> Duration {
        Duration::from_millis(self.view_timeout_ms)
    }

    /// The fork choice actually used: `Forking` only applies to Byzantine
    /// replicas, honest replicas fall back to `Highest`.
    pub fn effective_fork_choice(&self) -> ForkChoice {
        match self.fork_choice {
            ForkChoice::Forking if !self.byzantine => ForkChoice::Highest,
            other => other,
        }
    }
}
