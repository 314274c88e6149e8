//! BFT consensus state machine.
//!
//! This crate provides a synchronous HotStuff-family consensus replica
//! that can be used for both simulation and production.
//!
//! # Architecture
//!
//! - [`BlockChain`]: block tree, vote aggregation, high QC, commit and pruning
//! - [`Pacemaker`]: current view, timeout aggregation into TCs
//! - [`SafetyRules`]: the per-protocol voting, commit and fork choice rules
//! - [`BftState`]: the engine tying them together behind
//!   [`StateMachine`](canopy_core::StateMachine)
//!
//! The replica processes events synchronously:
//!
//! - `Event::Start` → enter view 1, arm the view timer
//! - `Event::ProposalReceived` → validate, store, process the QC, vote
//! - `Event::VoteReceived` → collect votes, form a QC at quorum
//! - `Event::ViewTimer` → broadcast a timeout for the view
//! - `Event::TimeoutReceived` → collect timeouts, form a TC at quorum
//! - `Event::PayloadReady` → build and send a proposal if we lead the view
//!
//! All I/O is performed by the runner via returned `Action`s.

mod blockchain;
mod config;
mod error;
mod pacemaker;
mod pending;
mod safety;
mod state;

pub use blockchain::{BlockChain, ChainStats, CommitOutcome};
pub use config::BftConfig;
pub use error::{BlockRejection, ChainError, SafetyError};
pub use pacemaker::Pacemaker;
pub use pending::{EchoFilter, PendingBuffers};
pub use safety::{
    new_safety_rules, CommitTrigger, FastHotStuff, ForkChoice, HotStuff, Lbft, Notarized,
    ProtocolVariant, SafetyRules, Streamlet, TwoChain, VoteRouting,
};
pub use state::{BftState, BftStats};

/// A replica whose safety rules are chosen at runtime.
pub type DynBftState = BftState<Box<dyn SafetyRules>>;
