//! Core traits for state machines.

use crate::{Action, Event, FatalError};
use std::time::Duration;

/// A state machine that processes events.
///
/// This is the core abstraction for the consensus architecture.
/// A replica is a state machine that is:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// # Example
///
/// ```ignore
/// impl<S: SafetyRules> StateMachine for BftState<S> {
///     fn handle(&mut self, event: Event) -> Result<Vec<Action>, FatalError> {
///         match event {
///             Event::ProposalReceived { block } => self.on_block(block),
///             Event::VoteReceived { vote } => self.on_vote(vote),
///             // ... etc
///         }
///     }
///
///     fn set_time(&mut self, now: Duration) {
///         self.now = now;
///     }
/// }
/// ```
pub trait StateMachine {
    /// Process an event, returning actions to perform.
    ///
    /// # Guarantees
    ///
    /// - **Synchronous**: This method never blocks or awaits
    /// - **Deterministic**: Given the same state and event, always returns the same actions
    /// - **No I/O**: All I/O is performed by the runner via the returned actions
    ///
    /// # Errors
    ///
    /// Only [`FatalError`] escapes. Invalid or out-of-order input is handled
    /// inside the state machine. A runner that receives an error must stop
    /// feeding this replica.
    fn handle(&mut self, event: Event) -> Result<Vec<Action>, FatalError>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call to provide the
    /// current simulation or wall-clock time.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}
