//! Errors that escape the state machine.

/// A local bug: the state machine cannot continue safely.
///
/// Message-level problems (stale, badly signed, missing dependencies) never
/// surface here; they are logged and absorbed by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    /// An internal invariant no longer holds.
    #[error("internal invariant broken: {0}")]
    InvariantBroken(String),
}
