//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Validator identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ValidatorId(pub u64);

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator({})", self.0)
    }
}

/// Logical round number. Exactly one leader is designated per view.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct View(pub u64);

impl View {
    /// The view of the genesis block and genesis QC.
    pub const GENESIS: Self = View(0);

    /// The view that follows this one.
    pub fn next(self) -> Self {
        View(self.0 + 1)
    }

    /// The preceding view (returns None at genesis).
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(View)
    }

    /// Number of views between `earlier` and `self` (0 if `earlier` is later).
    pub fn distance_from(self, earlier: View) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<u64> for View {
    fn from(view: u64) -> Self {
        View(view)
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "View({})", self.0)
    }
}

/// Vote power (count of distinct signers).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VotePower(pub u64);

impl VotePower {
    /// Get the raw value.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Calculate if we have a Byzantine supermajority (>2/3 of total).
    pub fn has_quorum(voted: u64, total: u64) -> bool {
        voted * 3 > total * 2
    }

    /// Smallest count that satisfies [`VotePower::has_quorum`] for `total`.
    pub fn quorum_threshold(total: u64) -> u64 {
        (total * 2) / 3 + 1
    }
}

impl fmt::Display for VotePower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_next_prev() {
        let view = View(10);
        assert_eq!(view.next(), View(11));
        assert_eq!(view.prev(), Some(View(9)));
        assert_eq!(View::GENESIS.prev(), None);
        assert_eq!(View(7).distance_from(View(3)), 4);
        assert_eq!(View(3).distance_from(View(7)), 0);
    }

    #[test]
    fn test_quorum_four_validators() {
        // N=4, f=1: need 3
        assert!(!VotePower::has_quorum(2, 4));
        assert!(VotePower::has_quorum(3, 4));
        assert_eq!(VotePower::quorum_threshold(4), 3);
    }

    #[test]
    fn test_quorum_boundaries() {
        // N=3: 2*3=6 is not > 6
        assert!(!VotePower::has_quorum(2, 3));
        assert!(VotePower::has_quorum(3, 3));

        // N=6: 4*3=12 is not > 12
        assert!(!VotePower::has_quorum(4, 6));
        assert!(VotePower::has_quorum(5, 6));

        // N=7, f=2: need 5
        assert!(!VotePower::has_quorum(4, 7));
        assert!(VotePower::has_quorum(5, 7));
    }

    #[test]
    fn test_threshold_agrees_with_has_quorum() {
        for total in 1..=64u64 {
            let threshold = VotePower::quorum_threshold(total);
            assert!(VotePower::has_quorum(threshold, total), "total={total}");
            assert!(
                !VotePower::has_quorum(threshold - 1, total),
                "total={total}"
            );
        }
    }
}
