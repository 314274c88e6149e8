//! Ordering key for the simulation event queue.

use crate::NodeIndex;
use canopy_core::{Event, EventPriority};
use std::time::Duration;

/// Total order over scheduled events: time, then priority, then node, then
/// insertion sequence.
///
/// Internal events run before timers, and timers before network deliveries
/// scheduled for the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// Simulated time at which the event fires.
    pub time: Duration,
    /// Priority class of the event.
    pub priority: EventPriority,
    /// Node the event is delivered to.
    pub node_index: NodeIndex,
    /// Insertion counter; breaks every remaining tie.
    pub sequence: u64,
}

impl EventKey {
    /// Key for `event` delivered to `node_index` at `time`.
    pub fn new(time: Duration, event: &Event, node_index: NodeIndex, sequence: u64) -> Self {
        Self {
            time,
            priority: event.priority(),
            node_index,
            sequence,
        }
    }
}
