//! Deterministic ordering of scheduled events.

use crate::NodeIndex;
use attestor_core::{Event, EventPriority};
use std::time::Duration;

/// Key for the global event queue.
///
/// Events are ordered by time, then priority (internal before timers before
/// network), then node, then insertion sequence. The sequence makes every key
/// unique, so the queue can be a `BTreeMap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub node_index: NodeIndex,
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, event: &Event, node_index: NodeIndex, sequence: u64) -> Self {
        Self {
            time,
            priority: event.priority(),
            node_index,
            sequence,
        }
    }
}
