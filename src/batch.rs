//! Pure accumulators used by a runner: pending event batches and stat
//! counters.
//!
//! No I/O and no locking here. Both containers are only ever touched while
//! the owning runner's lock is held, so they need no synchronization of
//! their own.

use std::collections::HashMap;

use checkpoint::Checkpoint;
use sync_core::{ChangeEvent, EventKind, MappingId};

/// Ordered events pending for one mapping.
///
/// Batches are mapping-scoped and never shared, which is what lets two
/// mappings over the same table flush independently and out of lockstep.
#[derive(Debug, Default)]
pub struct EventBatch {
    events: Vec<ChangeEvent>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Position of the most recently added event, if any.
    pub fn last_position(&self) -> Option<&Checkpoint> {
        self.events.last().map(|event| &event.position)
    }

    /// Take all pending events, leaving the batch empty.
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Per-mapping, per-event-kind counts since the last stats flush.
#[derive(Debug, Default)]
pub struct StatCounters {
    counts: HashMap<(MappingId, EventKind), u64>,
}

impl StatCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, mapping_id: &MappingId, kind: EventKind) {
        *self.counts.entry((mapping_id.clone(), kind)).or_insert(0) += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Take all non-zero counts and reset every counter to zero.
    pub fn drain(&mut self) -> Vec<(MappingId, EventKind, u64)> {
        std::mem::take(&mut self.counts)
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|((mapping_id, kind), count)| (mapping_id, kind, count))
            .collect()
    }
}
