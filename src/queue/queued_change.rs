use std::time::Instant;

use crate::changes::ChangeEvent;

/// A pending event together with the moment it was last (re)queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedChange {
    pub(super) event: ChangeEvent,
    pub(super) queued_at: Instant,
    /// Monotonic tie breaker, `Instant` can repeat on fast machines
    pub(super) sequence: u64,
}

impl QueuedChange {
    pub fn event(&self) -> &ChangeEvent {
        &self.event
    }

    pub fn queued_at(&self) -> Instant {
        self.queued_at
    }

    /// Ordering key for processing: structural events (removals, new
    /// directories) before file additions and changes, then oldest first.
    pub(super) fn priority(&self) -> (bool, u64) {
        (self.event.kind().is_fast_mutating(), self.sequence)
    }

    pub(super) fn touch(&mut self, sequence: u64) {
        self.queued_at = Instant::now();
        self.sequence = sequence;
    }
}
