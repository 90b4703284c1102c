use tracing::debug;

use crate::changes::ChangeEvent;
use crate::queue::{PathChangeQueue, QueuedChange};

/// Exclusive checkout of one pending event.
///
/// While it is alive, pushes related to the staged event flip its
/// `changed` and `obsolete` flags instead of touching the pending set.
/// The slot is released by [`StagedChange::finish`], or when dropped.
#[derive(Debug)]
pub struct StagedChange {
    queue: PathChangeQueue,
    queued: QueuedChange,
    finished: bool,
}

impl StagedChange {
    pub(super) fn new(queue: PathChangeQueue, queued: QueuedChange) -> Self {
        Self {
            queue,
            queued,
            finished: false,
        }
    }

    pub fn event(&self) -> &ChangeEvent {
        self.queued.event()
    }

    /// Whether the event happened again since the last call. Clears the flag.
    pub fn was_changed(&self) -> bool {
        self.queue
            .with_staged(|slot| std::mem::take(&mut slot.changed))
            .unwrap_or(false)
    }

    /// Whether a later event nullified this one, or the queue was reset.
    pub fn is_obsolete(&self) -> bool {
        self.queue.with_staged(|slot| slot.obsolete).unwrap_or(true)
    }

    pub fn finish(mut self) {
        self.release();
    }

    /// Frees the slot. Returns whether the early-finish note was logged.
    fn release(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;

        let Some(slot) = self.queue.take_staged() else {
            return false;
        };
        if slot.obsolete || !slot.queued.event().kind().is_fast_mutating() {
            return false;
        }

        let elapsed = slot.queued.queued_at().elapsed();
        if elapsed >= self.queue.grace_period() {
            return false;
        }
        debug!(
            "Finished {} only {:?} after it was queued, the file may still be changing",
            slot.queued.event(),
            elapsed
        );
        true
    }
}

impl Drop for StagedChange {
    fn drop(&mut self) {
        self.release();
    }
}
