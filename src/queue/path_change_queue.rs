use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use std::time::Instant;

use snafu::Snafu;
use tracing::{debug, error, info, trace, warn};

use crate::changes::{ChangeEvent, EventComparison, compare, related};
use crate::filesystem::PathTree;
use crate::path;
use crate::queue::{QueuedChange, StagedChange};

/// Finishing a file event sooner than this after it was queued gets logged.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(2000);

type ResetCallback = Arc<dyn Fn() + Send + Sync>;

/// Coalescing queue holding at most one pending event per path.
///
/// The queue is a cheap handle; clones share the same state, so a notifier
/// can keep one clone to [`push`](PathChangeQueue::push) from any task or
/// thread while the owner stages and processes events with another.
#[derive(Clone)]
pub struct PathChangeQueue {
    shared: Arc<Mutex<QueueState>>,
    on_reset: ResetCallback,
    grace_period: Duration,
}

impl PathChangeQueue {
    /// Creates an empty queue. `on_reset` runs after every reset and is
    /// expected to re-seed the queue from ground truth, typically with a
    /// single root level directory event.
    pub fn new(on_reset: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Mutex::new(QueueState::new())),
            on_reset: Arc::new(on_reset),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Folds a raw event into the pending set.
    ///
    /// Never waits for processing; safe to call while an event is staged.
    pub fn push(&self, event: ChangeEvent) {
        let description = event.to_string();
        let absorbed = self.lock().absorb(event);
        trace!("Pushed {}: {:?}", description, absorbed);

        if absorbed == Absorbed::Inconsistent {
            warn!("{} contradicts the pending changes", description);
            self.reset();
        }
    }

    /// Checks out `event` for processing. It must be exactly the event
    /// pending at its path, and nothing else may be staged.
    ///
    /// A push landing between [`peek`](PathChangeQueue::peek) and this call
    /// can replace the peeked event; use [`stage_next`](PathChangeQueue::stage_next)
    /// to select and stage atomically.
    pub fn stage(&self, event: &ChangeEvent) -> Result<StagedChange, QueueError> {
        let mut state = self.lock();
        if let Some(slot) = &state.staged {
            return AlreadyStagedSnafu {
                event: event.clone(),
                staged: slot.queued.event().clone(),
            }
            .fail();
        }

        let queued = match state.pending.get(event.path()) {
            Ok(queued) if queued.event() == event => queued.clone(),
            _ => {
                return NotPendingSnafu {
                    event: event.clone(),
                }
                .fail();
            }
        };

        Ok(self.stage_locked(state, queued))
    }

    /// Stages whatever [`peek`](PathChangeQueue::peek) would return, under a
    /// single lock. `None` when nothing is pending.
    pub fn stage_next(&self) -> Result<Option<StagedChange>, QueueError> {
        let state = self.lock();
        if let Some(slot) = &state.staged {
            return StagingInProgressSnafu {
                staged: slot.queued.event().clone(),
            }
            .fail();
        }

        let Some(queued) = state.next_pending().cloned() else {
            return Ok(None);
        };
        Ok(Some(self.stage_locked(state, queued)))
    }

    fn stage_locked(
        &self,
        mut state: MutexGuard<'_, QueueState>,
        queued: QueuedChange,
    ) -> StagedChange {
        state.remove_pending(queued.event().path());
        state.staged = Some(StagedSlot {
            queued: queued.clone(),
            changed: false,
            obsolete: false,
        });
        drop(state);

        debug!("Staged {}", queued.event());
        StagedChange::new(self.clone(), queued)
    }

    /// Whether any event is pending. Not available while an event is staged.
    pub fn has_pending(&self) -> Result<bool, QueueError> {
        let state = self.lock();
        if let Some(slot) = &state.staged {
            return StagingInProgressSnafu {
                staged: slot.queued.event().clone(),
            }
            .fail();
        }
        Ok(state.pending.leaves().next().is_some())
    }

    /// The event that should be processed next: anything other than a file
    /// addition or change first, then the oldest.
    pub fn peek(&self) -> Option<ChangeEvent> {
        let state = self.lock();
        let next = state.next_pending().map(|queued| queued.event().clone());
        next
    }

    /// Drops every pending event, marks the staged one obsolete and asks the
    /// owner to resynchronize.
    pub fn reset(&self) {
        self.lock().clear();
        info!("Change queue was reset, a full resynchronization is required");
        (self.on_reset)();
    }

    /// Snapshot of the pending events in path order.
    pub fn pending_events(&self) -> Vec<ChangeEvent> {
        self.lock()
            .pending
            .leaves()
            .map(|(_, queued)| queued.event().clone())
            .collect()
    }

    pub(super) fn with_staged<R>(&self, f: impl FnOnce(&mut StagedSlot) -> R) -> Option<R> {
        self.lock().staged.as_mut().map(f)
    }

    pub(super) fn take_staged(&self) -> Option<StagedSlot> {
        self.lock().staged.take()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // State is consistent between statements, a panic elsewhere can not corrupt it
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PathChangeQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathChangeQueue")
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(super) struct StagedSlot {
    pub(super) queued: QueuedChange,
    pub(super) changed: bool,
    pub(super) obsolete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Absorbed {
    Stored,
    Coalesced,
    Dropped,
    Inconsistent,
}

/// The existing event an incoming one has to be compared against.
struct Relevant {
    event: ChangeEvent,
    staged: bool,
}

#[derive(Debug)]
struct QueueState {
    pending: PathTree<QueuedChange>,
    staged: Option<StagedSlot>,
    next_sequence: u64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            // a pending root level event is stored as the root leaf
            pending: PathTree::with_root_as_file(),
            staged: None,
            next_sequence: 0,
        }
    }

    fn next_pending(&self) -> Option<&QueuedChange> {
        self.pending
            .leaves()
            .map(|(_, queued)| queued)
            .min_by_key(|queued| queued.priority())
    }

    fn absorb(&mut self, event: ChangeEvent) -> Absorbed {
        let relevant = self.relevant_for(&event);

        if self.pending.is_dir(event.path()).unwrap_or(false) {
            if !event.kind().is_directory() {
                return Absorbed::Inconsistent;
            }
            debug!("{} supersedes everything pending beneath it", event);
            self.remove_pending(event.path());
        }

        let Some(relevant) = relevant else {
            return self.insert(event);
        };

        match compare(&relevant.event, &event) {
            EventComparison::NewUpdatesOld => {
                let sequence = self.next_sequence();
                if relevant.staged {
                    if let Some(slot) = self.staged.as_mut() {
                        slot.changed = true;
                        slot.queued.touch(sequence);
                    }
                } else if let Ok(queued) = self.pending.get_mut(relevant.event.path()) {
                    // the stored kind stays, only recency moves
                    queued.touch(sequence);
                }
                Absorbed::Coalesced
            }
            EventComparison::NewMakesOldObsolete => {
                if relevant.staged {
                    if let Some(slot) = self.staged.as_mut() {
                        slot.obsolete = true;
                    }
                } else {
                    self.remove_pending(relevant.event.path());
                }
                self.insert(event)
            }
            EventComparison::NewObsolete => Absorbed::Dropped,
            EventComparison::Inconsistent => Absorbed::Inconsistent,
            EventComparison::Different => {
                error!(
                    "{} was matched against unrelated {}, this is a bug",
                    event, relevant.event
                );
                Absorbed::Inconsistent
            }
        }
    }

    /// The staged event if related and still live, otherwise the pending
    /// event at the path or at its nearest ancestor.
    fn relevant_for(&self, event: &ChangeEvent) -> Option<Relevant> {
        if let Some(slot) = &self.staged {
            if !slot.obsolete && related(slot.queued.event(), event) {
                return Some(Relevant {
                    event: slot.queued.event().clone(),
                    staged: true,
                });
            }
        }

        let mut candidate = Some(event.path());
        while let Some(path) = candidate {
            if let Ok(queued) = self.pending.get(path) {
                return Some(Relevant {
                    event: queued.event().clone(),
                    staged: false,
                });
            }
            candidate = path::parent(path);
        }
        None
    }

    fn insert(&mut self, event: ChangeEvent) -> Absorbed {
        let path = event.path().to_string();
        let queued = QueuedChange {
            event,
            queued_at: Instant::now(),
            sequence: self.next_sequence(),
        };

        match self.pending.set(&path, queued) {
            Ok(()) => Absorbed::Stored,
            Err(error) => {
                warn!("Cannot queue a change at '{}': {}", path, error);
                Absorbed::Inconsistent
            }
        }
    }

    /// Removes the node at `path` along with directories that only existed
    /// to route to it.
    fn remove_pending(&mut self, path: &str) {
        if self.pending.remove(path).is_err() {
            return;
        }

        let mut parent = path::parent(path);
        while let Some(directory) = parent {
            let empty = self
                .pending
                .list(directory)
                .map(|mut children| children.next().is_none())
                .unwrap_or(false);
            if !empty || self.pending.remove(directory).is_err() {
                break;
            }
            parent = path::parent(directory);
        }
    }

    fn clear(&mut self) {
        self.pending = PathTree::with_root_as_file();
        if let Some(slot) = self.staged.as_mut() {
            slot.obsolete = true;
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

#[derive(Debug, Snafu)]
pub enum QueueError {
    #[snafu(display("Cannot stage {}, {} is already staged", event, staged))]
    AlreadyStaged {
        event: ChangeEvent,
        staged: ChangeEvent,
    },
    #[snafu(display("Cannot stage {}, it is not pending", event))]
    NotPending { event: ChangeEvent },
    #[snafu(display("Cannot inspect pending changes while {} is staged", staged))]
    StagingInProgress { staged: ChangeEvent },
}
