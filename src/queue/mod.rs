//! The coalescing change queue and its stage/finish protocol.

mod path_change_queue;
mod queued_change;
mod staged_change;

pub use path_change_queue::{DEFAULT_GRACE_PERIOD, PathChangeQueue, QueueError};
pub use queued_change::QueuedChange;
pub use staged_change::StagedChange;
