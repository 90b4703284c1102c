//! Drives a change queue against caller supplied handler code.

mod change_processor;
mod handler;

pub use change_processor::{ChangeProcessor, DEFAULT_RETRY_BACKOFF, ProcessError, ProcessOutcome};
pub use handler::{ChangeHandler, Commit, HandlerError, IoSnafu, UnavailableSnafu};
