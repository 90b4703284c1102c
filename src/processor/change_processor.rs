use std::time::Duration;

use compio::time::sleep;
use snafu::{ResultExt, Snafu};
use tracing::{debug, info};

use crate::changes::{ChangeEvent, ChangeKind};
use crate::path;
use crate::processor::{ChangeHandler, Commit, HandlerError};
use crate::queue::{PathChangeQueue, QueueError};

/// How long a failed step waits for invalidating pushes before it is judged.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(2500);

/// What [`ChangeProcessor::process_one`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing was pending
    Idle,
    /// The handler's mutation was applied
    Committed,
    /// A later event nullified the staged one, its result was dropped
    Obsolete,
}

/// Outcome of a handler call that has not been committed yet.
struct PreparedStep<H> {
    commit: Commit<H>,
    discovered: Vec<ChangeEvent>,
}

/// Drains a [`PathChangeQueue`] into a [`ChangeHandler`], one event at a time.
#[derive(Debug, Clone)]
pub struct ChangeProcessor {
    retry_backoff: Duration,
}

impl Default for ChangeProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BACKOFF)
    }
}

impl ChangeProcessor {
    pub fn new(retry_backoff: Duration) -> Self {
        Self { retry_backoff }
    }

    /// Stages the next event, runs the handler for it and resolves the result
    /// against whatever was pushed in the meantime.
    pub async fn process_one<H: ChangeHandler>(
        &self,
        queue: &PathChangeQueue,
        handler: &mut H,
    ) -> Result<ProcessOutcome, ProcessError> {
        let Some(staged) = queue.stage_next().context(QueueMisuseSnafu)? else {
            return Ok(ProcessOutcome::Idle);
        };
        let event = staged.event().clone();

        loop {
            let step = Self::prepare(handler, &event).await;
            if let Err(error) = &step {
                debug!(
                    "Handling {} failed: {}. Waiting {:?} before judging the failure",
                    event, error, self.retry_backoff
                );
                sleep(self.retry_backoff).await;
            }

            if staged.was_changed() {
                debug!("{} changed while being processed, processing again", event);
                continue;
            }

            if staged.is_obsolete() {
                staged.finish();
                debug!("{} became obsolete while being processed", event);
                return Ok(ProcessOutcome::Obsolete);
            }

            staged.finish();
            let step = step.context(HandlingFailedSnafu {
                event: event.clone(),
            })?;

            (step.commit)(handler);
            for discovered in step.discovered {
                queue.push(discovered);
            }
            debug!("Committed {}", event);
            return Ok(ProcessOutcome::Committed);
        }
    }

    /// Processes events until the queue is empty or a step fails.
    /// Returns how many events were staged.
    pub async fn process_all<H: ChangeHandler>(
        &self,
        queue: &PathChangeQueue,
        handler: &mut H,
    ) -> Result<usize, ProcessError> {
        let mut processed = 0;
        while queue.has_pending().context(QueueMisuseSnafu)? {
            if self.process_one(queue, handler).await? == ProcessOutcome::Idle {
                break;
            }
            processed += 1;
        }

        info!("Processed {} changes", processed);
        Ok(processed)
    }

    async fn prepare<H: ChangeHandler>(
        handler: &mut H,
        event: &ChangeEvent,
    ) -> Result<PreparedStep<H>, HandlerError> {
        let path = event.path();
        let commit = match event.kind() {
            ChangeKind::Add => handler.on_file_added(path).await?,
            ChangeKind::Change => handler.on_file_changed(path).await?,
            ChangeKind::Unlink => handler.on_file_removed(path).await?,
            ChangeKind::UnlinkDir => handler.on_folder_removed(path).await?,
            ChangeKind::AddDir => {
                let commit = handler.on_folder_added(path).await?;
                let discovered = Self::enumerate(handler, path).await?;
                return Ok(PreparedStep { commit, discovered });
            }
        };

        Ok(PreparedStep {
            commit,
            discovered: Vec::new(),
        })
    }

    /// One `Add` or `AddDir` per entry of the folder at `path`.
    async fn enumerate<H: ChangeHandler>(
        handler: &mut H,
        path: &str,
    ) -> Result<Vec<ChangeEvent>, HandlerError> {
        let mut discovered = Vec::new();
        for name in handler.list(path).await? {
            let child = path::join(path, &name);
            let event = if handler.is_dir(&child).await? {
                ChangeEvent::add_dir(child)
            } else {
                ChangeEvent::add(child)
            };
            discovered.push(event);
        }
        Ok(discovered)
    }
}

#[derive(Debug, Snafu)]
pub enum ProcessError {
    #[snafu(display("Failed to process {}", event))]
    HandlingFailed {
        event: ChangeEvent,
        source: HandlerError,
    },
    #[snafu(display("The change queue was used out of order"))]
    QueueMisuse { source: QueueError },
}

impl ProcessError {
    /// The event that failed. It is no longer queued; push it again to retry.
    pub fn event(&self) -> Option<&ChangeEvent> {
        match self {
            ProcessError::HandlingFailed { event, .. } => Some(event),
            ProcessError::QueueMisuse { .. } => None,
        }
    }
}
