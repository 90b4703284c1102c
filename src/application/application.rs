use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::StreamExt;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::application::{RuntimeConfig, tree_report};
use crate::changes::ChangeEvent;
use crate::config::{MirrorConfig, MirrorConfigError};
use crate::ext::BestEffortPathExt;
use crate::mirror::DirectoryMirror;
use crate::processor::{ChangeHandler, ChangeProcessor, ProcessError};
use crate::queue::PathChangeQueue;

pub struct Application;

impl Application {
    pub async fn run(runtime_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let runtime_config: RuntimeConfig = runtime_config.into();
        let root = runtime_config.root.as_path();
        ensure!(
            root.is_dir(),
            RootNotDirectorySnafu {
                root: root.best_effort_path_display()
            }
        );

        let config = match runtime_config.config {
            Some(ref path) => MirrorConfig::from_path(path.clone()).await,
            None => MirrorConfig::read(root).await,
        }
        .context(ConfigSnafu)?;
        debug!("Loaded config: {:?}", config);

        let needs_rescan = Arc::new(AtomicBool::new(false));
        let queue = {
            let needs_rescan = needs_rescan.clone();
            PathChangeQueue::new(move || needs_rescan.store(true, Ordering::SeqCst))
                .with_grace_period(config.grace_period())
        };
        let processor = ChangeProcessor::new(config.retry_backoff());
        let mut mirror = DirectoryMirror::new(root, config.ignore().to_vec());
        let subscription = mirror.state_mut().on_change();

        info!("Mirroring {}", root.best_effort_path_display());
        let failed =
            Self::mirror_until_settled(&processor, &queue, &mut mirror, &needs_rescan).await?;

        mirror.state_mut().unsubscribe(subscription.id());
        let committed = subscription.collect::<Vec<_>>().await;
        info!(
            "Committed {} changes, {} failed",
            committed.len(),
            failed.len()
        );

        let colorize = supports_color::on(supports_color::Stream::Stdout).is_some();
        print!("{}", tree_report::render_changes(&committed, colorize));
        print!("{}", tree_report::render_tree(mirror.state(), colorize));
        if !failed.is_empty() {
            print!("{}", tree_report::render_failures(&failed, colorize));
        }

        Ok(())
    }

    /// Seeds the queue with the root and processes until nothing is pending
    /// and no reset asked for a rescan. Failed events are skipped and returned.
    async fn mirror_until_settled<H: ChangeHandler>(
        processor: &ChangeProcessor,
        queue: &PathChangeQueue,
        handler: &mut H,
        needs_rescan: &AtomicBool,
    ) -> Result<Vec<ChangeEvent>, ApplicationError> {
        queue.push(ChangeEvent::add_dir(""));
        let mut failed = Vec::new();
        loop {
            match processor.process_all(queue, handler).await {
                Ok(_) if needs_rescan.swap(false, Ordering::SeqCst) => {
                    info!("The change queue was reset, rescanning from the root");
                    queue.push(ChangeEvent::add_dir(""));
                }
                Ok(_) => return Ok(failed),
                Err(error) => {
                    let Some(event) = error.event().cloned() else {
                        return Err(error).context(ProcessingSnafu);
                    };
                    warn!("Skipping {}: {}", event, snafu::Report::from_error(&error));
                    failed.push(event);
                }
            }
        }
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("{} is not a directory", root))]
    RootNotDirectoryError { root: String },
    #[snafu(display("Critical failure encountered during configuration stage"))]
    ConfigError { source: MirrorConfigError },
    #[snafu(display("Critical failure encountered while processing changes"))]
    ProcessingError { source: ProcessError },
}
