//! Consumer: bounded channel → transform → results store.

use log::{debug, warn};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::backend::{BlobStore, ImageTransform, new_blob_id};
use crate::error::{ChannelError, StageError, WorkerError};
use crate::runtime::{BoundedChannel, CancelSignal, Worker};
use crate::types::{ItemCompleted, OriginalImage};

use super::Notifier;

pub struct Consumer {
    name: String,
    channel: Arc<BoundedChannel<OriginalImage>>,
    results: Arc<dyn BlobStore>,
    transform: Arc<dyn ImageTransform>,
    notifier: Notifier,
    take_timeout: Duration,
}

impl Consumer {
    pub fn new(
        name: impl Into<String>,
        channel: Arc<BoundedChannel<OriginalImage>>,
        results: Arc<dyn BlobStore>,
        transform: Arc<dyn ImageTransform>,
        notifier: Notifier,
        take_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            channel,
            results,
            transform,
            notifier,
            take_timeout,
        }
    }

    fn process(&self, image: OriginalImage) -> Result<(), StageError> {
        let output = self.transform.apply(&image.bytes)?;
        let result_file = new_blob_id(&image.file_name);
        self.results
            .upload(&result_file, &image.content_type, &output)?;
        self.notifier.notify(ItemCompleted {
            keyword: image.keyword,
            source_file: image.file_name,
            result_file,
            worker: self.name.clone(),
            at: SystemTime::now(),
        });
        Ok(())
    }
}

impl Worker for Consumer {
    fn name(&self) -> &str {
        &self.name
    }

    /// Take until cancelled or the channel ends. An item already taken is always finished,
    /// so a drain after `complete` loses nothing.
    fn run(&self, cancel: &CancelSignal) -> Result<(), WorkerError> {
        while !cancel.is_cancelled() {
            let image = match self.channel.try_take(self.take_timeout) {
                Ok(Some(image)) => image,
                Ok(None) => continue,
                Err(ChannelError::EndOfChannel) => {
                    debug!("[{}] channel ended", self.name);
                    return Ok(());
                }
                Err(e) => return Err(StageError::from(e).into()),
            };
            let file = image.file_name.clone();
            match self.process(image) {
                Ok(()) => {}
                Err(StageError::Fatal(e)) => return Err(WorkerError::Fatal(e)),
                Err(StageError::Transient(e)) => {
                    warn!("[{}] dropped {}: {}", self.name, file, e);
                }
            }
        }
        debug!("[{}] cancelled", self.name);
        Ok(())
    }
}
