//! Searcher: turns keywords into stored originals and processing requests.

use log::{info, warn};
use std::sync::Arc;

use crate::backend::{BlobStore, ImageSource, MessageQueue, new_blob_id};
use crate::error::{StageError, WorkerError};
use crate::runtime::{CancelSignal, Worker};
use crate::types::{PipelineRequest, QueueMessage};

use super::{Handled, PollSettings, run_queue_loop};

pub struct Searcher {
    name: String,
    keywords: Arc<dyn MessageQueue>,
    source: Arc<dyn ImageSource>,
    originals: Arc<dyn BlobStore>,
    /// Every request is sent to each of these queues.
    targets: Vec<Arc<dyn MessageQueue>>,
    settings: PollSettings,
    search_limit: usize,
}

impl Searcher {
    pub fn new(
        name: impl Into<String>,
        keywords: Arc<dyn MessageQueue>,
        source: Arc<dyn ImageSource>,
        originals: Arc<dyn BlobStore>,
        targets: Vec<Arc<dyn MessageQueue>>,
        settings: PollSettings,
        search_limit: usize,
    ) -> Self {
        Self {
            name: name.into(),
            keywords,
            source,
            originals,
            targets,
            settings,
            search_limit,
        }
    }

    fn process(&self, msg: &QueueMessage, cancel: &CancelSignal) -> Result<Handled, StageError> {
        let keyword = msg.payload.trim();
        if keyword.is_empty() {
            return Err(StageError::Transient("blank keyword".to_string()));
        }
        let found = self.source.search(keyword, self.search_limit)?;
        if cancel.is_cancelled() {
            return Ok(Handled::Interrupted);
        }

        let mut request = PipelineRequest::new(keyword, Vec::<String>::new());
        for image in found {
            let id = new_blob_id(&image.name);
            match self
                .originals
                .upload(&id, &image.content_type, &image.bytes)
            {
                Ok(()) => {
                    request.push(id);
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!("[{}] could not store {}: {}", self.name, image.name, e),
            }
        }
        if request.is_empty() {
            info!("[{}] no images found for '{}'", self.name, keyword);
            return Ok(Handled::Done);
        }

        let json = request.to_json()?;
        for queue in &self.targets {
            queue.send(&json)?;
        }
        info!(
            "[{}] '{}': {} images queued to {} request queues",
            self.name,
            keyword,
            request.files().len(),
            self.targets.len()
        );
        Ok(Handled::Done)
    }
}

impl Worker for Searcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, _cancel: &CancelSignal) -> Result<(), WorkerError> {
        if self.targets.is_empty() {
            return Err(WorkerError::Fatal(format!(
                "{} has no request queue to send to",
                self.name
            )));
        }
        Ok(())
    }

    fn run(&self, cancel: &CancelSignal) -> Result<(), WorkerError> {
        run_queue_loop(
            &self.name,
            self.keywords.as_ref(),
            &self.settings,
            cancel,
            |msg| self.process(msg, cancel),
        )
    }
}
