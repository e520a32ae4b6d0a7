//! Simple worker: handles a whole request on one thread, without the channel.

use std::sync::Arc;
use std::time::SystemTime;

use crate::backend::{BlobStore, ImageTransform, MessageQueue, new_blob_id};
use crate::error::{StageError, WorkerError};
use crate::runtime::{CancelSignal, Worker};
use crate::types::{ItemCompleted, PipelineRequest, QueueMessage};

use super::{Handled, Notifier, PollSettings, run_queue_loop};

pub struct SimpleWorker {
    name: String,
    requests: Arc<dyn MessageQueue>,
    originals: Arc<dyn BlobStore>,
    results: Arc<dyn BlobStore>,
    transform: Arc<dyn ImageTransform>,
    notifier: Notifier,
    settings: PollSettings,
}

impl SimpleWorker {
    pub fn new(
        name: impl Into<String>,
        requests: Arc<dyn MessageQueue>,
        originals: Arc<dyn BlobStore>,
        results: Arc<dyn BlobStore>,
        transform: Arc<dyn ImageTransform>,
        notifier: Notifier,
        settings: PollSettings,
    ) -> Self {
        Self {
            name: name.into(),
            requests,
            originals,
            results,
            transform,
            notifier,
            settings,
        }
    }

    fn process(&self, msg: &QueueMessage, cancel: &CancelSignal) -> Result<Handled, StageError> {
        let request = PipelineRequest::from_json(&msg.payload)?;
        for file in request.files() {
            if cancel.is_cancelled() {
                return Ok(Handled::Interrupted);
            }
            let blob = self.originals.download(file)?;
            let output = self.transform.apply(&blob.bytes)?;
            let result_file = new_blob_id(file);
            self.results
                .upload(&result_file, &blob.content_type, &output)?;
            self.notifier.notify(ItemCompleted {
                keyword: request.keyword.clone(),
                source_file: file.clone(),
                result_file,
                worker: self.name.clone(),
                at: SystemTime::now(),
            });
        }
        Ok(Handled::Done)
    }
}

impl Worker for SimpleWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, cancel: &CancelSignal) -> Result<(), WorkerError> {
        run_queue_loop(
            &self.name,
            self.requests.as_ref(),
            &self.settings,
            cancel,
            |msg| self.process(msg, cancel),
        )
    }
}
