//! Producer: request queue → originals store → bounded channel.

use log::debug;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{BlobStore, MessageQueue};
use crate::error::{BackendError, StageError, WorkerError};
use crate::runtime::{BoundedChannel, CancelSignal, TryAdd, Worker};
use crate::types::{OriginalImage, PipelineRequest, QueueMessage};

use super::{Handled, PollSettings, run_queue_loop};

pub struct Producer {
    name: String,
    requests: Arc<dyn MessageQueue>,
    originals: Arc<dyn BlobStore>,
    channel: Arc<BoundedChannel<OriginalImage>>,
    settings: PollSettings,
    add_timeout: Duration,
}

impl Producer {
    pub fn new(
        name: impl Into<String>,
        requests: Arc<dyn MessageQueue>,
        originals: Arc<dyn BlobStore>,
        channel: Arc<BoundedChannel<OriginalImage>>,
        settings: PollSettings,
        add_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            requests,
            originals,
            channel,
            settings,
            add_timeout,
        }
    }

    /// Download every file of the request in parallel; any failure fails the whole request
    /// before anything reaches the channel.
    fn download_all(&self, request: &PipelineRequest) -> Result<Vec<OriginalImage>, BackendError> {
        request
            .files()
            .par_iter()
            .map(|file| -> Result<OriginalImage, BackendError> {
                let blob = self.originals.download(file)?;
                Ok(OriginalImage {
                    keyword: request.keyword.clone(),
                    file_name: file.clone(),
                    content_type: blob.content_type,
                    bytes: blob.bytes,
                })
            })
            .collect()
    }

    /// Add `image`, waiting for space in `add_timeout` slices. Returns false if cancelled first.
    fn offer(&self, mut image: OriginalImage, cancel: &CancelSignal) -> Result<bool, StageError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            match self.channel.try_add(image, self.add_timeout)? {
                TryAdd::Added => return Ok(true),
                TryAdd::Full(back) => image = back,
            }
        }
    }

    fn process(&self, msg: &QueueMessage, cancel: &CancelSignal) -> Result<Handled, StageError> {
        let request = PipelineRequest::from_json(&msg.payload)?;
        let images = self.download_all(&request)?;
        if cancel.is_cancelled() {
            return Ok(Handled::Interrupted);
        }
        let count = images.len();
        for image in images {
            if !self.offer(image, cancel)? {
                return Ok(Handled::Interrupted);
            }
        }
        debug!(
            "[{}] '{}': {} images handed to consumers",
            self.name, request.keyword, count
        );
        Ok(Handled::Done)
    }
}

impl Worker for Producer {
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
