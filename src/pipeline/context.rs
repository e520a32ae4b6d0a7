//! Collaborators shared by every stage of a pipeline.

use std::sync::Arc;

use crate::backend::{
    BlobStore, ImageSource, ImageTransform, MemoryQueue, MemoryStore, MessageQueue, Passthrough,
    SqliteBackend,
};
use crate::runtime::SequenceGenerator;
use crate::types::PipelineConfig;
use crate::utils::config::{ContainerNames, QueueNames};

/// Queues, stores, search provider and transform handed to [`Pipeline::start`](super::Pipeline::start).
#[derive(Clone)]
pub struct Backends {
    pub keywords: Arc<dyn MessageQueue>,
    /// Feeds producers.
    pub requests: Arc<dyn MessageQueue>,
    /// Feeds simple workers.
    pub simple_requests: Arc<dyn MessageQueue>,
    pub originals: Arc<dyn BlobStore>,
    pub results: Arc<dyn BlobStore>,
    pub source: Arc<dyn ImageSource>,
    pub transform: Arc<dyn ImageTransform>,
}

impl Backends {
    /// In-process queues (one shared id sequence) and stores, with the passthrough transform.
    pub fn in_memory(source: Arc<dyn ImageSource>) -> Self {
        let ids = Arc::new(SequenceGenerator::new());
        Self {
            keywords: Arc::new(MemoryQueue::with_ids(QueueNames::KEYWORDS, Arc::clone(&ids))),
            requests: Arc::new(MemoryQueue::with_ids(QueueNames::REQUESTS, Arc::clone(&ids))),
            simple_requests: Arc::new(MemoryQueue::with_ids(QueueNames::SIMPLE_REQUESTS, ids)),
            originals: Arc::new(MemoryStore::new(ContainerNames::ORIGINALS)),
            results: Arc::new(MemoryStore::new(ContainerNames::RESULTS)),
            source,
            transform: Arc::new(Passthrough),
        }
    }

    /// Queues and stores in one SQLite database, with the passthrough transform.
    pub fn sqlite(db: &SqliteBackend, source: Arc<dyn ImageSource>) -> Self {
        Self {
            keywords: Arc::new(db.queue(QueueNames::KEYWORDS)),
            requests: Arc::new(db.queue(QueueNames::REQUESTS)),
            simple_requests: Arc::new(db.queue(QueueNames::SIMPLE_REQUESTS)),
            originals: Arc::new(db.store(ContainerNames::ORIGINALS)),
            results: Arc::new(db.store(ContainerNames::RESULTS)),
            source,
            transform: Arc::new(Passthrough),
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn ImageTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Request queues the searchers fan out to: only roles that run in this pipeline.
    pub fn request_targets(&self, config: &PipelineConfig) -> Vec<Arc<dyn MessageQueue>> {
        let mut targets = Vec::new();
        if config.producers > 0 {
            targets.push(Arc::clone(&self.requests));
        }
        if config.simple_workers > 0 {
            targets.push(Arc::clone(&self.simple_requests));
        }
        targets
    }
}
