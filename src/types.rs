//! Public types exchanged between stages, backends and callers.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// A message received from a [`MessageQueue`](crate::backend::MessageQueue).
///
/// `receipt` identifies this particular delivery; deleting with a stale receipt is a no-op.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub receipt: String,
    pub payload: String,
    /// How many times this message has been handed out, including this delivery.
    pub delivery_count: u32,
}

impl QueueMessage {
    /// True when the message was redelivered more often than `threshold` allows.
    pub fn is_poison(&self, threshold: u32) -> bool {
        self.delivery_count > threshold
    }
}

/// Unit exchanged through the request queues: a keyword and the files found for it.
///
/// File identifiers are kept in insertion order with duplicates dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub keyword: String,
    files: Vec<String>,
}

impl PipelineRequest {
    pub fn new<I, S>(keyword: impl Into<String>, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut request = Self {
            keyword: keyword.into(),
            files: Vec::new(),
        };
        for f in files {
            request.push(f);
        }
        request
    }

    /// Append `file` unless it is already referenced. Returns false for a duplicate.
    pub fn push(&mut self, file: impl Into<String>) -> bool {
        let file = file.into();
        if self.files.contains(&file) {
            return false;
        }
        self.files.push(file);
        true
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a request, re-applying the duplicate-free invariant to whatever was on the wire.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        let raw: PipelineRequest = serde_json::from_str(s)?;
        Ok(Self::new(raw.keyword, raw.files))
    }
}

/// Bytes plus content type, as held by a [`BlobStore`](crate::backend::BlobStore).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A candidate image returned by an [`ImageSource`](crate::backend::ImageSource).
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// An original image downloaded by a producer and handed to consumers through the channel.
#[derive(Clone, Debug)]
pub struct OriginalImage {
    pub keyword: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Notification emitted once per processed unit.
#[derive(Clone, Debug)]
pub struct ItemCompleted {
    pub keyword: String,
    pub source_file: String,
    pub result_file: String,
    /// Name of the worker that produced the result.
    pub worker: String,
    pub at: SystemTime,
}

/// Pipeline tuning: worker counts per role, channel capacity, timeouts, poison threshold.
///
/// `Default` comes from the constants in [`crate::utils::config`]. The CLI layers a
/// `.imgflow.toml` and then command-line flags over it.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Searcher workers (keywords queue → originals store → request queues). 0 disables searching.
    pub searchers: usize,
    /// Producer workers (request queue → channel).
    pub producers: usize,
    /// Consumer workers (channel → transform → results store).
    pub consumers: usize,
    /// Simple workers (simple request queue → transform → results store, no channel). 0 disables.
    pub simple_workers: usize,
    /// Capacity of the producer → consumer channel.
    pub channel_capacity: usize,
    /// Messages delivered more than this many times are deleted unprocessed.
    pub poison_threshold: u32,
    /// Delay before a finished or failed worker is relaunched.
    pub restart_backoff: Duration,
    /// How long one queue receive may block.
    pub receive_timeout: Duration,
    /// Sleep after an empty receive.
    pub idle_delay: Duration,
    /// How long a consumer waits on the channel before rechecking cancellation.
    pub take_timeout: Duration,
    /// How long a producer waits for channel space before rechecking cancellation.
    pub add_timeout: Duration,
    /// Upper bound on images fetched per keyword.
    pub search_limit: usize,
    /// How long `Pipeline::stop` lets consumers drain the channel.
    pub drain_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        use crate::utils::config::{
            CHANNEL_CAPACITY, QueueConsts, StageConsts, SupervisorConsts, WorkerCounts,
        };
        Self {
            searchers: WorkerCounts::SEARCHERS,
            producers: WorkerCounts::PRODUCERS,
            consumers: WorkerCounts::CONSUMERS,
            simple_workers: WorkerCounts::SIMPLE_WORKERS,
            channel_capacity: CHANNEL_CAPACITY,
            poison_threshold: QueueConsts::POISON_THRESHOLD,
            restart_backoff: SupervisorConsts::RESTART_BACKOFF,
            receive_timeout: QueueConsts::RECEIVE_TIMEOUT,
            idle_delay: StageConsts::IDLE_DELAY,
            take_timeout: StageConsts::TAKE_TIMEOUT,
            add_timeout: StageConsts::ADD_TIMEOUT,
            search_limit: StageConsts::SEARCH_LIMIT,
            drain_grace: SupervisorConsts::DRAIN_GRACE,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations that cannot run: no channel space, or a channel with only one side.
    pub fn validate(&self) -> crate::Result<()> {
        if self.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be at least 1");
        }
        if self.producers > 0 && self.consumers == 0 {
            anyhow::bail!("producers need at least one consumer to drain the channel");
        }
        if self.searchers + self.producers + self.consumers + self.simple_workers == 0 {
            anyhow::bail!("no workers configured");
        }
        if self.search_limit == 0 {
            anyhow::bail!("search_limit must be at least 1");
        }
        Ok(())
    }
}
