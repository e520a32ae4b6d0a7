//! Pipeline stages: queue-driven workers built on the shared poll loop.
//!
//! - [`searcher`]: keywords queue → image source → originals store → request queues.
//! - [`producer`]: request queue → originals store → bounded channel.
//! - [`consumer`]: bounded channel → transform → results store.
//! - [`simple`]: request queue → transform → results store, no channel.

pub mod consumer;
pub mod producer;
pub mod searcher;
pub mod simple;

pub use consumer::Consumer;
pub use producer::Producer;
pub use searcher::Searcher;
pub use simple::SimpleWorker;

use crossbeam_channel::Sender;
use log::{debug, warn};
use std::time::Duration;

use crate::backend::MessageQueue;
use crate::error::{StageError, WorkerError};
use crate::runtime::CancelSignal;
use crate::types::{ItemCompleted, PipelineConfig, QueueMessage};

/// Receive and poison-eviction settings shared by every queue-driven stage.
#[derive(Clone, Debug)]
pub struct PollSettings {
    pub poison_threshold: u32,
    pub receive_timeout: Duration,
    pub idle_delay: Duration,
}

impl From<&PipelineConfig> for PollSettings {
    fn from(c: &PipelineConfig) -> Self {
        Self {
            poison_threshold: c.poison_threshold,
            receive_timeout: c.receive_timeout,
            idle_delay: c.idle_delay,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Result of one [`poll_once`].
#[derive(Debug)]
pub enum Polled {
    Message(QueueMessage),
    /// Nothing to receive; the idle delay has already been slept.
    Idle,
    /// A poison message was received and deleted.
    Evicted,
}

/// How a stage finished with one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Work durably recorded; the message may be deleted.
    Done,
    /// Cancellation observed midway; the message is left for redelivery.
    Interrupted,
}

/// Receive one message, sleeping the idle delay when the queue is empty and deleting the
/// message unprocessed when it has been delivered more than `poison_threshold` times.
pub fn poll_once(
    worker: &str,
    queue: &dyn MessageQueue,
    settings: &PollSettings,
    cancel: &CancelSignal,
) -> Result<Polled, StageError> {
    let Some(msg) = queue.receive(settings.receive_timeout)? else {
        cancel.sleep(settings.idle_delay);
        return Ok(Polled::Idle);
    };
    if msg.is_poison(settings.poison_threshold) {
        warn!(
            "[{}] deleting poison message {} from {} after {} deliveries: '{}'",
            worker,
            msg.id,
            queue.name(),
            msg.delivery_count,
            msg.payload
        );
        queue.delete(&msg)?;
        return Ok(Polled::Evicted);
    }
    Ok(Polled::Message(msg))
}

/// Drive a queue-fed stage until `cancel` is raised.
///
/// Each received message goes to `handle`; it is deleted only after `handle` reports
/// [`Handled::Done`]. Transient failures are logged and the message is left to reappear
/// (so repeated failures end in poison eviction). Fatal failures end the run.
pub fn run_queue_loop<F>(
    worker: &str,
    queue: &dyn MessageQueue,
    settings: &PollSettings,
    cancel: &CancelSignal,
    mut handle: F,
) -> Result<(), WorkerError>
where
    F: FnMut(&QueueMessage) -> Result<Handled, StageError>,
{
    while !cancel.is_cancelled() {
        let msg = match poll_once(worker, queue, settings, cancel) {
            Ok(Polled::Message(msg)) => msg,
            Ok(Polled::Idle | Polled::Evicted) => continue,
            Err(StageError::Transient(e)) => {
                warn!("[{}] receive from {} failed: {}", worker, queue.name(), e);
                cancel.sleep(settings.idle_delay);
                continue;
            }
            Err(StageError::Fatal(e)) => return Err(WorkerError::Fatal(e)),
        };
        if cancel.is_cancelled() {
            break;
        }
        debug!("[{}] processing message {}", worker, msg.id);
        match handle(&msg) {
            Ok(Handled::Done) => {
                if let Err(e) = queue.delete(&msg) {
                    if e.is_fatal() {
                        return Err(e.into());
                    }
                    warn!("[{}] could not delete message {}: {}", worker, msg.id, e);
                }
            }
            Ok(Handled::Interrupted) => {
                debug!("[{}] interrupted; leaving message {} for redelivery", worker, msg.id)
            }
            Err(StageError::Transient(e)) => {
                warn!("[{}] message {} failed: {}", worker, msg.id, e);
            }
            Err(StageError::Fatal(e)) => return Err(WorkerError::Fatal(e)),
        }
    }
    debug!("[{}] cancelled", worker);
    Ok(())
}

/// Delivers [`ItemCompleted`] notifications to an optional listener. A listener that has gone
/// away is ignored.
#[derive(Clone, Debug, Default)]
pub struct Notifier {
    tx: Option<Sender<ItemCompleted>>,
}

impl Notifier {
    pub fn new(tx: Sender<ItemCompleted>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn notify(&self, item: ItemCompleted) {
        debug!(
            "[{}] completed {} -> {} ({})",
            item.worker, item.source_file, item.result_file, item.keyword
        );
        if let Some(tx) = &self.tx {
            let _ = tx.send(item);
        }
    }
}
