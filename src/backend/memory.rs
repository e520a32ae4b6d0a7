//! In-process queue and blob store. Used by tests and by embedders that run every stage in
//! one process.

use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::BackendError;
use crate::runtime::SequenceGenerator;
use crate::types::{Blob, QueueMessage};
use crate::utils::config::QueueConsts;

use super::{BlobStore, MessageQueue};

struct Stored {
    id: String,
    payload: String,
    delivery_count: u32,
    visible_at: Instant,
    receipt: Option<String>,
}

/// Queue with visibility timeouts and delivery counts, modeled on hosted cloud queues.
pub struct MemoryQueue {
    name: String,
    visibility: Duration,
    ids: Arc<SequenceGenerator>,
    messages: Mutex<VecDeque<Stored>>,
    changed: Condvar,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_ids(name, Arc::new(SequenceGenerator::new()))
    }

    /// Queue drawing message ids from a generator shared with other queues.
    pub fn with_ids(name: impl Into<String>, ids: Arc<SequenceGenerator>) -> Self {
        Self {
            name: name.into(),
            visibility: QueueConsts::VISIBILITY_TIMEOUT,
            ids,
            messages: Mutex::new(VecDeque::new()),
            changed: Condvar::new(),
        }
    }

    /// How long a received message stays hidden before it is redelivered.
    pub fn with_visibility(mut self, visibility: Duration) -> Self {
        self.visibility = visibility;
        self
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Stored>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, messages: &mut VecDeque<Stored>, now: Instant) -> Option<QueueMessage> {
        let stored = messages.iter_mut().find(|m| m.visible_at <= now)?;
        let receipt = uuid::Uuid::new_v4().simple().to_string();
        stored.delivery_count += 1;
        stored.visible_at = now + self.visibility;
        stored.receipt = Some(receipt.clone());
        Some(QueueMessage {
            id: stored.id.clone(),
            receipt,
            payload: stored.payload.clone(),
            delivery_count: stored.delivery_count,
        })
    }
}

impl MessageQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive(&self, timeout: Duration) -> Result<Option<QueueMessage>, BackendError> {
        let deadline = Instant::now() + timeout;
        let mut messages = self.lock();
        loop {
            let now = Instant::now();
            if let Some(msg) = self.claim(&mut messages, now) {
                return Ok(Some(msg));
            }
            if now >= deadline {
                return Ok(None);
            }
            // Wake for a send, or when the next hidden message becomes visible again.
            let wake = messages
                .iter()
                .map(|m| m.visible_at)
                .min()
                .map_or(deadline, |t| t.min(deadline));
            messages = self
                .changed
                .wait_timeout(messages, wake.saturating_duration_since(now))
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn delete(&self, message: &QueueMessage) -> Result<(), BackendError> {
        let mut messages = self.lock();
        let pos = messages.iter().position(|m| {
            m.id == message.id && m.receipt.as_deref() == Some(message.receipt.as_str())
        });
        match pos {
            Some(i) => {
                messages.remove(i);
            }
            None => debug!("[{}] delete of {} was a no-op", self.name, message.id),
        }
        Ok(())
    }

    fn send(&self, payload: &str) -> Result<(), BackendError> {
        let mut messages = self.lock();
        messages.push_back(Stored {
            id: self.ids.next_id().to_string(),
            payload: payload.to_string(),
            delivery_count: 0,
            visible_at: Instant::now(),
            receipt: None,
        });
        self.changed.notify_all();
        Ok(())
    }

    fn approximate_len(&self) -> Result<usize, BackendError> {
        Ok(self.lock().len())
    }
}

/// Blob store backed by a map.
pub struct MemoryStore {
    name: String,
    blobs: Mutex<HashMap<String, Blob>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn download(&self, id: &str) -> Result<Blob, BackendError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("{}/{}", self.name, id)))
    }

    fn upload(&self, id: &str, content_type: &str, bytes: &[u8]) -> Result<(), BackendError> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.to_string(),
                Blob {
                    content_type: content_type.to_string(),
                    bytes: bytes.to_vec(),
                },
            );
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>, BackendError> {
        let mut ids: Vec<String> = self
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}
