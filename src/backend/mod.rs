//! Collaborator interfaces the stages consume, plus in-process and SQLite implementations.
//!
//! Every implementation must be safe to share between threads: stages hold them as
//! `Arc<dyn MessageQueue>` / `Arc<dyn BlobStore>` and call them concurrently.

pub mod fs_source;
pub mod memory;
pub mod sqlite;

use std::path::Path;
use std::time::Duration;

use crate::error::BackendError;
use crate::types::{Blob, QueueMessage, SourceImage};

pub use fs_source::DirectorySource;
pub use memory::{MemoryQueue, MemoryStore};
pub use sqlite::{SqliteBackend, SqliteQueue, SqliteStore};

/// At-least-once message queue with receipt-handle deletes.
pub trait MessageQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Wait up to `timeout` for a visible message. A received message stays invisible to other
    /// receivers for the queue's visibility timeout and reappears unless deleted.
    fn receive(&self, timeout: Duration) -> Result<Option<QueueMessage>, BackendError>;

    /// Delete by receipt. Deleting an already-deleted message (or with a stale receipt) is a no-op.
    fn delete(&self, message: &QueueMessage) -> Result<(), BackendError>;

    fn send(&self, payload: &str) -> Result<(), BackendError>;

    /// Messages currently stored, visible or not.
    fn approximate_len(&self) -> Result<usize, BackendError>;
}

/// Object store keyed by blob id. Uploads overwrite.
pub trait BlobStore: Send + Sync {
    fn name(&self) -> &str;
    fn download(&self, id: &str) -> Result<Blob, BackendError>;
    fn upload(&self, id: &str, content_type: &str, bytes: &[u8]) -> Result<(), BackendError>;
    fn list_ids(&self) -> Result<Vec<String>, BackendError>;
}

/// The image operation applied by processing stages. Must be pure.
pub trait ImageTransform: Send + Sync {
    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, BackendError>;
}

impl<F> ImageTransform for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>, BackendError> + Send + Sync,
{
    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, BackendError> {
        self(bytes)
    }
}

/// Copies the input unchanged. Stand-in when no image transform is plugged in.
#[derive(Clone, Copy, Debug, Default)]
pub struct Passthrough;

impl ImageTransform for Passthrough {
    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, BackendError> {
        Ok(bytes.to_vec())
    }
}

/// Finds candidate images for a keyword.
pub trait ImageSource: Send + Sync {
    fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SourceImage>, BackendError>;
}

/// Content type for an image file name, by extension.
pub fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        _ => None,
    }
}

/// Fresh blob id that keeps the extension of `file_name` (if any). Never reused, so a
/// redelivered message writes a duplicate result instead of clobbering one.
pub fn new_blob_id(file_name: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{id}.{ext}"),
        None => id,
    }
}
