//! Durable queues and blob containers in one SQLite database (WAL mode).
//!
//! One connection is shared behind a mutex by every queue and store handed out by a
//! [`SqliteBackend`]. Queue receives poll the table; blobs carry a blake3 hash that is
//! verified on download.

use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::BackendError;
use crate::types::{Blob, QueueMessage};
use crate::utils::config::QueueConsts;

use super::{BlobStore, MessageQueue};

/// WAL tuning pragmas. Use after `PRAGMA journal_mode = WAL`.
const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    payload TEXT NOT NULL,
    delivery_count INTEGER NOT NULL DEFAULT 0,
    visible_at_ms INTEGER NOT NULL,
    receipt TEXT
);
CREATE INDEX IF NOT EXISTS idx_messages_queue ON messages(queue, visible_at_ms);

CREATE TABLE IF NOT EXISTS blobs (
    container TEXT NOT NULL,
    id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    bytes BLOB NOT NULL,
    hash BLOB NOT NULL,
    PRIMARY KEY (container, id)
);
"#;

type SharedConn = Arc<Mutex<Connection>>;

fn lock(conn: &SharedConn) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// An open database from which queues and stores are handed out.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: SharedConn,
    visibility: Duration,
}

impl SqliteBackend {
    /// Open or create the database at `path`, enable WAL and apply the schema.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch(WAL_PRAGMAS)?;
        conn.execute_batch(SCHEMA)?;
        debug!("opened {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// In-memory database with the same schema (no WAL needed).
    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            visibility: QueueConsts::VISIBILITY_TIMEOUT,
        }
    }

    /// Visibility timeout applied by queues created after this call.
    pub fn with_visibility(mut self, visibility: Duration) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn queue(&self, name: &str) -> SqliteQueue {
        SqliteQueue {
            conn: Arc::clone(&self.conn),
            name: name.to_string(),
            visibility: self.visibility,
        }
    }

    pub fn store(&self, container: &str) -> SqliteStore {
        SqliteStore {
            conn: Arc::clone(&self.conn),
            container: container.to_string(),
        }
    }
}

pub struct SqliteQueue {
    conn: SharedConn,
    name: String,
    visibility: Duration,
}

impl SqliteQueue {
    /// Claim the oldest visible message, if any, in one transaction.
    fn try_claim(&self) -> Result<Option<QueueMessage>, BackendError> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        let now = now_ms();
        let row = tx
            .query_row(
                "SELECT id, payload, delivery_count FROM messages
                 WHERE queue = ?1 AND visible_at_ms <= ?2 ORDER BY id LIMIT 1",
                params![self.name, now],
                |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?)),
            )
            .optional()?;
        let Some((id, payload, count)) = row else {
            return Ok(None);
        };
        let receipt = uuid::Uuid::new_v4().simple().to_string();
        let delivery_count = count + 1;
        tx.execute(
            "UPDATE messages SET delivery_count = ?1, visible_at_ms = ?2, receipt = ?3 WHERE id = ?4",
            params![
                delivery_count,
                now + self.visibility.as_millis() as i64,
                receipt,
                id
            ],
        )?;
        tx.commit()?;
        Ok(Some(QueueMessage {
            id: id.to_string(),
            receipt,
            payload,
            delivery_count: delivery_count.clamp(0, u32::MAX as i64) as u32,
        }))
    }
}

impl MessageQueue for SqliteQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn receive(&self, timeout: Duration) -> Result<Option<QueueMessage>, BackendError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(msg) = self.try_claim()? {
                return Ok(Some(msg));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(QueueConsts::SQLITE_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn delete(&self, message: &QueueMessage) -> Result<(), BackendError> {
        let Ok(id) = message.id.parse::<i64>() else {
            debug!("[{}] delete of {} was a no-op", self.name, message.id);
            return Ok(());
        };
        let deleted = lock(&self.conn).execute(
            "DELETE FROM messages WHERE id = ?1 AND queue = ?2 AND receipt = ?3",
            params![id, self.name, message.receipt],
        )?;
        if deleted == 0 {
            debug!("[{}] delete of {} was a no-op", self.name, message.id);
        }
        Ok(())
    }

    fn send(&self, payload: &str) -> Result<(), BackendError> {
        lock(&self.conn).execute(
            "INSERT INTO messages (queue, payload, delivery_count, visible_at_ms) VALUES (?1, ?2, 0, ?3)",
            params![self.name, payload, now_ms()],
        )?;
        Ok(())
    }

    fn approximate_len(&self) -> Result<usize, BackendError> {
        let n: i64 = lock(&self.conn).query_row(
            "SELECT COUNT(*) FROM messages WHERE queue = ?1",
            [&self.name],
            |r| r.get(0),
        )?;
        Ok(n.max(0) as usize)
    }
}

pub struct SqliteStore {
    conn: SharedConn,
    container: String,
}

impl BlobStore for SqliteStore {
    fn name(&self) -> &str {
        &self.container
    }

    fn download(&self, id: &str) -> Result<Blob, BackendError> {
        let row = lock(&self.conn)
            .query_row(
                "SELECT content_type, bytes, hash FROM blobs WHERE container = ?1 AND id = ?2",
                params![self.container, id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, Vec<u8>>(1)?,
                        r.get::<_, Vec<u8>>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((content_type, bytes, hash)) = row else {
            return Err(BackendError::NotFound(format!("{}/{}", self.container, id)));
        };
        if blake3::hash(&bytes).as_bytes().as_slice() != hash.as_slice() {
            return Err(BackendError::Corrupt(format!("{}/{}", self.container, id)));
        }
        Ok(Blob {
            content_type,
            bytes,
        })
    }

    fn upload(&self, id: &str, content_type: &str, bytes: &[u8]) -> Result<(), BackendError> {
        let hash = blake3::hash(bytes);
        lock(&self.conn).execute(
            "INSERT OR REPLACE INTO blobs (container, id, content_type, bytes, hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.container,
                id,
                content_type,
                bytes,
                hash.as_bytes().as_slice()
            ],
        )?;
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>, BackendError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare("SELECT id FROM blobs WHERE container = ?1 ORDER BY id")?;
        let rows = stmt.query_map([&self.container], |r| r.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }
}
