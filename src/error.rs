//! Typed errors for the library seams: channel, backends, workers, stages.

use thiserror::Error;

/// Errors returned by [`BoundedChannel`](crate::runtime::BoundedChannel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// `add` was called on (or the channel was completed while waiting in) a completed channel.
    #[error("channel is complete; no further items may be added")]
    InvalidState,
    /// The channel is complete and every buffered item has been taken.
    #[error("end of channel")]
    EndOfChannel,
}

/// Errors raised by queue, store, source and transform collaborators.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("blob {0} failed its integrity check")]
    Corrupt(String),
    #[error("transform failed: {0}")]
    Transform(String),
    #[error("backend misconfigured: {0}")]
    Misconfigured(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl BackendError {
    /// Misconfiguration cannot heal by retrying; everything else is treated as transient.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Misconfigured(_))
    }
}

/// Failure of a single message or item inside a stage loop.
#[derive(Debug, Error)]
pub enum StageError {
    /// Logged; the loop continues and the message is left for redelivery.
    #[error("transient: {0}")]
    Transient(String),
    /// Propagated out of `run`, bypassing restart.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<BackendError> for StageError {
    fn from(e: BackendError) -> Self {
        if e.is_fatal() {
            StageError::Fatal(e.to_string())
        } else {
            StageError::Transient(e.to_string())
        }
    }
}

impl From<ChannelError> for StageError {
    fn from(e: ChannelError) -> Self {
        // Adding to a completed channel is a programming error, not a runtime race.
        StageError::Fatal(e.to_string())
    }
}

impl From<serde_json::Error> for StageError {
    fn from(e: serde_json::Error) -> Self {
        StageError::Transient(format!("malformed message: {e}"))
    }
}

/// Outcome of a worker's `start` or `run` that is not a clean return.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Unrecoverable: aborts the supervised group.
    #[error("fatal worker error: {0}")]
    Fatal(String),
    /// Swallowed by the supervisor; the worker is restarted after the backoff.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl WorkerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, WorkerError::Fatal(_))
    }
}

impl From<StageError> for WorkerError {
    fn from(e: StageError) -> Self {
        match e {
            StageError::Fatal(msg) => WorkerError::Fatal(msg),
            StageError::Transient(msg) => WorkerError::Failed(anyhow::anyhow!(msg)),
        }
    }
}

impl From<BackendError> for WorkerError {
    fn from(e: BackendError) -> Self {
        StageError::from(e).into()
    }
}

/// Errors surfaced by [`Supervisor`](crate::runtime::Supervisor).
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A worker's `start` failed; no worker of the group was launched.
    #[error("worker {worker} failed to start: {source}")]
    Start {
        worker: String,
        #[source]
        source: WorkerError,
    },
    /// A worker's run ended with a fatal error; the group was shut down.
    #[error("worker {worker} failed fatally: {source}")]
    Fatal {
        worker: String,
        #[source]
        source: WorkerError,
    },
    #[error("could not spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("supervision thread panicked")]
    Panicked,
}
