//! imgflow: keyword-driven image pipeline with supervised worker pools.
//!
//! Searchers turn keywords into stored originals and processing requests. Producers feed a
//! bounded channel that consumers drain through an image transform; simple workers do the
//! same job on one thread. Every role runs under a [`runtime::Supervisor`] that restarts
//! finished workers and stops them all on shutdown.

pub mod backend;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod runtime;
pub mod stages;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::{BackendError, ChannelError, StageError, SupervisorError, WorkerError};
pub use pipeline::{Backends, Pipeline};
pub use runtime::{BoundedChannel, CancelSignal, Supervisor, Worker};

/// Result alias used by the application layer (pipeline assembly, config, CLI).
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
