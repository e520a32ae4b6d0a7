//! Pipeline assembly: shared backends and the two-supervisor start/stop sequence.

pub mod context;
pub mod orchestrator;

pub use context::Backends;
pub use orchestrator::Pipeline;
