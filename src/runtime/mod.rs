//! Generic concurrency infrastructure shared by every stage.

pub mod cancel;
pub mod channel;
pub mod sequence;
pub mod supervisor;
pub mod worker;

pub use cancel::CancelSignal;
pub use channel::{BoundedChannel, TryAdd};
pub use sequence::SequenceGenerator;
pub use supervisor::Supervisor;
pub use worker::{RunOutcome, Worker, protected_run};
