//! Worker capability and the fault-isolation wrapper the supervisor runs it through.

use log::{error, warn};
use std::panic::{self, AssertUnwindSafe};

use crate::error::WorkerError;

use super::cancel::CancelSignal;

/// A long-lived, restartable unit of background work.
///
/// `start` runs once per supervised group before any `run`; `run` may be invoked many
/// times (once per restart) and should return promptly after `cancel` is raised.
pub trait Worker: Send + Sync {
    fn name(&self) -> &str;

    /// One-time setup. A failure here fails the whole supervised group.
    fn start(&self, cancel: &CancelSignal) -> Result<(), WorkerError> {
        let _ = cancel;
        Ok(())
    }

    fn run(&self, cancel: &CancelSignal) -> Result<(), WorkerError>;
}

/// How a protected run ended, when it did not end fatally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `run` returned `Ok`.
    Returned,
    /// `run` returned a non-fatal error or panicked; swallowed.
    Failed(String),
}

/// Run `worker` once. Fatal errors are returned; non-fatal errors and panics are logged and
/// reported as [`RunOutcome::Failed`] so the supervisor restarts the worker.
pub fn protected_run(worker: &dyn Worker, cancel: &CancelSignal) -> Result<RunOutcome, WorkerError> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| worker.run(cancel)));
    match result {
        Ok(Ok(())) => Ok(RunOutcome::Returned),
        Ok(Err(e)) if e.is_fatal() => {
            error!("[{}] {}", worker.name(), e);
            Err(e)
        }
        Ok(Err(e)) => {
            warn!("[{}] run failed: {:#}", worker.name(), e);
            Ok(RunOutcome::Failed(e.to_string()))
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            warn!("[{}] run panicked: {}", worker.name(), msg);
            Ok(RunOutcome::Failed(msg))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
