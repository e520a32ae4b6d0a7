//! Keeps a fixed set of workers alive: start all, restart whichever finishes, stop all.
//!
//! Each run of a worker gets its own thread. Runs report on a shared completion channel,
//! which gives the supervision loop its wait-for-first primitive; `stop` raises the cancel
//! signal and joins the supervision thread, which in turn joins every run (wait-for-all).

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{SupervisorError, WorkerError};

use super::cancel::CancelSignal;
use super::worker::{RunOutcome, Worker, protected_run};

/// (worker index, how its run ended)
type Completion = (usize, Result<RunOutcome, WorkerError>);

/// Handle to a running group of supervised workers.
pub struct Supervisor {
    name: String,
    cancel: CancelSignal,
    active: Arc<AtomicUsize>,
    restarts: Arc<AtomicUsize>,
    handle: Mutex<Option<JoinHandle<Result<(), SupervisorError>>>>,
}

/// State owned by the supervision thread.
struct SupervisionLoop {
    group: String,
    workers: Vec<Arc<dyn Worker>>,
    cancel: CancelSignal,
    /// Raised together with `cancel` when a run fails fatally.
    linked: Vec<CancelSignal>,
    backoff: Duration,
    active: Arc<AtomicUsize>,
    restarts: Arc<AtomicUsize>,
    done_tx: Sender<Completion>,
    done_rx: Receiver<Completion>,
    running: HashMap<usize, JoinHandle<()>>,
}

impl Supervisor {
    /// Start `workers` under a fresh cancel signal. See [`start_with_signal`](Self::start_with_signal).
    pub fn start(
        name: impl Into<String>,
        workers: Vec<Arc<dyn Worker>>,
        backoff: Duration,
    ) -> Result<Self, SupervisorError> {
        Self::start_with_signal(name, workers, backoff, CancelSignal::new())
    }

    /// Call `start` on every worker (fail-fast), then launch one protected run per worker and
    /// hand them to the supervision thread. Returns once every run has been launched.
    pub fn start_with_signal(
        name: impl Into<String>,
        workers: Vec<Arc<dyn Worker>>,
        backoff: Duration,
        cancel: CancelSignal,
    ) -> Result<Self, SupervisorError> {
        Self::start_linked(name, workers, backoff, cancel, Vec::new())
    }

    /// Like [`start_with_signal`](Self::start_with_signal), and a fatal error in this group also
    /// raises every signal in `linked` (e.g. the signal of a sibling group).
    pub fn start_linked(
        name: impl Into<String>,
        workers: Vec<Arc<dyn Worker>>,
        backoff: Duration,
        cancel: CancelSignal,
        linked: Vec<CancelSignal>,
    ) -> Result<Self, SupervisorError> {
        let name = name.into();
        for worker in &workers {
            worker
                .start(&cancel)
                .map_err(|source| SupervisorError::Start {
                    worker: worker.name().to_string(),
                    source,
                })?;
        }
        debug!("[{}] {} workers initialized", name, workers.len());

        let (done_tx, done_rx) = unbounded();
        let active = Arc::new(AtomicUsize::new(0));
        let restarts = Arc::new(AtomicUsize::new(0));
        let mut sup = SupervisionLoop {
            group: name.clone(),
            workers,
            cancel: cancel.clone(),
            linked,
            backoff,
            active: Arc::clone(&active),
            restarts: Arc::clone(&restarts),
            done_tx,
            done_rx,
            running: HashMap::new(),
        };
        for index in 0..sup.workers.len() {
            if let Err(e) = sup.launch(index) {
                sup.abort();
                return Err(e.into());
            }
        }

        let spawned = thread::Builder::new()
            .name(format!("{name}-supervisor"))
            .spawn(move || {
                let result = sup.run();
                if let Err(e) = &result {
                    error!("[{}] supervision ended: {}", sup.group, e);
                }
                result
            });
        let handle = match spawned {
            Ok(h) => h,
            Err(e) => {
                // Runs already launched see the signal and exit on their own.
                cancel.cancel();
                return Err(e.into());
            }
        };
        info!("[{}] supervising {} workers", name, active.load(Ordering::SeqCst));

        Ok(Self {
            name,
            cancel,
            active,
            restarts,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker runs currently in flight.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of relaunches performed since start.
    pub fn restart_count(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }

    /// The signal shared with every worker of this group.
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// True once the supervision thread has exited (after `stop`, or after a fatal error).
    pub fn is_finished(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(|h| h.is_finished())
    }

    /// Raise the cancel signal and block until every worker run has returned.
    /// Returns the fatal error that ended supervision, if any. Later calls return `Ok(())`.
    pub fn stop(&self) -> Result<(), SupervisorError> {
        info!("[{}] stopping", self.name);
        self.cancel.cancel();
        self.join()
    }

    /// Block until supervision ends on its own (a fatal error or an external cancel).
    pub fn wait(&self) -> Result<(), SupervisorError> {
        self.join()
    }

    fn join(&self) -> Result<(), SupervisorError> {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(h) => h.join().map_err(|_| SupervisorError::Panicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if !self.is_finished() {
            if let Err(e) = self.stop() {
                warn!("[{}] shutdown on drop: {}", self.name, e);
            }
        }
    }
}

impl SupervisionLoop {
    fn launch(&mut self, index: usize) -> std::io::Result<()> {
        let worker = Arc::clone(&self.workers[index]);
        let cancel = self.cancel.clone();
        let done_tx = self.done_tx.clone();
        self.active.fetch_add(1, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name(worker.name().to_string())
            .spawn(move || {
                let outcome = protected_run(worker.as_ref(), &cancel);
                let _ = done_tx.send((index, outcome));
            });
        match spawned {
            Ok(handle) => {
                self.running.insert(index, handle);
                Ok(())
            }
            Err(e) => {
                self.active.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Wait for the next run to finish; returns `None` once nothing is running.
    fn next_completion(&mut self) -> Option<Completion> {
        if self.running.is_empty() {
            return None;
        }
        let completion = self.done_rx.recv().ok()?;
        if let Some(handle) = self.running.remove(&completion.0) {
            let _ = handle.join();
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        Some(completion)
    }

    fn run(&mut self) -> Result<(), SupervisorError> {
        let mut fatal: Option<SupervisorError> = None;
        while let Some((index, outcome)) = self.next_completion() {
            let worker = self.workers[index].name().to_string();
            match outcome {
                Err(source) => {
                    error!("[{}] {} failed fatally; shutting down group", self.group, worker);
                    self.cancel.cancel();
                    for signal in &self.linked {
                        signal.cancel();
                    }
                    fatal.get_or_insert(SupervisorError::Fatal { worker, source });
                    continue;
                }
                Ok(RunOutcome::Returned) => debug!("[{}] {} returned", self.group, worker),
                Ok(RunOutcome::Failed(msg)) => debug!("[{}] {} failed: {}", self.group, worker, msg),
            }
            if self.cancel.is_cancelled() || self.cancel.sleep(self.backoff) {
                continue;
            }
            info!("[{}] restarting {}", self.group, worker);
            if let Err(e) = self.launch(index) {
                self.abort();
                return Err(e.into());
            }
            self.restarts.fetch_add(1, Ordering::SeqCst);
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Cancel and join every run still in flight.
    fn abort(&mut self) {
        self.cancel.cancel();
        while self.next_completion().is_some() {}
    }
}
