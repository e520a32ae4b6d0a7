use imgflow::runtime::{CancelSignal, RunOutcome, Supervisor, Worker, protected_run};
use imgflow::{SupervisorError, WorkerError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const BACKOFF: Duration = Duration::from_millis(20);

/// Poll `cond` until it holds or `limit` passes.
fn eventually(limit: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Blocks until cancelled.
struct Idle {
    name: String,
    runs: AtomicUsize,
}

impl Idle {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            runs: AtomicUsize::new(0),
        })
    }
}

impl Worker for Idle {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, cancel: &CancelSignal) -> Result<(), WorkerError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        while !cancel.sleep(Duration::from_secs(5)) {}
        Ok(())
    }
}

/// Fails the first `failures` runs (errors or panics), then idles.
struct Flaky {
    runs: AtomicUsize,
    failures: usize,
    panic: bool,
}

impl Worker for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn run(&self, cancel: &CancelSignal) -> Result<(), WorkerError> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            if self.panic {
                panic!("run {n} blew up");
            }
            return Err(anyhow::anyhow!("run {n} failed").into());
        }
        while !cancel.sleep(Duration::from_secs(5)) {}
        Ok(())
    }
}

struct Fatal;

impl Worker for Fatal {
    fn name(&self) -> &str {
        "fatal"
    }

    fn run(&self, _cancel: &CancelSignal) -> Result<(), WorkerError> {
        thread::sleep(Duration::from_millis(20));
        Err(WorkerError::Fatal("bad configuration".to_string()))
    }
}

struct BadStart;

impl Worker for BadStart {
    fn name(&self) -> &str {
        "bad-start"
    }

    fn start(&self, _cancel: &CancelSignal) -> Result<(), WorkerError> {
        Err(WorkerError::Fatal("no queue".to_string()))
    }

    fn run(&self, _cancel: &CancelSignal) -> Result<(), WorkerError> {
        Ok(())
    }
}

// --- protected_run ---

#[test]
fn test_protected_run_swallows_panic() {
    let w = Flaky {
        runs: AtomicUsize::new(0),
        failures: 1,
        panic: true,
    };
    let out = protected_run(&w, &CancelSignal::new()).unwrap();
    assert!(matches!(out, RunOutcome::Failed(msg) if msg.contains("blew up")));
}

#[test]
fn test_protected_run_returns_fatal() {
    let err = protected_run(&Fatal, &CancelSignal::new()).unwrap_err();
    assert!(err.is_fatal());
}

// --- restart ---

#[test]
fn test_failed_worker_is_restarted() {
    let flaky = Arc::new(Flaky {
        runs: AtomicUsize::new(0),
        failures: 2,
        panic: false,
    });
    let sup = Supervisor::start("flaky", vec![flaky.clone() as Arc<dyn Worker>], BACKOFF).unwrap();
    assert!(eventually(Duration::from_secs(5), || {
        flaky.runs.load(Ordering::SeqCst) >= 3
    }));
    assert!(eventually(Duration::from_secs(5), || sup.restart_count() == 2));
    assert_eq!(sup.active_count(), 1);
    sup.stop().unwrap();
    assert_eq!(sup.active_count(), 0);
}

#[test]
fn test_panicking_worker_is_restarted() {
    let flaky = Arc::new(Flaky {
        runs: AtomicUsize::new(0),
        failures: 1,
        panic: true,
    });
    let sup = Supervisor::start("panicky", vec![flaky.clone() as Arc<dyn Worker>], BACKOFF).unwrap();
    assert!(eventually(Duration::from_secs(5), || {
        flaky.runs.load(Ordering::SeqCst) >= 2
    }));
    assert!(eventually(Duration::from_secs(5), || sup.active_count() == 1));
    sup.stop().unwrap();
}

#[test]
fn test_restart_waits_for_backoff() {
    let flaky = Arc::new(Flaky {
        runs: AtomicUsize::new(0),
        failures: 1,
        panic: false,
    });
    let sup = Supervisor::start(
        "slow-backoff",
        vec![flaky.clone() as Arc<dyn Worker>],
        Duration::from_millis(300),
    )
    .unwrap();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(flaky.runs.load(Ordering::SeqCst), 1);
    assert!(eventually(Duration::from_secs(5), || {
        flaky.runs.load(Ordering::SeqCst) == 2
    }));
    sup.stop().unwrap();
}

// --- start ---

#[test]
fn test_start_failure_launches_nothing() {
    let idle = Idle::new("idle");
    let err = Supervisor::start(
        "mixed",
        vec![idle.clone() as Arc<dyn Worker>, Arc::new(BadStart)],
        BACKOFF,
    )
    .err()
    .unwrap();
    assert!(matches!(err, SupervisorError::Start { ref worker, .. } if worker == "bad-start"));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(idle.runs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_all_workers_launched_on_start() {
    let workers: Vec<_> = (0..3).map(|i| Idle::new(&format!("idle-{i}"))).collect();
    let sup = Supervisor::start(
        "idle",
        workers.iter().map(|w| w.clone() as Arc<dyn Worker>).collect(),
        BACKOFF,
    )
    .unwrap();
    assert_eq!(sup.active_count(), 3);
    sup.stop().unwrap();
    for w in &workers {
        assert_eq!(w.runs.load(Ordering::SeqCst), 1);
    }
}

// --- shutdown ---

#[test]
fn test_stop_waits_for_every_run() {
    let sup = Supervisor::start(
        "stoppable",
        vec![Idle::new("a") as Arc<dyn Worker>, Idle::new("b")],
        BACKOFF,
    )
    .unwrap();
    let start = Instant::now();
    sup.stop().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(sup.active_count(), 0);
    assert!(sup.is_finished());
    assert_eq!(sup.restart_count(), 0);
    sup.stop().unwrap();
}

#[test]
fn test_fatal_error_ends_supervision() {
    let idle = Idle::new("bystander");
    let sup = Supervisor::start(
        "fatal",
        vec![Arc::new(Fatal) as Arc<dyn Worker>, idle.clone()],
        BACKOFF,
    )
    .unwrap();
    let err = sup.wait().unwrap_err();
    assert!(matches!(err, SupervisorError::Fatal { ref worker, .. } if worker == "fatal"));
    assert!(sup.cancel_signal().is_cancelled());
    assert_eq!(sup.active_count(), 0);
    assert_eq!(idle.runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fatal_error_raises_linked_signals() {
    let sibling = CancelSignal::new();
    let sup = Supervisor::start_linked(
        "fatal",
        vec![Arc::new(Fatal) as Arc<dyn Worker>],
        BACKOFF,
        CancelSignal::new(),
        vec![sibling.clone()],
    )
    .unwrap();
    assert!(sup.wait().is_err());
    assert!(sibling.is_cancelled());
}

#[test]
fn test_stop_leaves_linked_signals_alone() {
    let sibling = CancelSignal::new();
    let idle = Idle::new("idle");
    let sup = Supervisor::start_linked(
        "quiet",
        vec![idle as Arc<dyn Worker>],
        BACKOFF,
        CancelSignal::new(),
        vec![sibling.clone()],
    )
    .unwrap();
    sup.stop().unwrap();
    assert!(!sibling.is_cancelled());
}

#[test]
fn test_drop_stops_running_group() {
    let cancel = CancelSignal::new();
    let idle = Idle::new("idle");
    let sup = Supervisor::start_with_signal(
        "dropped",
        vec![idle.clone() as Arc<dyn Worker>],
        BACKOFF,
        cancel.clone(),
    )
    .unwrap();
    assert_eq!(sup.active_count(), 1);
    drop(sup);
    assert!(cancel.is_cancelled());
    assert_eq!(idle.runs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancel_signal_sleep_wakes_early() {
    let cancel = CancelSignal::new();
    let c = cancel.clone();
    let sleeper = thread::spawn(move || c.sleep(Duration::from_secs(10)));
    thread::sleep(Duration::from_millis(30));
    cancel.cancel();
    assert!(sleeper.join().unwrap());
    assert!(!CancelSignal::new().sleep(Duration::from_millis(1)));
}
