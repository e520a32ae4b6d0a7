//! Application configuration constants.
//! Names, timeouts and worker counts in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived file names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    db_filename: String,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                db_filename: format!(".{pkg}.db"),
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Default SQLite database file (queues + blobs).
    pub fn db_filename(&self) -> &str {
        &self.db_filename
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Environment variable that overrides the database path.
    pub fn db_env_key(&self) -> String {
        format!("{}_DB", self.pkg_name.to_uppercase())
    }
}

// ---- Queue and container names ----

pub struct QueueNames;

impl QueueNames {
    /// Keywords posted by front-ends; consumed by searchers.
    pub const KEYWORDS: &'static str = "keywords";
    /// Requests for the producer/consumer role.
    pub const REQUESTS: &'static str = "multithread-worker-requests";
    /// Requests for the simple (single-threaded) role.
    pub const SIMPLE_REQUESTS: &'static str = "simple-worker-requests";
}

pub struct ContainerNames;

impl ContainerNames {
    pub const ORIGINALS: &'static str = "original-images";
    pub const RESULTS: &'static str = "result-images";
}

// ---- Queue behavior ----

pub struct QueueConsts;

impl QueueConsts {
    /// Deliveries beyond this count mark a message as poison.
    pub const POISON_THRESHOLD: u32 = 5;
    /// How long a received message stays hidden from other receivers.
    pub const VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
    /// Upper bound for one blocking receive.
    pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);
    /// Table poll interval for SQLite-backed receives.
    pub const SQLITE_POLL_INTERVAL: Duration = Duration::from_millis(100);
}

// ---- Stage loops ----

pub struct StageConsts;

impl StageConsts {
    /// Sleep after an empty receive.
    pub const IDLE_DELAY: Duration = Duration::from_secs(1);
    /// Consumer wait on the channel between cancellation checks.
    pub const TAKE_TIMEOUT: Duration = Duration::from_secs(1);
    /// Producer wait for channel space between cancellation checks.
    pub const ADD_TIMEOUT: Duration = Duration::from_secs(1);
    /// Images fetched per keyword.
    pub const SEARCH_LIMIT: usize = 5;
}

// ---- Supervision ----

pub struct SupervisorConsts;

impl SupervisorConsts {
    /// Fixed delay before relaunching a finished worker. No escalation.
    pub const RESTART_BACKOFF: Duration = Duration::from_secs(1);
    /// How long shutdown waits for consumers to empty the channel.
    pub const DRAIN_GRACE: Duration = Duration::from_secs(10);
    /// Poll interval while waiting for the channel to drain.
    pub const DRAIN_POLL: Duration = Duration::from_millis(50);
}

// ---- Worker counts ----

pub struct WorkerCounts;

impl WorkerCounts {
    pub const SEARCHERS: usize = 1;
    pub const PRODUCERS: usize = 1;
    pub const CONSUMERS: usize = 4;
    pub const SIMPLE_WORKERS: usize = 1;
}

/// Default producer → consumer channel capacity.
pub const CHANNEL_CAPACITY: usize = 100;
