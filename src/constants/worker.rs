use std::time::Duration;

// Default concurrency for the workers when a processor does not set one
pub const DEFAULT_WORKER_CONCURRENCY: usize = 2;

// Retries are left to the broker; zero means a failed job is not re-run
pub const DEFAULT_WORKER_RETRIES: usize = 0;

/// How long a single attempt may run before `on_stalled` is raised.
pub const DEFAULT_STALL_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound for draining in-flight jobs when a worker is closed.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(5000);
