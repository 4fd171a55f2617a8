/// Backend used when `QUEUE_BACKEND` is not set.
pub const DEFAULT_QUEUE_BACKEND: &str = "redis";

pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_REDIS_CONNECTION_TIMEOUT_MS: u64 = 10_000;

// apalis-redis polls every 30s by default, far too slow for interactive jobs
pub const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 100;

/// Separator between the namespace and the processor name.
pub const QUEUE_NAMESPACE_SEPARATOR: &str = ":";

/// Envelope version written into every job.
pub const JOB_ENVELOPE_VERSION: &str = "1.0";
