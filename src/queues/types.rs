//! Queue backend type definitions.
//!
//! - QueueBackendError: error types for queue operations
//! - QueueHealth: queue health status information

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection option key for the broker poll interval, in milliseconds.
pub const POLL_INTERVAL_OPTION: &str = "poll_interval_ms";

/// Errors that can occur during queue backend operations.
#[derive(Debug, Error, Serialize, Clone, PartialEq, Eq)]
pub enum QueueBackendError {
    /// Redis-specific error (from Apalis or the redis client)
    #[error("Redis error: {0}")]
    RedisError(String),

    /// The broker did not answer within the connection timeout
    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    /// Configuration error (unsupported backend, invalid options)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The queue no longer accepts jobs
    #[error("Queue closed: {0}")]
    QueueClosed(String),

    /// Worker initialization error
    #[error("Worker initialization error: {0}")]
    WorkerInitError(String),

    /// Worker did not stop cleanly
    #[error("Worker shutdown error: {0}")]
    WorkerShutdownError(String),
}

/// Queue health status information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHealth {
    /// Processor name the queue belongs to
    pub queue: String,
    /// Jobs waiting to be picked up
    pub pending_jobs: u64,
    /// Whether a worker is consuming this queue
    pub worker_running: bool,
    /// Backend type (redis or memory)
    pub backend: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_backend_error_messages() {
        let errors = vec![
            QueueBackendError::RedisError("test".to_string()),
            QueueBackendError::ConnectionTimeout("test".to_string()),
            QueueBackendError::ConfigError("test".to_string()),
            QueueBackendError::QueueClosed("test".to_string()),
            QueueBackendError::WorkerInitError("test".to_string()),
            QueueBackendError::WorkerShutdownError("test".to_string()),
        ];

        for error in errors {
            let error_str = error.to_string();
            assert!(error_str.ends_with(": test"), "{error_str}");
        }
    }
}
