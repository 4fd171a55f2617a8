use std::{env, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
    constants::{
        DEFAULT_QUEUE_BACKEND, DEFAULT_QUEUE_POLL_INTERVAL_MS, DEFAULT_REDIS_CONNECTION_TIMEOUT_MS,
        DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_STALL_INTERVAL,
        DEFAULT_WORKER_CONCURRENCY, DEFAULT_WORKER_RETRIES,
    },
    queues::{QueueBackendError, POLL_INTERVAL_OPTION},
};

use super::ConnectionConfig;

/// Broker implementations the manager can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackendKind {
    Redis,
    Memory,
}

/// Worker settings after defaults have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub retries: usize,
    pub stall_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WORKER_CONCURRENCY,
            retries: DEFAULT_WORKER_RETRIES,
            stall_interval: DEFAULT_STALL_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Options a [`crate::QueueManager`] is constructed with.
#[derive(Debug, Clone, Default)]
pub struct QueueManagerOptions {
    /// Prefix applied to every queue name at the broker.
    pub namespace: Option<String>,
    pub connection: ConnectionConfig,
    /// Worker defaults for processors that do not override them.
    pub worker_defaults: WorkerSettings,
}

impl QueueManagerOptions {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_worker_defaults(mut self, defaults: WorkerSettings) -> Self {
        self.worker_defaults = defaults;
        self
    }
}

/// Process configuration read from environment variables.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Raw `QUEUE_BACKEND` value, validated by [`QueueConfig::backend_kind`].
    pub backend: String,
    pub options: QueueManagerOptions,
}

impl QueueConfig {
    /// Creates a new `QueueConfig` from environment variables.
    ///
    /// # Defaults
    ///
    /// - `QUEUE_BACKEND` defaults to `"redis"`.
    /// - `REDIS_HOST` / `REDIS_PORT` default to `127.0.0.1:6379`; `REDIS_URL` overrides both.
    /// - `REDIS_CONNECTION_TIMEOUT_MS` defaults to `10000`.
    /// - `QUEUE_POLL_INTERVAL_MS` defaults to `100`.
    /// - `WORKER_CONCURRENCY` defaults to `2`, `WORKER_RETRIES` to `0`.
    /// - `WORKER_STALL_INTERVAL_MS` defaults to `30000`.
    /// - `WORKER_SHUTDOWN_TIMEOUT_MS` defaults to `5000`.
    ///
    /// Values that fail to parse fall back to their defaults.
    pub fn from_env() -> Self {
        let connection = ConnectionConfig {
            url: non_empty_var("REDIS_URL"),
            host: non_empty_var("REDIS_HOST").unwrap_or_else(|| DEFAULT_REDIS_HOST.to_string()),
            port: parse_var("REDIS_PORT", DEFAULT_REDIS_PORT),
            username: non_empty_var("REDIS_USERNAME"),
            password: non_empty_var("REDIS_PASSWORD"),
            db: non_empty_var("REDIS_DB").and_then(|v| v.parse().ok()),
            connection_timeout_ms: parse_var(
                "REDIS_CONNECTION_TIMEOUT_MS",
                DEFAULT_REDIS_CONNECTION_TIMEOUT_MS,
            ),
            ..Default::default()
        }
        .with_option(
            POLL_INTERVAL_OPTION,
            parse_var("QUEUE_POLL_INTERVAL_MS", DEFAULT_QUEUE_POLL_INTERVAL_MS).to_string(),
        );

        let worker_defaults = WorkerSettings {
            concurrency: parse_var("WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY).max(1),
            retries: parse_var("WORKER_RETRIES", DEFAULT_WORKER_RETRIES),
            stall_interval: Duration::from_millis(parse_var(
                "WORKER_STALL_INTERVAL_MS",
                DEFAULT_STALL_INTERVAL.as_millis() as u64,
            )),
            shutdown_timeout: Duration::from_millis(parse_var(
                "WORKER_SHUTDOWN_TIMEOUT_MS",
                DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64,
            )),
        };

        Self {
            backend: env::var("QUEUE_BACKEND").unwrap_or_else(|_| DEFAULT_QUEUE_BACKEND.to_string()),
            options: QueueManagerOptions {
                namespace: non_empty_var("QUEUE_NAMESPACE"),
                connection,
                worker_defaults,
            },
        }
    }

    pub fn backend_kind(&self) -> Result<QueueBackendKind, QueueBackendError> {
        QueueBackendKind::from_str(self.backend.trim()).map_err(|_| {
            QueueBackendError::ConfigError(format!(
                "Unsupported QUEUE_BACKEND value: {}. Must be 'redis' or 'memory'",
                self.backend
            ))
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
