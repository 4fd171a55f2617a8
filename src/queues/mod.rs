//! Queue backend abstraction layer.
//!
//! A backend creates one [`JobQueue`] (producer handle) per processor and one
//! [`JobWorker`] (consumer) on demand. The manager only talks to these traits,
//! so Redis/Apalis and the in-memory backend are interchangeable.
//!
//! # Environment Variables
//!
//! - `QUEUE_BACKEND`: Backend to use ("redis" or "memory", default: "redis")
//!
//! # Example
//!
//! ```ignore
//! let config = QueueConfig::from_env();
//! let backend = create_queue_backend(&config).await?;
//! let queue = backend.create_queue("greet").await?;
//! queue.add_job(Job::new("greet", "j1", json!({"name": "Ann"}))).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::{
    config::{QueueBackendKind, QueueConfig, WorkerSettings},
    jobs::{Job, JobHandle, JobProcessor},
};

pub mod memory;
pub mod redis;
mod types;
pub(crate) mod worker_task;

pub use memory::{InMemoryBackend, InMemoryQueue, InMemoryWorker};
pub use redis::{RedisBackend, RedisQueue, RedisWorker};
pub use types::*;

/// Producer handle for a single named queue.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait JobQueue: Send + Sync + 'static {
    /// Submits a job, returning the broker acknowledgement.
    async fn add_job(&self, job: Job) -> Result<JobHandle, QueueBackendError>;

    /// Number of jobs waiting to be picked up.
    async fn pending_jobs(&self) -> Result<u64, QueueBackendError>;

    /// Stops the handle from accepting jobs. Closing twice is not an error.
    async fn close(&self) -> Result<(), QueueBackendError>;
}

/// A running consumer bound to one queue.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait JobWorker: Send + Sync + 'static {
    fn is_running(&self) -> bool;

    /// Stops fetching new jobs and waits for in-flight ones to finish.
    async fn close(&self) -> Result<(), QueueBackendError>;
}

/// Factory for queues and workers on one broker.
#[async_trait]
#[cfg_attr(test, automock(type Queue = MockJobQueue; type Worker = MockJobWorker;))]
pub trait QueueBackend: Send + Sync {
    type Queue: JobQueue;
    type Worker: JobWorker;

    /// Returns the backend type identifier.
    fn backend_type(&self) -> &'static str;

    /// Creates the producer handle for `queue_name`, the fully namespaced name.
    async fn create_queue(&self, queue_name: &str) -> Result<Self::Queue, QueueBackendError>;

    /// Starts a worker that feeds jobs from `queue` into the processor's handler.
    async fn create_worker(
        &self,
        queue: &Self::Queue,
        processor: Arc<JobProcessor>,
        settings: WorkerSettings,
    ) -> Result<Self::Worker, QueueBackendError>;

    /// Releases the broker connection. Later `create_*` calls may fail.
    async fn close(&self) -> Result<(), QueueBackendError>;
}

/// Enum-based queue backend storage.
///
/// Provides static dispatch over the concrete backend implementations
/// instead of `dyn QueueBackend` trait objects.
#[derive(Debug, Clone)]
pub enum QueueBackendStorage {
    Redis(Box<RedisBackend>),
    InMemory(InMemoryBackend),
}

#[derive(Debug)]
pub enum QueueStorage {
    Redis(RedisQueue),
    InMemory(InMemoryQueue),
}

#[derive(Debug)]
pub enum WorkerStorage {
    Redis(RedisWorker),
    InMemory(InMemoryWorker),
}

impl QueueBackendStorage {
    /// Builds the backend selected by `config.backend`, connecting to the
    /// broker if it needs one.
    pub async fn new(config: &QueueConfig) -> Result<Self, QueueBackendError> {
        match config.backend_kind()? {
            QueueBackendKind::Redis => {
                let backend = RedisBackend::connect(&config.options.connection).await?;
                Ok(Self::Redis(Box::new(backend)))
            }
            QueueBackendKind::Memory => Ok(Self::InMemory(InMemoryBackend::new())),
        }
    }
}

#[async_trait]
impl QueueBackend for QueueBackendStorage {
    type Queue = QueueStorage;
    type Worker = WorkerStorage;

    fn backend_type(&self) -> &'static str {
        match self {
            Self::Redis(b) => b.backend_type(),
            Self::InMemory(b) => b.backend_type(),
        }
    }

    async fn create_queue(&self, queue_name: &str) -> Result<QueueStorage, QueueBackendError> {
        match self {
            Self::Redis(b) => b.create_queue(queue_name).await.map(QueueStorage::Redis),
            Self::InMemory(b) => b.create_queue(queue_name).await.map(QueueStorage::InMemory),
        }
    }

    async fn create_worker(
        &self,
        queue: &QueueStorage,
        processor: Arc<JobProcessor>,
        settings: WorkerSettings,
    ) -> Result<WorkerStorage, QueueBackendError> {
        match (self, queue) {
            (Self::Redis(b), QueueStorage::Redis(q)) => b
                .create_worker(q, processor, settings)
                .await
                .map(WorkerStorage::Redis),
            (Self::InMemory(b), QueueStorage::InMemory(q)) => b
                .create_worker(q, processor, settings)
                .await
                .map(WorkerStorage::InMemory),
            _ => Err(QueueBackendError::ConfigError(format!(
                "queue was not created by the {} backend",
                self.backend_type()
            ))),
        }
    }

    async fn close(&self) -> Result<(), QueueBackendError> {
        match self {
            Self::Redis(b) => b.close().await,
            Self::InMemory(b) => b.close().await,
        }
    }
}

#[async_trait]
impl JobQueue for QueueStorage {
    async fn add_job(&self, job: Job) -> Result<JobHandle, QueueBackendError> {
        match self {
            Self::Redis(q) => q.add_job(job).await,
            Self::InMemory(q) => q.add_job(job).await,
        }
    }

    async fn pending_jobs(&self) -> Result<u64, QueueBackendError> {
        match self {
            Self::Redis(q) => q.pending_jobs().await,
            Self::InMemory(q) => q.pending_jobs().await,
        }
    }

    async fn close(&self) -> Result<(), QueueBackendError> {
        match self {
            Self::Redis(q) => q.close().await,
            Self::InMemory(q) => q.close().await,
        }
    }
}

#[async_trait]
impl JobWorker for WorkerStorage {
    fn is_running(&self) -> bool {
        match self {
            Self::Redis(w) => w.is_running(),
            Self::InMemory(w) => w.is_running(),
        }
    }

    async fn close(&self) -> Result<(), QueueBackendError> {
        match self {
            Self::Redis(w) => w.close().await,
            Self::InMemory(w) => w.close().await,
        }
    }
}

/// Creates the queue backend selected by `QUEUE_BACKEND`.
///
/// # Errors
/// Returns QueueBackendError::ConfigError if `QUEUE_BACKEND` contains an
/// unsupported value, or a connection error if the broker is unreachable.
pub async fn create_queue_backend(
    config: &QueueConfig,
) -> Result<QueueBackendStorage, QueueBackendError> {
    QueueBackendStorage::new(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::QueueManagerOptions, jobs::HandlerError};
    use serde_json::json;

    fn memory_config() -> QueueConfig {
        QueueConfig {
            backend: "Memory".to_string(),
            options: QueueManagerOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_create_memory_backend() {
        let backend = create_queue_backend(&memory_config()).await.unwrap();
        assert_eq!(backend.backend_type(), "memory");
        assert!(matches!(backend, QueueBackendStorage::InMemory(_)));
    }

    #[tokio::test]
    async fn test_unsupported_backend_is_config_error() {
        let config = QueueConfig {
            backend: "sqs".to_string(),
            ..memory_config()
        };

        let result = create_queue_backend(&config).await;

        assert!(matches!(result, Err(QueueBackendError::ConfigError(ref m)) if m.contains("sqs")));
    }

    #[tokio::test]
    async fn test_storage_dispatches_to_memory_queue_and_worker() {
        let backend = QueueBackendStorage::InMemory(InMemoryBackend::new());
        let queue = backend.create_queue("greet").await.unwrap();

        let handle = queue
            .add_job(Job::new("greet", "j1", json!({})))
            .await
            .unwrap();
        assert_eq!(handle.queue, "greet");
        assert_eq!(queue.pending_jobs().await.unwrap(), 1);

        let processor = Arc::new(JobProcessor::new("greet", |_ctx| async {
            Ok::<_, HandlerError>(())
        }));
        let worker = backend
            .create_worker(&queue, processor, WorkerSettings::default())
            .await
            .unwrap();
        assert!(worker.is_running());

        worker.close().await.unwrap();
        queue.close().await.unwrap();
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn test_worker_on_closed_queue_is_rejected() {
        let backend = QueueBackendStorage::InMemory(InMemoryBackend::new());
        let queue = backend.create_queue("greet").await.unwrap();
        queue.close().await.unwrap();

        let processor = Arc::new(JobProcessor::new("greet", |_ctx| async {
            Ok::<_, HandlerError>(())
        }));
        let result = backend
            .create_worker(&queue, processor, WorkerSettings::default())
            .await;

        assert!(matches!(result, Err(QueueBackendError::QueueClosed(_))));
    }
}
