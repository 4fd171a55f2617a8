use std::{fmt, sync::Arc, time::Duration};

use apalis::prelude::Storage;
use apalis_redis::{Config, ConnectionManager, RedisStorage};
use async_trait::async_trait;
use log::{debug, error, info};
use parking_lot::{Mutex, RwLock};
use tokio::time::timeout;

use crate::{
    config::{ConnectionConfig, WorkerSettings},
    constants::DEFAULT_QUEUE_POLL_INTERVAL_MS,
    jobs::{Job, JobHandle, JobProcessor},
    queues::{JobQueue, QueueBackend, QueueBackendError, POLL_INTERVAL_OPTION},
};

use super::RedisWorker;

/// Redis backend using Apalis storages for queue operations.
///
/// Every storage shares one multiplexed connection. [`QueueBackend::close`]
/// drops the backend's copy; the connection goes away once the queues and
/// workers holding the other copies are gone too.
#[derive(Clone)]
pub struct RedisBackend {
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    poll_interval: Duration,
    target: String,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("backend_type", &"redis")
            .field("target", &self.target)
            .field("poll_interval", &self.poll_interval)
            .field("released", &self.connection.read().is_none())
            .finish()
    }
}

impl RedisBackend {
    /// Connects to Redis, giving up after `connection_timeout_ms`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, QueueBackendError> {
        let target = config.display_target();
        let redis_url = config.redis_url()?;
        info!("Connecting queue backend to redis at {}", target);

        let connection = match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            apalis_redis::connect(redis_url),
        )
        .await
        {
            Ok(result) => result.map_err(|e| {
                error!("Failed to connect to redis at {}: {}", target, e);
                QueueBackendError::RedisError(format!(
                    "Failed to connect to Redis at {}. Please ensure Redis is running and accessible. Error: {}",
                    target, e
                ))
            })?,
            Err(_) => {
                error!("Timeout connecting to redis at {}", target);
                return Err(QueueBackendError::ConnectionTimeout(format!(
                    "Timed out after {} milliseconds while connecting to Redis at {}",
                    config.connection_timeout_ms, target
                )));
            }
        };

        let poll_interval = config
            .option(POLL_INTERVAL_OPTION)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUEUE_POLL_INTERVAL_MS);

        Ok(Self {
            connection: Arc::new(RwLock::new(Some(connection))),
            poll_interval: Duration::from_millis(poll_interval),
            target,
        })
    }

    fn storage(&self, namespace: &str) -> Result<RedisStorage<Job>, QueueBackendError> {
        let connection = self.connection.read().clone().ok_or_else(|| {
            QueueBackendError::QueueClosed(format!(
                "redis connection to {} has been released",
                self.target
            ))
        })?;
        let config = Config::default()
            .set_namespace(namespace)
            .set_poll_interval(self.poll_interval);

        Ok(RedisStorage::new_with_config(connection, config))
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    type Queue = RedisQueue;
    type Worker = RedisWorker;

    fn backend_type(&self) -> &'static str {
        "redis"
    }

    async fn create_queue(&self, queue_name: &str) -> Result<RedisQueue, QueueBackendError> {
        debug!("Creating redis queue {}", queue_name);
        Ok(RedisQueue {
            name: queue_name.to_string(),
            storage: Arc::new(Mutex::new(Some(self.storage(queue_name)?))),
        })
    }

    async fn create_worker(
        &self,
        queue: &RedisQueue,
        processor: Arc<JobProcessor>,
        settings: WorkerSettings,
    ) -> Result<RedisWorker, QueueBackendError> {
        RedisWorker::spawn(queue.storage()?, processor, settings)
    }

    async fn close(&self) -> Result<(), QueueBackendError> {
        if self.connection.write().take().is_some() {
            info!("Released redis connection to {}", self.target);
        }
        Ok(())
    }
}

/// Producer side of one Redis-backed queue.
///
/// Jobs are not deduplicated by id: pushing the same job id twice enqueues
/// two tasks. Closing drops the handle's storage and with it its share of
/// the connection.
#[derive(Clone)]
pub struct RedisQueue {
    name: String,
    storage: Arc<Mutex<Option<RedisStorage<Job>>>>,
}

impl fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQueue")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RedisQueue {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.storage.lock().is_none()
    }

    fn storage(&self) -> Result<RedisStorage<Job>, QueueBackendError> {
        self.storage
            .lock()
            .clone()
            .ok_or_else(|| QueueBackendError::QueueClosed(self.name.clone()))
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn add_job(&self, job: Job) -> Result<JobHandle, QueueBackendError> {
        let mut storage = self.storage()?;
        let job_id = job.message_id.clone();
        let parts = storage
            .push(job)
            .await
            .map_err(|e| QueueBackendError::RedisError(e.to_string()))?;

        Ok(JobHandle {
            job_id,
            queue: self.name.clone(),
            task_id: parts.task_id.to_string(),
        })
    }

    async fn pending_jobs(&self) -> Result<u64, QueueBackendError> {
        let mut storage = self.storage()?;
        let len = storage
            .len()
            .await
            .map_err(|e| QueueBackendError::RedisError(e.to_string()))?;
        Ok(len.max(0) as u64)
    }

    async fn close(&self) -> Result<(), QueueBackendError> {
        if self.storage.lock().take().is_some() {
            debug!("Queue {} closed", self.name);
        }
        Ok(())
    }
}
