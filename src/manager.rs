//! The queue manager facade.
//!
//! [`QueueManager`] owns a fixed set of [`JobProcessor`] declarations and, per
//! processor name, at most one queue handle and one worker handle created
//! through a [`QueueBackend`]. Lifecycle per name only moves forward:
//! registered, queue created, worker running, shut down.

use std::{collections::BTreeMap, fmt, sync::Arc};

use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use strum::Display;

use crate::{
    config::QueueManagerOptions,
    constants::QUEUE_NAMESPACE_SEPARATOR,
    jobs::{Job, JobHandle, JobProcessor},
    models::{HandleKind, QueueManagerError, ShutdownFailure},
    queues::{JobQueue, JobWorker, QueueBackend, QueueHealth},
};

/// Selects which processors [`QueueManager::start_workers_matching`] starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerFilter {
    /// Every processor, grouped or not.
    All,
    /// Processors whose group name equals the given one.
    Group(String),
    /// Processors without a group.
    Ungrouped,
}

impl WorkerFilter {
    pub fn matches(&self, processor: &JobProcessor) -> bool {
        match self {
            Self::All => true,
            Self::Group(group) => processor.group_name() == Some(group.as_str()),
            Self::Ungrouped => processor.group_name().is_none(),
        }
    }
}

impl From<Option<&str>> for WorkerFilter {
    fn from(group: Option<&str>) -> Self {
        match group {
            Some(group) => Self::Group(group.to_string()),
            None => Self::All,
        }
    }
}

/// Where a registered processor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    Registered,
    QueueCreated,
    WorkerRunning,
    ShutDown,
}

struct ProcessorEntry<B: QueueBackend> {
    processor: Arc<JobProcessor>,
    queue: Option<B::Queue>,
    worker: Option<B::Worker>,
}

pub struct QueueManager<B: QueueBackend> {
    entries: BTreeMap<String, ProcessorEntry<B>>,
    options: QueueManagerOptions,
    backend: B,
    shut_down: bool,
}

fn queue_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{}{}{}", namespace, QUEUE_NAMESPACE_SEPARATOR, name),
        None => name.to_string(),
    }
}

impl<B: QueueBackend> QueueManager<B> {
    /// Registers `processors` without touching the broker.
    ///
    /// # Errors
    /// `InvalidProcessor` for a malformed declaration, `DuplicateProcessor`
    /// when two declarations share a name.
    pub fn new(
        processors: impl IntoIterator<Item = JobProcessor>,
        options: QueueManagerOptions,
        backend: B,
    ) -> Result<Self, QueueManagerError> {
        let mut entries = BTreeMap::new();

        for processor in processors {
            processor.validate()?;
            let name = processor.name().to_string();
            if entries.contains_key(&name) {
                return Err(QueueManagerError::DuplicateProcessor(name));
            }
            entries.insert(
                name,
                ProcessorEntry {
                    processor: Arc::new(processor),
                    queue: None,
                    worker: None,
                },
            );
        }

        debug!(
            "Queue manager created with {} processor(s) on {} backend",
            entries.len(),
            backend.backend_type()
        );

        Ok(Self {
            entries,
            options,
            backend,
            shut_down: false,
        })
    }

    fn ensure_running(&self) -> Result<(), QueueManagerError> {
        if self.shut_down {
            return Err(QueueManagerError::ShutDown);
        }
        Ok(())
    }

    /// Creates a queue handle for every processor that does not have one yet.
    pub async fn start_queues(&mut self) -> Result<(), QueueManagerError> {
        self.ensure_running()?;
        let namespace = self.options.namespace.as_deref();

        for (name, entry) in self.entries.iter_mut() {
            if entry.queue.is_some() {
                continue;
            }
            let key = queue_key(namespace, name);
            entry.queue = Some(self.backend.create_queue(&key).await?);
            info!("Queue [{}] started", key);
        }

        Ok(())
    }

    /// Starts workers for processors in `group`, or for every processor when
    /// `group` is `None`.
    pub async fn start_workers(&mut self, group: Option<&str>) -> Result<(), QueueManagerError> {
        self.start_workers_matching(WorkerFilter::from(group)).await
    }

    /// Starts a worker for each processor selected by `filter` that has none.
    ///
    /// A missing queue handle is created first. Stops at the first backend
    /// error; workers started before it keep running.
    pub async fn start_workers_matching(
        &mut self,
        filter: WorkerFilter,
    ) -> Result<(), QueueManagerError> {
        self.ensure_running()?;
        let namespace = self.options.namespace.as_deref();
        let defaults = self.options.worker_defaults;

        for (name, entry) in self.entries.iter_mut() {
            if entry.worker.is_some() || !filter.matches(&entry.processor) {
                continue;
            }

            let key = queue_key(namespace, name);
            if entry.queue.is_none() {
                debug!("Queue [{}] missing, creating it for the worker", key);
                entry.queue = Some(self.backend.create_queue(&key).await?);
            }
            let Some(queue) = entry.queue.as_ref() else {
                continue;
            };

            let settings = entry.processor.options().resolve(&defaults);
            let worker = self
                .backend
                .create_worker(queue, entry.processor.clone(), settings)
                .await?;
            entry.worker = Some(worker);

            info!(
                "Worker [{}] started (concurrency {}, retries {})",
                key, settings.concurrency, settings.retries
            );
        }

        Ok(())
    }

    /// Submits `payload` under `job_id` to the queue of processor `queue_name`.
    ///
    /// # Errors
    /// `QueueNotFound` without contacting the broker when the processor is
    /// unknown or its queue has not been started.
    pub async fn add_job(
        &self,
        queue_name: &str,
        job_id: &str,
        payload: impl Serialize,
    ) -> Result<JobHandle, QueueManagerError> {
        self.ensure_running()?;

        let queue = self
            .get_queue(queue_name)
            .ok_or_else(|| QueueManagerError::QueueNotFound(queue_name.to_string()))?;

        let job = Job::new(queue_name, job_id, serde_json::to_value(payload)?);
        let handle = queue.add_job(job).await?;

        debug!(
            "Job {} added to queue [{}] as task {}",
            handle.job_id, handle.queue, handle.task_id
        );
        Ok(handle)
    }

    pub fn get_queue(&self, name: &str) -> Option<&B::Queue> {
        self.entries.get(name).and_then(|entry| entry.queue.as_ref())
    }

    pub fn get_worker(&self, name: &str) -> Option<&B::Worker> {
        self.entries.get(name).and_then(|entry| entry.worker.as_ref())
    }

    /// Like [`Self::get_worker`], but an unknown or idle name is an error.
    pub fn worker(&self, name: &str) -> Result<&B::Worker, QueueManagerError> {
        self.get_worker(name)
            .ok_or_else(|| QueueManagerError::WorkerNotFound(name.to_string()))
    }

    /// Registered processor names, in sorted order.
    pub fn processor_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn state(&self, name: &str) -> Option<ProcessorState> {
        let entry = self.entries.get(name)?;
        let state = if self.shut_down {
            ProcessorState::ShutDown
        } else if entry.worker.is_some() {
            ProcessorState::WorkerRunning
        } else if entry.queue.is_some() {
            ProcessorState::QueueCreated
        } else {
            ProcessorState::Registered
        };
        Some(state)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn options(&self) -> &QueueManagerOptions {
        &self.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reports every started queue.
    pub async fn health_check(&self) -> Result<Vec<QueueHealth>, QueueManagerError> {
        let mut health = Vec::new();

        for (name, entry) in &self.entries {
            let Some(queue) = entry.queue.as_ref() else {
                continue;
            };
            health.push(QueueHealth {
                queue: name.clone(),
                pending_jobs: queue.pending_jobs().await?,
                worker_running: entry.worker.as_ref().is_some_and(|w| w.is_running()),
                backend: self.backend.backend_type().to_string(),
            });
        }

        Ok(health)
    }

    /// Closes every worker, then every queue, releases the handles and
    /// finally the backend connection.
    ///
    /// Every handle gets a close attempt even when an earlier one fails; the
    /// failures are returned together as [`QueueManagerError::Shutdown`].
    /// Calling this again is a no-op.
    pub async fn shutdown(&mut self) -> Result<(), QueueManagerError> {
        if self.shut_down {
            debug!("Queue manager already shut down");
            return Ok(());
        }
        self.shut_down = true;
        info!("Shutting down queue manager");

        let workers: Vec<(String, B::Worker)> = self
            .entries
            .iter_mut()
            .filter_map(|(name, entry)| entry.worker.take().map(|w| (name.clone(), w)))
            .collect();
        let queues: Vec<(String, B::Queue)> = self
            .entries
            .iter_mut()
            .filter_map(|(name, entry)| entry.queue.take().map(|q| (name.clone(), q)))
            .collect();

        let mut failures = Vec::new();

        let closed = join_all(workers.iter().map(|(name, worker)| async move {
            (name, worker.close().await)
        }))
        .await;
        for (name, result) in closed {
            if let Err(error) = result {
                error!("Failed to close worker [{}]: {}", name, error);
                failures.push(ShutdownFailure {
                    name: name.clone(),
                    kind: HandleKind::Worker,
                    error,
                });
            }
        }

        for (name, queue) in &queues {
            if let Err(error) = queue.close().await {
                error!("Failed to close queue [{}]: {}", name, error);
                failures.push(ShutdownFailure {
                    name: name.clone(),
                    kind: HandleKind::Queue,
                    error,
                });
            }
        }

        let (worker_count, queue_count) = (workers.len(), queues.len());
        // Handles hold their own share of the connection
        drop(workers);
        drop(queues);

        if let Err(error) = self.backend.close().await {
            error!(
                "Failed to release {} backend connection: {}",
                self.backend.backend_type(),
                error
            );
            failures.push(ShutdownFailure {
                name: self.backend.backend_type().to_string(),
                kind: HandleKind::Connection,
                error,
            });
        }

        if failures.is_empty() {
            info!(
                "Queue manager shut down ({} worker(s), {} queue(s) closed)",
                worker_count, queue_count
            );
            Ok(())
        } else {
            warn!(
                "Queue manager shut down with {} failure(s)",
                failures.len()
            );
            Err(QueueManagerError::Shutdown(failures))
        }
    }
}

impl<B: QueueBackend> fmt::Debug for QueueManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let states: BTreeMap<&str, Option<ProcessorState>> = self
            .entries
            .keys()
            .map(|name| (name.as_str(), self.state(name)))
            .collect();
        f.debug_struct("QueueManager")
            .field("backend", &self.backend.backend_type())
            .field("namespace", &self.options.namespace)
            .field("processors", &states)
            .finish()
    }
}
