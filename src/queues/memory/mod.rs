//! In-memory queue backend.
//!
//! Jobs live in process-local channels and are lost when the process exits.
//! Intended for development and tests; production deployments use Redis.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{config::WorkerSettings, jobs::JobProcessor};

use super::{QueueBackend, QueueBackendError};

mod queue;
pub use queue::InMemoryQueue;
pub(crate) use queue::QueuedJob;

mod worker;
pub use worker::InMemoryWorker;

#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend;

impl InMemoryBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    type Queue = InMemoryQueue;
    type Worker = InMemoryWorker;

    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn create_queue(&self, queue_name: &str) -> Result<InMemoryQueue, QueueBackendError> {
        Ok(InMemoryQueue::new(queue_name))
    }

    async fn create_worker(
        &self,
        queue: &InMemoryQueue,
        processor: Arc<JobProcessor>,
        settings: WorkerSettings,
    ) -> Result<InMemoryWorker, QueueBackendError> {
        if queue.is_closed() {
            return Err(QueueBackendError::QueueClosed(queue.name().to_string()));
        }
        InMemoryWorker::spawn(queue.clone(), processor, settings)
    }

    // No connection to release
    async fn close(&self) -> Result<(), QueueBackendError> {
        Ok(())
    }
}
