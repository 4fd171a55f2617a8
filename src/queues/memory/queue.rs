use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use log::debug;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
    jobs::{Job, JobHandle},
    queues::{JobQueue, QueueBackendError},
};

/// A job as it sits in the in-memory channel.
#[derive(Debug)]
pub(crate) struct QueuedJob {
    pub task_id: String,
    pub job: Job,
}

#[derive(Debug)]
struct InMemoryQueueInner {
    name: String,
    sender: UnboundedSender<QueuedJob>,
    receiver: Mutex<Option<UnboundedReceiver<QueuedJob>>>,
    task_ids: DashMap<String, String>, // job_id -> task_id
    pending: AtomicU64,
    closed: AtomicBool,
}

/// Process-local queue. Jobs are buffered until a worker takes the receiver.
///
/// Submitting a job id that is still queued or running returns the original
/// handle without enqueuing it again. Once the job has finished its id is
/// forgotten, so the id map only holds unfinished jobs.
#[derive(Debug, Clone)]
pub struct InMemoryQueue {
    inner: Arc<InMemoryQueueInner>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            inner: Arc::new(InMemoryQueueInner {
                name: name.into(),
                sender,
                receiver: Mutex::new(Some(receiver)),
                task_ids: DashMap::new(),
                pending: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Hands the consuming end to a worker. Only one worker may consume a queue.
    pub(crate) fn take_receiver(&self) -> Result<UnboundedReceiver<QueuedJob>, QueueBackendError> {
        self.inner.receiver.lock().take().ok_or_else(|| {
            QueueBackendError::WorkerInitError(format!(
                "queue {} is already consumed by a worker",
                self.inner.name
            ))
        })
    }

    /// Releases the job id once its last attempt is over.
    pub(crate) fn mark_finished(&self, job_id: &str) {
        self.inner.task_ids.remove(job_id);
    }

    pub(crate) fn mark_dequeued(&self) {
        let _ = self
            .inner
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn add_job(&self, job: Job) -> Result<JobHandle, QueueBackendError> {
        if self.is_closed() {
            return Err(QueueBackendError::QueueClosed(self.inner.name.clone()));
        }

        let job_id = job.message_id.clone();
        let task_id = match self.inner.task_ids.entry(job_id.clone()) {
            Entry::Occupied(existing) => {
                debug!(
                    "Job {} already exists on queue {}, not enqueuing again",
                    job_id, self.inner.name
                );
                return Ok(JobHandle {
                    job_id,
                    queue: self.inner.name.clone(),
                    task_id: existing.get().clone(),
                });
            }
            Entry::Vacant(slot) => {
                let task_id = Uuid::new_v4().to_string();
                // Counted before sending: a worker may dequeue it right away
                self.inner.pending.fetch_add(1, Ordering::SeqCst);
                if self
                    .inner
                    .sender
                    .unbounded_send(QueuedJob {
                        task_id: task_id.clone(),
                        job,
                    })
                    .is_err()
                {
                    self.inner.pending.fetch_sub(1, Ordering::SeqCst);
                    return Err(QueueBackendError::QueueClosed(self.inner.name.clone()));
                }
                slot.insert(task_id.clone());
                task_id
            }
        };

        Ok(JobHandle {
            job_id,
            queue: self.inner.name.clone(),
            task_id,
        })
    }

    async fn pending_jobs(&self) -> Result<u64, QueueBackendError> {
        Ok(self.inner.pending.load(Ordering::SeqCst))
    }

    async fn close(&self) -> Result<(), QueueBackendError> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.inner.sender.close_channel();
            debug!("Queue {} closed", self.inner.name);
        }
        Ok(())
    }
}
