//! Apalis worker setup for the Redis backend.
//!
//! One Apalis worker and monitor per processor. The adapter below is the only
//! place Apalis handler types (`Data`, `Attempt`, `TaskId`) appear; everything
//! else goes through the backend-neutral [`execute_job`].

use std::{sync::Arc, time::Duration};

use apalis::layers::{retry::RetryPolicy, ErrorHandlingLayer};
use apalis::prelude::*;
use apalis_redis::RedisStorage;
use async_trait::async_trait;
use log::{debug, error, info};

use crate::{
    config::WorkerSettings,
    jobs::{execute_job, Job, JobProcessor},
    queues::{worker_task::WorkerTask, JobWorker, QueueBackendError},
};

#[derive(Clone)]
struct WorkerState {
    processor: Arc<JobProcessor>,
    stall_interval: Duration,
}

async fn apalis_job_handler(
    job: Job,
    state: Data<WorkerState>,
    attempt: Attempt,
    task_id: TaskId,
) -> Result<(), apalis::prelude::Error> {
    execute_job(
        &state.processor,
        job,
        task_id.to_string(),
        attempt.current(),
        state.stall_interval,
    )
    .await
    .map(|_| ())
    .map_err(Into::into)
}

/// A running Apalis monitor consuming one Redis queue.
#[derive(Debug)]
pub struct RedisWorker {
    task: WorkerTask,
}

impl RedisWorker {
    pub(crate) fn spawn(
        storage: RedisStorage<Job>,
        processor: Arc<JobProcessor>,
        settings: WorkerSettings,
    ) -> Result<Self, QueueBackendError> {
        let name = processor.name().to_string();
        let state = WorkerState {
            processor,
            stall_interval: settings.stall_interval,
        };

        let worker = WorkerBuilder::new(name.clone())
            .layer(ErrorHandlingLayer::new())
            .enable_tracing()
            .catch_panic()
            .retry(RetryPolicy::retries(settings.retries))
            .concurrency(settings.concurrency)
            .data(state)
            .backend(storage)
            .build_fn(apalis_job_handler);

        let monitor = Monitor::new()
            .register(worker)
            .on_event(monitor_handle_event)
            .shutdown_timeout(settings.shutdown_timeout);

        let task = WorkerTask::spawn(name.clone(), settings.shutdown_timeout, move |stop| {
            let monitor_future = monitor.run_with_signal(async move {
                info!("Worker [{}] monitor started", name);
                // A dropped sender means the handle is gone; stop either way.
                let _ = stop.await;
                debug!("Worker [{}] monitor shutting down", name);
                Ok(())
            });
            async move { monitor_future.await.map_err(|e| e.to_string()) }
        });

        Ok(Self { task })
    }
}

#[async_trait]
impl JobWorker for RedisWorker {
    fn is_running(&self) -> bool {
        self.task.is_running()
    }

    async fn close(&self) -> Result<(), QueueBackendError> {
        self.task.close().await
    }
}

fn monitor_handle_event(e: Worker<Event>) {
    let worker_id = e.id();
    match e.inner() {
        Event::Engage(task_id) => {
            debug!("Worker [{}] got job {}", worker_id, task_id);
        }
        Event::Error(e) => {
            error!("Worker [{}] encountered an error: {}", worker_id, e);
        }
        Event::Exit => {
            debug!("Worker [{}] exited", worker_id);
        }
        Event::Idle => {
            debug!("Worker [{}] is idle", worker_id);
        }
        Event::Start => {
            debug!("Worker [{}] started", worker_id);
        }
        Event::Stop => {
            debug!("Worker [{}] stopped", worker_id);
        }
        _ => {}
    }
}
