use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info};

use crate::{
    config::WorkerSettings,
    jobs::{execute_job, JobProcessor},
    queues::{worker_task::WorkerTask, JobWorker, QueueBackendError},
};

use super::{InMemoryQueue, QueuedJob};

/// Consumes an [`InMemoryQueue`] on a tokio task.
#[derive(Debug)]
pub struct InMemoryWorker {
    task: WorkerTask,
}

impl InMemoryWorker {
    pub fn spawn(
        queue: InMemoryQueue,
        processor: Arc<JobProcessor>,
        settings: WorkerSettings,
    ) -> Result<Self, QueueBackendError> {
        let receiver = queue.take_receiver()?;
        let name = processor.name().to_string();

        let task = WorkerTask::spawn(name.clone(), settings.shutdown_timeout, move |stop| {
            async move {
                info!("Worker [{}] started", name);
                receiver
                    .take_until(stop)
                    .for_each_concurrent(settings.concurrency, |queued| {
                        let processor = processor.clone();
                        let queue = queue.clone();
                        async move {
                            queue.mark_dequeued();
                            let job_id = queued.job.message_id.clone();
                            run_with_retries(&processor, queued, &settings).await;
                            queue.mark_finished(&job_id);
                        }
                    })
                    .await;
                info!("Worker [{}] stopped", name);
                Ok(())
            }
        });

        Ok(Self { task })
    }
}

async fn run_with_retries(processor: &JobProcessor, queued: QueuedJob, settings: &WorkerSettings) {
    let max_attempts = settings.retries + 1;
    for attempt in 1..=max_attempts {
        let result = execute_job(
            processor,
            queued.job.clone(),
            queued.task_id.clone(),
            attempt,
            settings.stall_interval,
        )
        .await;

        if result.is_ok() {
            return;
        }
    }

    error!(
        "Job {} on queue {} failed after {} attempt(s)",
        queued.job.message_id, queued.job.queue, max_attempts
    );
}

#[async_trait]
impl JobWorker for InMemoryWorker {
    fn is_running(&self) -> bool {
        self.task.is_running()
    }

    async fn close(&self) -> Result<(), QueueBackendError> {
        self.task.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{HandlerError, Job, JobContext};
    use crate::queues::JobQueue;
    use serde_json::{json, Value};
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::sync::mpsc;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            concurrency: 2,
            retries: 0,
            stall_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    #[tokio::test]
    async fn test_worker_processes_buffered_and_new_jobs() {
        let queue = InMemoryQueue::new("greet");
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let processor = Arc::new(
            JobProcessor::new("greet", |ctx: JobContext| async move {
                Ok::<_, HandlerError>(ctx.data().clone())
            })
            .on_completed(move |_, value| {
                let _ = tx.send(value.clone());
            }),
        );

        queue.add_job(Job::new("greet", "j1", json!(1))).await.unwrap();
        let worker = InMemoryWorker::spawn(queue.clone(), processor, settings()).unwrap();
        queue.add_job(Job::new("greet", "j2", json!(2))).await.unwrap();

        let mut seen = vec![
            rx.recv().await.unwrap().as_i64().unwrap(),
            rx.recv().await.unwrap().as_i64().unwrap(),
        ];
        seen.sort();
        assert_eq!(seen, vec![1, 2]);
        assert!(worker.is_running());

        worker.close().await.unwrap();
        assert!(!worker.is_running());
        assert_eq!(queue.pending_jobs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_worker_retries_failed_job() {
        let queue = InMemoryQueue::new("flaky");
        let attempts = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
        let counter = attempts.clone();
        let processor = Arc::new(
            JobProcessor::new("flaky", move |ctx: JobContext| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if ctx.attempt() < 3 {
                        Err(HandlerError::failed("not yet"))
                    } else {
                        Ok(ctx.attempt())
                    }
                }
            })
            .on_completed(move |job, _| {
                let _ = tx.send(job.attempt);
            }),
        );

        let worker = InMemoryWorker::spawn(
            queue.clone(),
            processor,
            WorkerSettings {
                retries: 2,
                ..settings()
            },
        )
        .unwrap();
        queue.add_job(Job::new("flaky", "j1", json!({}))).await.unwrap();

        assert_eq!(rx.recv().await, Some(3));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        worker.close().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pending_count_returns_to_zero_under_parallel_consumption() {
        const JOBS: usize = 500;

        for round in 0..10 {
            let queue = InMemoryQueue::new("bulk");
            let (tx, mut rx) = mpsc::unbounded_channel::<()>();
            let processor = Arc::new(
                JobProcessor::new("bulk", |_ctx| async { Ok::<_, HandlerError>(()) })
                    .on_completed(move |_, _| {
                        let _ = tx.send(());
                    }),
            );
            let worker = InMemoryWorker::spawn(
                queue.clone(),
                processor,
                WorkerSettings {
                    concurrency: 8,
                    ..settings()
                },
            )
            .unwrap();

            for i in 0..JOBS {
                queue
                    .add_job(Job::new("bulk", format!("job-{i}"), json!(i)))
                    .await
                    .unwrap();
            }
            for _ in 0..JOBS {
                rx.recv().await.unwrap();
            }
            worker.close().await.unwrap();

            assert_eq!(
                queue.pending_jobs().await.unwrap(),
                0,
                "round {round}: drained queue still reports pending jobs"
            );
        }
    }

    #[tokio::test]
    async fn test_finished_job_id_is_released() {
        let queue = InMemoryQueue::new("greet");
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let processor = Arc::new(
            JobProcessor::new("greet", |_ctx| async { Ok::<_, HandlerError>(()) })
                .on_completed(move |job, _| {
                    let _ = tx.send(job.task_id.clone());
                }),
        );
        let worker = InMemoryWorker::spawn(queue.clone(), processor, settings()).unwrap();

        let first = queue.add_job(Job::new("greet", "j1", json!(1))).await.unwrap();
        assert_eq!(rx.recv().await, Some(first.task_id.clone()));

        // on_completed fires just before the id is released
        let second = loop {
            let handle = queue.add_job(Job::new("greet", "j1", json!(2))).await.unwrap();
            if handle.task_id != first.task_id {
                break handle;
            }
            tokio::task::yield_now().await;
        };
        assert_eq!(rx.recv().await, Some(second.task_id));

        worker.close().await.unwrap();
        assert_eq!(queue.pending_jobs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_second_worker_on_same_queue_is_rejected() {
        let queue = InMemoryQueue::new("greet");
        let processor = Arc::new(JobProcessor::new("greet", |_ctx| async {
            Ok::<_, HandlerError>(())
        }));

        let worker = InMemoryWorker::spawn(queue.clone(), processor.clone(), settings()).unwrap();
        let second = InMemoryWorker::spawn(queue, processor, settings());

        assert!(matches!(second, Err(QueueBackendError::WorkerInitError(_))));
        worker.close().await.unwrap();
    }
}
