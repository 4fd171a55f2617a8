//! Backend-neutral job execution.
//!
//! Both queue backends hand every dequeued job to [`execute_job`], which is the
//! only place lifecycle callbacks are fired from.
use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use log::{debug, error, warn};
use serde_json::Value;

use super::{HandlerError, Job, JobContext, JobInfo, JobProcessor};

/// Runs one attempt of `job` through the processor's handler.
///
/// Fires `on_active` before the handler, `on_stalled` once if the attempt
/// outlives `stall_interval`, and then exactly one of `on_completed` /
/// `on_failed`. A panicking handler counts as a failure.
pub async fn execute_job(
    processor: &JobProcessor,
    job: Job,
    task_id: String,
    attempt: usize,
    stall_interval: Duration,
) -> Result<Value, HandlerError> {
    let info = Arc::new(JobInfo::from_job(job, task_id, attempt));

    debug!(
        "Processor [{}] picked up job {} (task {}, attempt {})",
        processor.name(),
        info.job_id,
        info.task_id,
        info.attempt
    );

    if let Some(on_active) = processor.active_callback() {
        invoke_callback("on_active", &info, || on_active(&info));
    }

    let ctx = JobContext::new(info.clone(), processor.progress_callback().cloned());
    let handler = AssertUnwindSafe((processor.handler())(ctx)).catch_unwind();

    let on_stall = || {
        warn!(
            "Job {} on queue {} has been running for more than {:?}",
            info.job_id, info.queue, stall_interval
        );
        if let Some(on_stalled) = processor.stalled_callback() {
            invoke_callback("on_stalled", &info, || on_stalled(&info));
        }
    };

    let result = match watch_for_stall(handler, stall_interval, on_stall).await {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    };

    match &result {
        Ok(value) => {
            debug!(
                "Processor [{}] completed job {}",
                processor.name(),
                info.job_id
            );
            if let Some(on_completed) = processor.completed_callback() {
                invoke_callback("on_completed", &info, || on_completed(&info, value));
            }
        }
        Err(err) => {
            warn!(
                "Processor [{}] failed job {} on attempt {}: {}",
                processor.name(),
                info.job_id,
                info.attempt,
                err
            );
            if let Some(on_failed) = processor.failed_callback() {
                invoke_callback("on_failed", &info, || on_failed(&info, err));
            }
        }
    }

    result
}

/// Drives `fut` to completion, calling `on_stall` once if it takes longer
/// than `interval`. The future is never cancelled.
async fn watch_for_stall<F, S>(fut: F, interval: Duration, mut on_stall: S) -> F::Output
where
    F: Future,
    S: FnMut(),
{
    tokio::pin!(fut);
    let stall = tokio::time::sleep(interval);
    tokio::pin!(stall);
    let mut stalled = false;

    loop {
        tokio::select! {
            output = &mut fut => return output,
            _ = &mut stall, if !stalled => {
                stalled = true;
                on_stall();
            }
        }
    }
}

/// Runs a user callback, logging instead of unwinding into the worker if it panics.
pub(crate) fn invoke_callback<F: FnOnce()>(name: &str, job: &JobInfo, callback: F) {
    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(callback)) {
        error!(
            "{} callback panicked for job {} on queue {}: {}",
            name,
            job.job_id,
            job.queue,
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    #[derive(Default)]
    struct Calls {
        active: AtomicUsize,
        completed: Mutex<Vec<Value>>,
        failed: Mutex<Vec<String>>,
        stalled: AtomicUsize,
    }

    fn with_callbacks(processor: JobProcessor, calls: Arc<Calls>) -> JobProcessor {
        let (a, c, f, s) = (calls.clone(), calls.clone(), calls.clone(), calls);
        processor
            .on_active(move |_| {
                a.active.fetch_add(1, Ordering::SeqCst);
            })
            .on_completed(move |_, value| c.completed.lock().unwrap().push(value.clone()))
            .on_failed(move |_, err| f.failed.lock().unwrap().push(err.to_string()))
            .on_stalled(move |_| {
                s.stalled.fetch_add(1, Ordering::SeqCst);
            })
    }

    fn job() -> Job {
        Job::new("greet", "j1", json!({"name": "Ann"}))
    }

    #[tokio::test]
    async fn test_success_fires_active_then_completed() {
        let calls = Arc::new(Calls::default());
        let processor = with_callbacks(
            JobProcessor::new("greet", |ctx: JobContext| async move {
                Ok(format!("Hello {}", ctx.data()["name"].as_str().unwrap_or("?")))
            }),
            calls.clone(),
        );

        let result = execute_job(&processor, job(), "t1".into(), 1, Duration::from_secs(5)).await;

        assert_eq!(result.unwrap(), json!("Hello Ann"));
        assert_eq!(calls.active.load(Ordering::SeqCst), 1);
        assert_eq!(*calls.completed.lock().unwrap(), vec![json!("Hello Ann")]);
        assert!(calls.failed.lock().unwrap().is_empty());
        assert_eq!(calls.stalled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_fires_failed_only() {
        let calls = Arc::new(Calls::default());
        let processor = with_callbacks(
            JobProcessor::new("greet", |_ctx| async {
                Err::<(), _>(HandlerError::failed("smtp down"))
            }),
            calls.clone(),
        );

        let result = execute_job(&processor, job(), "t1".into(), 1, Duration::from_secs(5)).await;

        assert_eq!(result, Err(HandlerError::failed("smtp down")));
        assert!(calls.completed.lock().unwrap().is_empty());
        assert_eq!(
            *calls.failed.lock().unwrap(),
            vec!["Job failed: smtp down".to_string()]
        );
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_failure() {
        let calls = Arc::new(Calls::default());
        let processor = with_callbacks(
            JobProcessor::new("greet", |_ctx| async {
                if true {
                    panic!("handler exploded");
                }
                Ok::<(), HandlerError>(())
            }),
            calls.clone(),
        );

        let result = execute_job(&processor, job(), "t1".into(), 1, Duration::from_secs(5)).await;

        assert_eq!(
            result,
            Err(HandlerError::Panicked("handler exploded".to_string()))
        );
        assert_eq!(calls.failed.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_job_is_reported_stalled_once_and_still_completes() {
        let calls = Arc::new(Calls::default());
        let processor = with_callbacks(
            JobProcessor::new("greet", |_ctx| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, HandlerError>("late")
            }),
            calls.clone(),
        );

        let result = execute_job(&processor, job(), "t1".into(), 1, Duration::from_secs(1)).await;

        assert_eq!(result.unwrap(), json!("late"));
        assert_eq!(calls.stalled.load(Ordering::SeqCst), 1);
        assert_eq!(calls.completed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_change_outcome() {
        let processor = JobProcessor::new("greet", |_ctx| async { Ok::<_, HandlerError>(1) })
            .on_completed(|_, _| panic!("callback bug"));

        let result = execute_job(&processor, job(), "t1".into(), 1, Duration::from_secs(5)).await;

        assert_eq!(result.unwrap(), json!(1));
    }
}
