//! Lifecycle of a spawned worker loop, shared by every backend.
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::{sync::oneshot, task::JoinHandle, time::timeout};

use super::QueueBackendError;

// Extra time granted on top of the worker's own drain deadline
const CLOSE_GRACE: Duration = Duration::from_millis(500);

pub(crate) type StopSignal = oneshot::Receiver<()>;

#[derive(Debug)]
pub(crate) struct WorkerTask {
    name: String,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<Result<(), String>>>>,
    running: Arc<AtomicBool>,
    shutdown_timeout: Duration,
}

impl WorkerTask {
    /// Spawns the loop built by `run`, which must return once the stop signal fires.
    pub(crate) fn spawn<F, Fut>(name: impl Into<String>, shutdown_timeout: Duration, run: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let (stop_tx, stop_rx) = oneshot::channel();
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let fut = run(stop_rx);

        let handle = tokio::spawn(async move {
            let result = fut.await;
            flag.store(false, Ordering::SeqCst);
            result
        });

        Self {
            name: name.into(),
            stop: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(Some(handle)),
            running,
            shutdown_timeout,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signals the loop to stop and waits for in-flight jobs to drain.
    /// Subsequent calls are no-ops.
    pub(crate) async fn close(&self) -> Result<(), QueueBackendError> {
        let stop = self.stop.lock().take();
        if let Some(stop) = stop {
            // The loop may already be gone; that is not an error.
            let _ = stop.send(());
        }

        let handle = self.handle.lock().take();
        let Some(mut handle) = handle else {
            debug!("Worker [{}] already closed", self.name);
            return Ok(());
        };

        match timeout(self.shutdown_timeout + CLOSE_GRACE, &mut handle).await {
            Ok(Ok(Ok(()))) => {
                debug!("Worker [{}] stopped", self.name);
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(QueueBackendError::WorkerShutdownError(format!(
                "worker {} exited with error: {}",
                self.name, e
            ))),
            Ok(Err(join_error)) => Err(QueueBackendError::WorkerShutdownError(format!(
                "worker {} task failed: {}",
                self.name, join_error
            ))),
            Err(_) => {
                warn!(
                    "Worker [{}] did not stop within {:?}, aborting",
                    self.name, self.shutdown_timeout
                );
                handle.abort();
                self.running.store(false, Ordering::SeqCst);
                Err(QueueBackendError::WorkerShutdownError(format!(
                    "worker {} did not stop within {:?}",
                    self.name, self.shutdown_timeout
                )))
            }
        }
    }
}
