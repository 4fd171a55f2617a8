use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{runner::invoke_callback, HandlerError, JobInfo, ProgressFn};

/// Handed to a processor's handler for each attempt.
#[derive(Clone)]
pub struct JobContext {
    info: Arc<JobInfo>,
    on_progress: Option<ProgressFn>,
    progress: Arc<AtomicU8>,
}

impl JobContext {
    pub(crate) fn new(info: Arc<JobInfo>, on_progress: Option<ProgressFn>) -> Self {
        Self {
            info,
            on_progress,
            progress: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn job(&self) -> &JobInfo {
        &self.info
    }

    pub fn job_id(&self) -> &str {
        &self.info.job_id
    }

    pub fn attempt(&self) -> usize {
        self.info.attempt
    }

    pub fn data(&self) -> &Value {
        &self.info.data
    }

    /// Decodes the payload into a typed value.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        T::deserialize(&self.info.data).map_err(|e| HandlerError::InvalidPayload(e.to_string()))
    }

    /// Records progress (clamped to 100) and notifies `on_progress`.
    pub fn update_progress(&self, percent: u8) {
        let percent = percent.min(100);
        self.progress.store(percent, Ordering::Relaxed);
        if let Some(callback) = &self.on_progress {
            invoke_callback("on_progress", &self.info, || callback(&self.info, percent));
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }
}
