//! Job processor descriptors.
//!
//! A [`JobProcessor`] declares one named job type: the handler that runs it,
//! the lifecycle callbacks attached to its worker and the optional group used
//! to start a subset of workers.
use std::{fmt, future::Future, sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;

use crate::{config::WorkerSettings, models::QueueManagerError};

use super::{HandlerError, JobContext, JobInfo};

pub type HandlerFuture = BoxFuture<'static, Result<Value, HandlerError>>;
pub type ProcessFn = Arc<dyn Fn(JobContext) -> HandlerFuture + Send + Sync>;
pub type CompletedFn = Arc<dyn Fn(&JobInfo, &Value) + Send + Sync>;
pub type FailedFn = Arc<dyn Fn(&JobInfo, &HandlerError) + Send + Sync>;
pub type ProgressFn = Arc<dyn Fn(&JobInfo, u8) + Send + Sync>;
pub type JobEventFn = Arc<dyn Fn(&JobInfo) + Send + Sync>;

/// Per-processor overrides of the manager's worker defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerOptions {
    pub concurrency: Option<usize>,
    pub retries: Option<usize>,
    pub stall_interval: Option<Duration>,
}

impl WorkerOptions {
    pub fn resolve(&self, defaults: &WorkerSettings) -> WorkerSettings {
        WorkerSettings {
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            retries: self.retries.unwrap_or(defaults.retries),
            stall_interval: self.stall_interval.unwrap_or(defaults.stall_interval),
            shutdown_timeout: defaults.shutdown_timeout,
        }
    }
}

#[derive(Clone)]
pub struct JobProcessor {
    name: String,
    group_name: Option<String>,
    handler: ProcessFn,
    on_completed: Option<CompletedFn>,
    on_failed: Option<FailedFn>,
    on_progress: Option<ProgressFn>,
    on_active: Option<JobEventFn>,
    on_stalled: Option<JobEventFn>,
    options: WorkerOptions,
}

impl JobProcessor {
    /// Creates a processor whose handler resolves to any serializable result.
    pub fn new<F, Fut, R>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
        R: Serialize + 'static,
    {
        let handler: ProcessFn = Arc::new(move |ctx: JobContext| {
            handler(ctx)
                .map(|result| {
                    result.and_then(|value| {
                        serde_json::to_value(value)
                            .map_err(|e| HandlerError::InvalidResult(e.to_string()))
                    })
                })
                .boxed()
        });

        Self {
            name: name.into(),
            group_name: None,
            handler,
            on_completed: None,
            on_failed: None,
            on_progress: None,
            on_active: None,
            on_stalled: None,
            options: WorkerOptions::default(),
        }
    }

    pub fn group(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = Some(group_name.into());
        self
    }

    pub fn on_completed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&JobInfo, &Value) + Send + Sync + 'static,
    {
        self.on_completed = Some(Arc::new(callback));
        self
    }

    pub fn on_failed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&JobInfo, &HandlerError) + Send + Sync + 'static,
    {
        self.on_failed = Some(Arc::new(callback));
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&JobInfo, u8) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    pub fn on_active<F>(mut self, callback: F) -> Self
    where
        F: Fn(&JobInfo) + Send + Sync + 'static,
    {
        self.on_active = Some(Arc::new(callback));
        self
    }

    pub fn on_stalled<F>(mut self, callback: F) -> Self
    where
        F: Fn(&JobInfo) + Send + Sync + 'static,
    {
        self.on_stalled = Some(Arc::new(callback));
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.options.concurrency = Some(concurrency);
        self
    }

    pub fn retries(mut self, retries: usize) -> Self {
        self.options.retries = Some(retries);
        self
    }

    pub fn stall_interval(mut self, interval: Duration) -> Self {
        self.options.stall_interval = Some(interval);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_name(&self) -> Option<&str> {
        self.group_name.as_deref()
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    pub(crate) fn handler(&self) -> &ProcessFn {
        &self.handler
    }

    pub(crate) fn completed_callback(&self) -> Option<&CompletedFn> {
        self.on_completed.as_ref()
    }

    pub(crate) fn failed_callback(&self) -> Option<&FailedFn> {
        self.on_failed.as_ref()
    }

    pub(crate) fn progress_callback(&self) -> Option<&ProgressFn> {
        self.on_progress.as_ref()
    }

    pub(crate) fn active_callback(&self) -> Option<&JobEventFn> {
        self.on_active.as_ref()
    }

    pub(crate) fn stalled_callback(&self) -> Option<&JobEventFn> {
        self.on_stalled.as_ref()
    }

    /// Checks the declaration before it is registered.
    pub fn validate(&self) -> Result<(), QueueManagerError> {
        if self.name.trim().is_empty() {
            return Err(QueueManagerError::InvalidProcessor(
                "processor name must not be empty".to_string(),
            ));
        }
        if matches!(self.group_name.as_deref(), Some(group) if group.trim().is_empty()) {
            return Err(QueueManagerError::InvalidProcessor(format!(
                "processor '{}' has an empty group name",
                self.name
            )));
        }
        if self.options.concurrency == Some(0) {
            return Err(QueueManagerError::InvalidProcessor(format!(
                "processor '{}' must have a concurrency of at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobProcessor")
            .field("name", &self.name)
            .field("group_name", &self.group_name)
            .field("on_completed", &self.on_completed.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_active", &self.on_active.is_some())
            .field("on_stalled", &self.on_stalled.is_some())
            .field("options", &self.options)
            .finish()
    }
}
