//! # Queue Manager
//!
//! A small facade over a distributed job queue. Applications declare named
//! job processors with lifecycle callbacks, optionally grouped, and let a
//! [`QueueManager`] create the broker queues, start workers for a group and
//! submit jobs by processor name.
//!
//! Queueing, retries and delivery are left to the broker library
//! (Apalis on Redis), or to an in-process backend for development and tests.
//!
//! ```ignore
//! let processors = vec![JobProcessor::new("greet", |ctx: JobContext| async move {
//!     let name: String = ctx.payload()?;
//!     Ok(format!("Hello {name}"))
//! })
//! .group("app1")];
//!
//! let mut manager = QueueManager::new(processors, options, backend)?;
//! manager.start_queues().await?;
//! manager.start_workers(Some("app1")).await?;
//! manager.add_job("greet", "job-1", "Ann").await?;
//! manager.shutdown().await?;
//! ```

pub mod config;
pub mod constants;
pub mod jobs;
pub mod logging;
pub mod manager;
pub mod models;
pub mod queues;

pub use config::{
    ConnectionConfig, QueueBackendKind, QueueConfig, QueueManagerOptions, WorkerSettings,
};
pub use jobs::{HandlerError, JobContext, JobHandle, JobInfo, JobProcessor};
pub use manager::{ProcessorState, QueueManager, WorkerFilter};
pub use models::QueueManagerError;
pub use queues::{create_queue_backend, QueueBackend, QueueBackendError, QueueBackendStorage};
