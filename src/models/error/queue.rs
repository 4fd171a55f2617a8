use std::fmt;

use serde::Serialize;
use strum::Display;
use thiserror::Error;

use crate::queues::QueueBackendError;

/// Which kind of handle failed to close during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum HandleKind {
    Queue,
    Worker,
    Connection,
}

/// A single handle that failed to close.
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownFailure {
    pub name: String,
    pub kind: HandleKind,
    pub error: QueueBackendError,
}

impl fmt::Display for ShutdownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.kind, self.name, self.error)
    }
}

fn join_failures(failures: &[ShutdownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error, Serialize)]
pub enum QueueManagerError {
    #[error("Duplicate processor name: {0}")]
    DuplicateProcessor(String),

    #[error("Invalid processor: {0}")]
    InvalidProcessor(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Queue backend error: {0}")]
    Backend(#[from] QueueBackendError),

    #[error("Queue manager has been shut down")]
    ShutDown,

    #[error("Failed to close {} handle(s): {}", .0.len(), join_failures(.0))]
    Shutdown(Vec<ShutdownFailure>),
}

impl From<serde_json::Error> for QueueManagerError {
    fn from(error: serde_json::Error) -> Self {
        QueueManagerError::Serialization(error.to_string())
    }
}
