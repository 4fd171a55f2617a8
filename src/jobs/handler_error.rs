use thiserror::Error;

/// Error returned by a job handler.
///
/// The manager never inspects or rewrites it; it is handed to `on_failed`
/// and then reported to the broker as a failed attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("Job failed: {0}")]
    Failed(String),

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid job result: {0}")]
    InvalidResult(String),

    #[error("Job handler panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

impl From<eyre::Report> for HandlerError {
    fn from(error: eyre::Report) -> Self {
        HandlerError::Other(format!("{error:#}"))
    }
}

impl From<HandlerError> for apalis::prelude::Error {
    fn from(error: HandlerError) -> Self {
        apalis::prelude::Error::Failed(std::sync::Arc::new(error.into()))
    }
}
