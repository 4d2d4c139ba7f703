//! Worker error types.

use thiserror::Error;

use reel_media::{EngineError, MediaError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task store error: {0}")]
    Store(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Queue error: {0}")]
    Queue(#[from] reel_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    ///
    /// Bad requests and renders that produced nothing fail the same way
    /// again; environment hiccups may not.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Queue(e) => e.is_transient(),
            WorkerError::Store(_) | WorkerError::Io(_) => true,
            WorkerError::Engine(EngineError::Io(_)) => true,
            WorkerError::Engine(EngineError::Media(e)) => {
                matches!(e, MediaError::Timeout(_) | MediaError::Io(_))
            }
            _ => false,
        }
    }

    /// Whether the job itself is at fault (bad input), as opposed to the
    /// worker or its environment.
    pub fn is_input_error(&self) -> bool {
        match self {
            WorkerError::InvalidJob(_) => true,
            WorkerError::Engine(e) => e.is_input_error(),
            _ => false,
        }
    }
}
