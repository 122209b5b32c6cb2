// src/error.rs
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the job server.
#[derive(Debug, Error)]
pub enum JobsError {
    /// Bad cron expression or missing required setting. Fatal to startup.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A timestamp that must be UTC was not.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A job's invocation failed. Recovered by the scheduling loop.
    #[error("job '{job}' failed: {message}")]
    JobExecution { job: String, message: String },

    /// Shutdown was requested; not a real failure.
    #[error("cancellation requested")]
    Cancelled,

    /// The supervised loop did not exit within the shutdown window.
    #[error("processing server did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl JobsError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobsError::Cancelled)
    }
}

/// Errors raised by a [`JobStorage`](crate::storage::JobStorage) backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The distributed backend could not be reached or rejected a command.
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value was read back as a different type than it was written with.
    #[error("type mismatch: expected '{expected}', found '{found}'")]
    TypeMismatch { expected: String, found: String },
}

pub type Result<T, E = JobsError> = std::result::Result<T, E>;
