//! Error types for scheduler operations.

use thiserror::Error;

use crate::util::ids::ExecutionId;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The named queue was never created.
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
    /// Queue pending depth is at its admission ceiling.
    #[error("queue `{queue}` full: {max_pending} pending executions")]
    QueueFull {
        /// Queue that rejected the submission.
        queue: String,
        /// Admission ceiling that was hit.
        max_pending: usize,
    },
    /// A queue with this name already exists.
    #[error("queue already exists: {0}")]
    QueueExists(String),
    /// Caller-supplied execution id collides with a live execution.
    #[error("duplicate execution id: {0}")]
    DuplicateExecution(ExecutionId),
    /// Caller-supplied timeout was not positive.
    #[error("execution timeout must be positive")]
    InvalidTimeout,
    /// Queue limits failed validation.
    #[error("invalid queue configuration: {0}")]
    InvalidQueueConfig(String),
    /// Internal failure with context.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    /// Whether this error is an admission rejection (a caller problem, 4xx
    /// over HTTP) rather than an internal fault (5xx).
    #[must_use]
    pub const fn is_admission_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

/// Errors surfaced by the extension registry boundary.
///
/// These never escape a worker: they are captured into a FAILED
/// [`ExecutionResult`](crate::core::execution::ExecutionResult).
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The extension is not loaded or not enabled.
    #[error("extension not loaded: {0}")]
    NotLoaded(String),
    /// The extension's own code failed.
    #[error("extension failed: {0}")]
    Runtime(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
