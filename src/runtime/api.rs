//! API-facing request/response models.
//!
//! An HTTP or CLI layer maps each scheduler operation onto one of these
//! shapes; the scheduler itself mandates no wire format.

use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::core::error::SchedulerError;
use crate::core::execution::{ExecutionRequest, ExecutionStatus};
use crate::core::extension::ExtensionRegistry;
use crate::core::queue::PendingQueue;
use crate::core::scheduler::{ExtensionScheduler, Spawn};
use crate::util::ids::ExecutionId;

/// Response to a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Id of the admitted execution.
    pub execution_id: ExecutionId,
}

/// Status response for one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStatusResponse {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Current status.
    pub status: ExecutionStatus,
    /// Captured error, when the execution failed.
    pub error: Option<String>,
}

/// Queue listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueListing {
    /// Queue name.
    pub name: String,
    /// Worker ceiling.
    pub max_concurrent: usize,
    /// Admission ceiling.
    pub max_pending: usize,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Submit an execution into a named queue.
///
/// # Errors
///
/// Admission errors propagate unchanged; see
/// [`suggested_http_status`] for the wire mapping.
pub fn submit_execution<Q, R, S>(
    scheduler: &ExtensionScheduler<Q, R, S>,
    queue_name: &str,
    request: ExecutionRequest,
) -> Result<SubmitResponse, SchedulerError>
where
    Q: PendingQueue + Default,
    R: ExtensionRegistry,
    S: Spawn + Clone + Send + Sync + 'static,
{
    let execution_id = scheduler.submit(queue_name, request)?;
    Ok(SubmitResponse { execution_id })
}

/// Look up the current status of an execution, preferring the result
/// store's view once the record has left pending.
pub fn execution_status<Q, R, S>(
    scheduler: &ExtensionScheduler<Q, R, S>,
    id: &ExecutionId,
) -> Option<ExecutionStatusResponse>
where
    Q: PendingQueue + Default,
    R: ExtensionRegistry,
    S: Spawn + Clone + Send + Sync + 'static,
{
    if let Some(result) = scheduler.get_result(id) {
        return Some(ExecutionStatusResponse {
            execution_id: result.execution_id,
            status: result.status,
            error: result.error,
        });
    }
    scheduler.get_execution(id).map(|record| ExecutionStatusResponse {
        execution_id: record.id,
        status: record.status,
        error: None,
    })
}

/// Build queue listings from a config snapshot.
#[must_use]
pub fn list_queues(cfg: &SchedulerConfig) -> Vec<QueueListing> {
    cfg.queues
        .iter()
        .map(|(name, queue)| QueueListing {
            name: name.clone(),
            max_concurrent: queue.max_concurrent,
            max_pending: queue.max_pending,
        })
        .collect()
}

/// Return a health payload.
#[must_use]
pub const fn health() -> Health {
    Health { ok: true }
}

/// Suggested HTTP status for a scheduler error: admission rejections map
/// onto 4xx, internal faults onto 5xx.
#[must_use]
pub const fn suggested_http_status(err: &SchedulerError) -> u16 {
    match err {
        SchedulerError::UnknownQueue(_) => 404,
        SchedulerError::QueueFull { .. } => 429,
        SchedulerError::QueueExists(_) | SchedulerError::DuplicateExecution(_) => 409,
        SchedulerError::InvalidTimeout | SchedulerError::InvalidQueueConfig(_) => 400,
        SchedulerError::Internal(_) => 500,
    }
}
