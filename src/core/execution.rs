//! Execution records, results, and the submission payload.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::ids::ExecutionId;

/// Priority tier used to choose which pending execution dispatches next.
///
/// Ordered: `Critical > High > Normal > Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPriority {
    /// Background work, dispatched last.
    Low,
    /// Default tier.
    #[default]
    Normal,
    /// Dispatched before normal work.
    High,
    /// Dispatched before everything else.
    Critical,
}

/// Lifecycle state of one execution.
///
/// `Pending → Running → {Completed, Failed, TimedOut}`, plus
/// `Pending → Cancelled` and `Running → Cancelled`. No transition leaves a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Admitted, waiting for a worker slot.
    Pending,
    /// Executing on a worker.
    Running,
    /// The extension returned normally.
    Completed,
    /// The extension returned an error.
    Failed,
    /// The invocation exceeded its wall-clock timeout.
    TimedOut,
    /// Cancelled before or during execution.
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::TimedOut | Self::Cancelled
        )
    }

    /// Stable snake_case label, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl ExecutionPriority {
    /// Stable snake_case label, matching the serde representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// One invocation attempt of an extension, tracked from admission to a
/// terminal status. Identity fields are fixed at submit time; only the
/// status and timestamps mutate afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique execution identifier.
    pub id: ExecutionId,
    /// Target extension identifier.
    pub extension_id: String,
    /// Queue that admitted this execution.
    pub queue: String,
    /// Opaque request payload handed to the extension.
    pub request: Value,
    /// Free-form invocation context.
    pub context: HashMap<String, Value>,
    /// Free-form string parameters.
    pub params: HashMap<String, String>,
    /// Authentication material forwarded to the extension.
    pub auth: HashMap<String, String>,
    /// Boolean feature flags for the invocation.
    pub flags: HashMap<String, bool>,
    /// Wall-clock timeout measured from worker start.
    pub timeout: Duration,
    /// Priority tier.
    pub priority: ExecutionPriority,
    /// Current lifecycle state.
    pub status: ExecutionStatus,
    /// Submission time (ms since epoch).
    pub created_at_ms: u128,
    /// Worker start time, once dispatched.
    pub started_at_ms: Option<u128>,
    /// Terminal transition time.
    pub completed_at_ms: Option<u128>,
}

/// Terminal (or transient, while running) outcome of one execution.
///
/// Exists from the moment the record leaves `Pending`; the first terminal
/// write is final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Back-reference to the execution record.
    pub execution_id: ExecutionId,
    /// Outcome status.
    pub status: ExecutionStatus,
    /// Payload returned by the extension, present only for `Completed`.
    pub result: Option<Value>,
    /// Captured error message, present for `Failed`.
    pub error: Option<String>,
    /// Measured execution time in milliseconds (zero until terminal).
    pub execution_time_ms: u64,
    /// Time of the terminal write (ms since epoch).
    pub completed_at_ms: Option<u128>,
    /// Free-form metadata attached at finalization.
    pub metadata: HashMap<String, String>,
}

/// Submission payload for [`submit`](crate::core::scheduler::ExtensionScheduler::submit).
///
/// Everything beyond the extension id and request is optional; unset fields
/// fall back to queue defaults at admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Target extension identifier.
    pub extension_id: String,
    /// Opaque request payload.
    pub request: Value,
    /// Free-form invocation context.
    #[serde(default)]
    pub context: HashMap<String, Value>,
    /// Free-form string parameters.
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Authentication material.
    #[serde(default)]
    pub auth: HashMap<String, String>,
    /// Boolean feature flags.
    #[serde(default)]
    pub flags: HashMap<String, bool>,
    /// Timeout override; the queue default applies when unset.
    #[serde(default)]
    pub timeout: Option<Duration>,
    /// Priority; `Normal` when unset.
    #[serde(default)]
    pub priority: Option<ExecutionPriority>,
    /// Caller-supplied execution id; generated when unset.
    #[serde(default)]
    pub id: Option<ExecutionId>,
}

impl ExecutionRequest {
    /// Build a request for `extension_id` with the given payload.
    #[must_use]
    pub fn new(extension_id: impl Into<String>, request: Value) -> Self {
        Self {
            extension_id: extension_id.into(),
            request,
            context: HashMap::new(),
            params: HashMap::new(),
            auth: HashMap::new(),
            flags: HashMap::new(),
            timeout: None,
            priority: None,
            id: None,
        }
    }

    /// Set the priority tier.
    #[must_use]
    pub fn with_priority(mut self, priority: ExecutionPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Override the queue's default timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Supply the execution id instead of generating one.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<ExecutionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add one context entry.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Add one string parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(ExecutionPriority::Critical > ExecutionPriority::High);
        assert!(ExecutionPriority::High > ExecutionPriority::Normal);
        assert!(ExecutionPriority::Normal > ExecutionPriority::Low);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::TimedOut.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_request_builder() {
        let req = ExecutionRequest::new("ext.echo", serde_json::json!({"msg": "hi"}))
            .with_priority(ExecutionPriority::High)
            .with_timeout(Duration::from_secs(5))
            .with_param("lang", "en")
            .with_context("locale", serde_json::json!("en-US"))
            .with_id("exec-1");
        assert_eq!(req.extension_id, "ext.echo");
        assert_eq!(req.priority, Some(ExecutionPriority::High));
        assert_eq!(req.timeout, Some(Duration::from_secs(5)));
        assert_eq!(req.params.get("lang").map(String::as_str), Some("en"));
        assert_eq!(req.context.get("locale"), Some(&serde_json::json!("en-US")));
        assert_eq!(req.id, Some(ExecutionId::from("exec-1")));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: ExecutionRequest =
            serde_json::from_str(r#"{"extension_id":"ext.echo","request":{"n":1}}"#).unwrap();
        assert!(req.context.is_empty());
        assert!(req.timeout.is_none());
        assert!(req.priority.is_none());
    }
}
