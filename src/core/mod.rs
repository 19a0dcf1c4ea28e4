//! Core scheduling abstractions: records, queues, dispatch, hooks.

pub mod error;
pub mod execution;
pub mod extension;
pub mod hooks;
pub mod queue;
pub mod scheduler;
pub mod stats;

pub use error::{AppResult, ExtensionError, SchedulerError};
pub use execution::{
    ExecutionPriority, ExecutionRecord, ExecutionRequest, ExecutionResult, ExecutionStatus,
};
pub use extension::{ExtensionCall, ExtensionRegistry};
pub use hooks::{
    CallbackObserver, ExecutionEvent, ExecutionObserver, HookRegistry, RecordingObserver,
};
pub use queue::{ExecutionQueue, PendingEntry, PendingQueue, QueueLimits, QueueSnapshot};
pub use scheduler::{ExtensionScheduler, SchedulerOptions, Spawn};
pub use stats::{SchedulerStats, StatTotals};
