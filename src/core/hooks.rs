//! Lifecycle event hooks.
//!
//! Observers are called synchronously on the dispatcher/worker task, after
//! queue bookkeeping has already been updated, so a panicking observer can
//! never leak a running slot. Panics are caught and logged per observer;
//! remaining observers still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::core::execution::{ExecutionRecord, ExecutionResult, ExecutionStatus};
use crate::util::clock::now_ms;
use crate::util::ids::ExecutionId;

/// Lifecycle events an observer can subscribe to. All methods default to
/// no-ops; implement only the ones you need.
pub trait ExecutionObserver: Send + Sync {
    /// An execution moved from pending onto a worker.
    fn on_started(&self, _record: &ExecutionRecord) {}
    /// An execution completed normally.
    fn on_completed(&self, _record: &ExecutionRecord, _result: &ExecutionResult) {}
    /// An execution failed with a captured error.
    fn on_failed(&self, _record: &ExecutionRecord, _result: &ExecutionResult) {}
    /// An execution exceeded its wall-clock timeout.
    fn on_timeout(&self, _record: &ExecutionRecord, _result: &ExecutionResult) {}
    /// An execution was cancelled before or during execution.
    fn on_cancelled(&self, _record: &ExecutionRecord, _result: &ExecutionResult) {}
}

/// Observer fan-out list with per-observer panic isolation.
#[derive(Default)]
pub struct HookRegistry {
    observers: RwLock<Vec<Arc<dyn ExecutionObserver>>>,
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Observers are invoked in registration order.
    pub fn register(&self, observer: Arc<dyn ExecutionObserver>) {
        self.observers.write().push(observer);
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Fire the started hook.
    pub fn fire_started(&self, record: &ExecutionRecord) {
        self.fire(record, |obs| obs.on_started(record));
    }

    /// Fire the hook matching a terminal result's status.
    pub fn fire_terminal(&self, record: &ExecutionRecord, result: &ExecutionResult) {
        match result.status {
            ExecutionStatus::Completed => self.fire(record, |obs| obs.on_completed(record, result)),
            ExecutionStatus::Failed => self.fire(record, |obs| obs.on_failed(record, result)),
            ExecutionStatus::TimedOut => self.fire(record, |obs| obs.on_timeout(record, result)),
            ExecutionStatus::Cancelled => self.fire(record, |obs| obs.on_cancelled(record, result)),
            ExecutionStatus::Pending | ExecutionStatus::Running => {}
        }
    }

    fn fire<F>(&self, record: &ExecutionRecord, call: F)
    where
        F: Fn(&dyn ExecutionObserver),
    {
        let observers = self.observers.read().clone();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| call(observer.as_ref()))).is_err() {
                tracing::error!(
                    execution_id = %record.id,
                    "execution observer panicked; continuing"
                );
            }
        }
    }
}

/// Boxed hook closure taking a record and its result.
pub type HookFn = Box<dyn Fn(&ExecutionRecord, &ExecutionResult) + Send + Sync>;

/// Boxed hook closure taking only the record (start has no result yet).
pub type StartHookFn = Box<dyn Fn(&ExecutionRecord) + Send + Sync>;

/// Adapter turning plain closures into an [`ExecutionObserver`], for callers
/// that want per-event callbacks instead of implementing the trait.
#[derive(Default)]
pub struct CallbackObserver {
    on_started: Option<StartHookFn>,
    on_completed: Option<HookFn>,
    on_failed: Option<HookFn>,
    on_timeout: Option<HookFn>,
    on_cancelled: Option<HookFn>,
}

impl CallbackObserver {
    /// Create an adapter with no callbacks set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the started callback.
    #[must_use]
    pub fn on_started(mut self, f: impl Fn(&ExecutionRecord) + Send + Sync + 'static) -> Self {
        self.on_started = Some(Box::new(f));
        self
    }

    /// Set the completed callback.
    #[must_use]
    pub fn on_completed(
        mut self,
        f: impl Fn(&ExecutionRecord, &ExecutionResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_completed = Some(Box::new(f));
        self
    }

    /// Set the failed callback.
    #[must_use]
    pub fn on_failed(
        mut self,
        f: impl Fn(&ExecutionRecord, &ExecutionResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_failed = Some(Box::new(f));
        self
    }

    /// Set the timeout callback.
    #[must_use]
    pub fn on_timeout(
        mut self,
        f: impl Fn(&ExecutionRecord, &ExecutionResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_timeout = Some(Box::new(f));
        self
    }

    /// Set the cancelled callback.
    #[must_use]
    pub fn on_cancelled(
        mut self,
        f: impl Fn(&ExecutionRecord, &ExecutionResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_cancelled = Some(Box::new(f));
        self
    }
}

impl ExecutionObserver for CallbackObserver {
    fn on_started(&self, record: &ExecutionRecord) {
        if let Some(f) = &self.on_started {
            f(record);
        }
    }

    fn on_completed(&self, record: &ExecutionRecord, result: &ExecutionResult) {
        if let Some(f) = &self.on_completed {
            f(record, result);
        }
    }

    fn on_failed(&self, record: &ExecutionRecord, result: &ExecutionResult) {
        if let Some(f) = &self.on_failed {
            f(record, result);
        }
    }

    fn on_timeout(&self, record: &ExecutionRecord, result: &ExecutionResult) {
        if let Some(f) = &self.on_timeout {
            f(record, result);
        }
    }

    fn on_cancelled(&self, record: &ExecutionRecord, result: &ExecutionResult) {
        if let Some(f) = &self.on_cancelled {
            f(record, result);
        }
    }
}

/// One recorded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEvent {
    /// Execution the event belongs to.
    pub execution_id: ExecutionId,
    /// Status at the time of the event (`Running` for start events).
    pub status: ExecutionStatus,
    /// Event timestamp (ms since epoch).
    pub at_ms: u128,
}

/// Observer that records events in memory, for tests and diagnostics.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    fn push(&self, execution_id: &ExecutionId, status: ExecutionStatus) {
        self.events.lock().push(ExecutionEvent {
            execution_id: execution_id.clone(),
            status,
            at_ms: now_ms(),
        });
    }
}

impl ExecutionObserver for RecordingObserver {
    fn on_started(&self, record: &ExecutionRecord) {
        self.push(&record.id, ExecutionStatus::Running);
    }

    fn on_completed(&self, record: &ExecutionRecord, _result: &ExecutionResult) {
        self.push(&record.id, ExecutionStatus::Completed);
    }

    fn on_failed(&self, record: &ExecutionRecord, _result: &ExecutionResult) {
        self.push(&record.id, ExecutionStatus::Failed);
    }

    fn on_timeout(&self, record: &ExecutionRecord, _result: &ExecutionResult) {
        self.push(&record.id, ExecutionStatus::TimedOut);
    }

    fn on_cancelled(&self, record: &ExecutionRecord, _result: &ExecutionResult) {
        self.push(&record.id, ExecutionStatus::Cancelled);
    }
}
