//! Named execution queues and admission control.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;
use crate::core::execution::ExecutionPriority;
use crate::util::ids::ExecutionId;

/// Capacity configuration for one queue.
#[derive(Debug, Clone)]
pub struct QueueLimits {
    /// Worker ceiling: `|running|` never exceeds this.
    pub max_concurrent: usize,
    /// Admission ceiling: submissions are rejected at this pending depth.
    pub max_pending: usize,
    /// Timeout applied when a submission does not override it.
    pub default_timeout: Duration,
}

/// One admitted-but-not-yet-dispatched execution, as the pending set orders
/// it: priority first, then submission sequence for FIFO within a tier.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    /// Priority tier.
    pub priority: ExecutionPriority,
    /// Process-wide monotone submission sequence.
    pub seq: u64,
    /// The execution this entry admits.
    pub id: ExecutionId,
}

/// Abstraction for pending-set backends.
pub trait PendingQueue: Send + 'static {
    /// Add an entry. Depth enforcement happens at the queue level, before
    /// this is called.
    fn push(&mut self, entry: PendingEntry);
    /// Remove and return the next entry in (priority desc, seq asc) order.
    fn pop_next(&mut self) -> Option<PendingEntry>;
    /// Exactly remove the entry for `id`. Returns false if absent.
    fn remove(&mut self, id: &ExecutionId) -> bool;
    /// Number of live entries.
    fn len(&self) -> usize;
    /// Whether no live entries remain.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Point-in-time view of one queue's bookkeeping, for statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Queue name.
    pub name: String,
    /// Live pending entries.
    pub pending: usize,
    /// Currently running executions.
    pub running: usize,
    /// Completed ids still retained.
    pub completed: usize,
    /// Failed/timed-out/cancelled ids still retained.
    pub failed: usize,
    /// Worker ceiling.
    pub max_concurrent: usize,
    /// Admission ceiling.
    pub max_pending: usize,
}

struct QueueState<Q> {
    pending: Q,
    running: HashSet<ExecutionId>,
    completed: VecDeque<ExecutionId>,
    failed: VecDeque<ExecutionId>,
}

/// A named, bounded admission point.
///
/// All membership sets live behind one mutex; every transition that touches
/// two of them (pending → running, running → completed) happens in a single
/// critical section, so `|running| ≤ max_concurrent` holds at every
/// observable instant.
pub struct ExecutionQueue<Q> {
    name: String,
    limits: QueueLimits,
    state: Mutex<QueueState<Q>>,
}

impl<Q: PendingQueue> ExecutionQueue<Q> {
    /// Create a queue over the given pending backend.
    pub fn new(name: impl Into<String>, limits: QueueLimits, pending: Q) -> Self {
        Self {
            name: name.into(),
            limits,
            state: Mutex::new(QueueState {
                pending,
                running: HashSet::new(),
                completed: VecDeque::new(),
                failed: VecDeque::new(),
            }),
        }
    }

    /// Queue name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capacity configuration.
    #[must_use]
    pub const fn limits(&self) -> &QueueLimits {
        &self.limits
    }

    /// Admit an entry into the pending set, rejecting at `max_pending`.
    /// Existing work is never evicted to make room.
    pub fn admit(&self, entry: PendingEntry) -> Result<(), SchedulerError> {
        let mut state = self.state.lock();
        if state.pending.len() >= self.limits.max_pending {
            return Err(SchedulerError::QueueFull {
                queue: self.name.clone(),
                max_pending: self.limits.max_pending,
            });
        }
        state.pending.push(entry);
        Ok(())
    }

    /// Claim the next dispatch slot: if a worker slot is free, move the
    /// highest-priority pending entry into `running` and return it.
    ///
    /// The caller owns the claimed slot and must eventually release it via
    /// [`finish`](Self::finish) or [`release`](Self::release).
    pub fn claim_next(&self) -> Option<PendingEntry> {
        let mut state = self.state.lock();
        if state.running.len() >= self.limits.max_concurrent {
            return None;
        }
        let entry = state.pending.pop_next()?;
        state.running.insert(entry.id.clone());
        Some(entry)
    }

    /// Exactly remove a pending entry (cancellation of a pending
    /// execution). Returns false if the id is no longer pending here.
    pub fn remove_pending(&self, id: &ExecutionId) -> bool {
        self.state.lock().pending.remove(id)
    }

    /// Release a claimed slot without recording an outcome (the record was
    /// cancelled between claim and worker start).
    pub fn release(&self, id: &ExecutionId) {
        self.state.lock().running.remove(id);
    }

    /// Release a claimed slot and record the terminal id in the completed
    /// or failed list.
    pub fn finish(&self, id: &ExecutionId, completed: bool) {
        let mut state = self.state.lock();
        state.running.remove(id);
        if completed {
            state.completed.push_back(id.clone());
        } else {
            state.failed.push_back(id.clone());
        }
    }

    /// Record a terminal id that never claimed a slot (pending cancellation,
    /// extension not loadable).
    pub fn record_terminal(&self, id: &ExecutionId, completed: bool) {
        let mut state = self.state.lock();
        if completed {
            state.completed.push_back(id.clone());
        } else {
            state.failed.push_back(id.clone());
        }
    }

    /// Drop an evicted id from the completed/failed bookkeeping.
    pub fn forget(&self, id: &ExecutionId) {
        let mut state = self.state.lock();
        state.completed.retain(|c| c != id);
        state.failed.retain(|c| c != id);
    }

    /// Number of live pending entries.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of running executions.
    #[must_use]
    pub fn running_len(&self) -> usize {
        self.state.lock().running.len()
    }

    /// Snapshot the queue's bookkeeping for statistics.
    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock();
        QueueSnapshot {
            name: self.name.clone(),
            pending: state.pending.len(),
            running: state.running.len(),
            completed: state.completed.len(),
            failed: state.failed.len(),
            max_concurrent: self.limits.max_concurrent,
            max_pending: self.limits.max_pending,
        }
    }
}
