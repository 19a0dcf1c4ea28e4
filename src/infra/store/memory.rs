//! In-memory result store with bounded retention.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;

use crate::core::execution::{ExecutionResult, ExecutionStatus};
use crate::util::clock::now_ms;
use crate::util::ids::ExecutionId;

/// Map from execution id to its result, plus the terminal-write order the
/// retention pass evicts in.
///
/// A result entry is opened (status `Running`) the moment its execution
/// leaves pending, and upgraded terminally exactly once: the first terminal
/// write wins, later writes are ignored.
#[derive(Default)]
pub struct InMemoryResultStore {
    results: HashMap<ExecutionId, ExecutionResult>,
    terminal_order: VecDeque<ExecutionId>,
}

impl InMemoryResultStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the transient entry for an execution that just left pending.
    pub fn open(&mut self, id: &ExecutionId) {
        self.results
            .entry(id.clone())
            .or_insert_with(|| ExecutionResult {
                execution_id: id.clone(),
                status: ExecutionStatus::Running,
                result: None,
                error: None,
                execution_time_ms: 0,
                completed_at_ms: None,
                metadata: HashMap::new(),
            });
    }

    /// Write the terminal outcome for `id`. Opens the entry if the
    /// execution went terminal without running (pending cancellation).
    ///
    /// Returns the stored result when this write won, `None` when a
    /// terminal result already existed (the earlier write stands).
    pub fn finalize(
        &mut self,
        id: &ExecutionId,
        status: ExecutionStatus,
        result: Option<Value>,
        error: Option<String>,
        execution_time_ms: u64,
    ) -> Option<ExecutionResult> {
        debug_assert!(status.is_terminal());
        self.open(id);
        let entry = self.results.get_mut(id)?;
        if entry.status.is_terminal() {
            return None;
        }
        entry.status = status;
        entry.result = result;
        entry.error = error;
        entry.execution_time_ms = execution_time_ms;
        entry.completed_at_ms = Some(now_ms());
        self.terminal_order.push_back(id.clone());
        Some(entry.clone())
    }

    /// Attach a metadata entry to an existing result.
    pub fn annotate(&mut self, id: &ExecutionId, key: impl Into<String>, value: impl Into<String>) {
        if let Some(entry) = self.results.get_mut(id) {
            entry.metadata.insert(key.into(), value.into());
        }
    }

    /// Look up a result by execution id.
    #[must_use]
    pub fn get(&self, id: &ExecutionId) -> Option<&ExecutionResult> {
        self.results.get(id)
    }

    /// Number of stored results (transient and terminal).
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of terminal results subject to retention.
    #[must_use]
    pub fn terminal_len(&self) -> usize {
        self.terminal_order.len()
    }

    /// Evict the oldest terminal results until at most `keep` remain.
    /// Returns the evicted ids so callers can drop their own bookkeeping.
    pub fn evict_terminal_beyond(&mut self, keep: usize) -> Vec<ExecutionId> {
        let mut evicted = Vec::new();
        while self.terminal_order.len() > keep {
            let Some(id) = self.terminal_order.pop_front() else {
                break;
            };
            self.results.remove(&id);
            evicted.push(id);
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> ExecutionId {
        ExecutionId::from(format!("exec-{n}"))
    }

    #[test]
    fn test_open_is_idempotent_and_transient() {
        let mut store = InMemoryResultStore::new();
        store.open(&id(1));
        store.open(&id(1));
        assert_eq!(store.len(), 1);
        let entry = store.get(&id(1)).unwrap();
        assert_eq!(entry.status, ExecutionStatus::Running);
        assert_eq!(store.terminal_len(), 0);
    }

    #[test]
    fn test_first_terminal_write_wins() {
        let mut store = InMemoryResultStore::new();
        store.open(&id(1));

        let written = store.finalize(
            &id(1),
            ExecutionStatus::Completed,
            Some(serde_json::json!({"ok": true})),
            None,
            12,
        );
        assert!(written.is_some());

        // A racing cancel must not overwrite the completed result.
        let second = store.finalize(&id(1), ExecutionStatus::Cancelled, None, None, 15);
        assert!(second.is_none());
        let entry = store.get(&id(1)).unwrap();
        assert_eq!(entry.status, ExecutionStatus::Completed);
        assert_eq!(entry.execution_time_ms, 12);
    }

    #[test]
    fn test_finalize_without_open() {
        let mut store = InMemoryResultStore::new();
        // Pending cancellation writes a terminal result directly.
        let written = store.finalize(&id(2), ExecutionStatus::Cancelled, None, None, 0);
        assert!(written.is_some());
        assert_eq!(
            store.get(&id(2)).unwrap().status,
            ExecutionStatus::Cancelled
        );
    }

    #[test]
    fn test_eviction_is_oldest_first() {
        let mut store = InMemoryResultStore::new();
        for n in 0..5 {
            store.finalize(&id(n), ExecutionStatus::Completed, None, None, 1);
        }
        let evicted = store.evict_terminal_beyond(2);
        assert_eq!(evicted, vec![id(0), id(1), id(2)]);
        assert!(store.get(&id(0)).is_none());
        assert!(store.get(&id(3)).is_some());
        assert!(store.get(&id(4)).is_some());
        assert_eq!(store.terminal_len(), 2);
    }

    #[test]
    fn test_running_entries_survive_eviction() {
        let mut store = InMemoryResultStore::new();
        store.open(&id(10));
        store.finalize(&id(11), ExecutionStatus::Failed, None, Some("boom".into()), 3);
        let evicted = store.evict_terminal_beyond(0);
        assert_eq!(evicted, vec![id(11)]);
        // The transient entry is not subject to retention.
        assert!(store.get(&id(10)).is_some());
    }

    #[test]
    fn test_annotate() {
        let mut store = InMemoryResultStore::new();
        store.finalize(&id(1), ExecutionStatus::Completed, None, None, 1);
        store.annotate(&id(1), "queue", "default");
        assert_eq!(
            store.get(&id(1)).unwrap().metadata.get("queue").map(String::as_str),
            Some("default")
        );
    }
}
