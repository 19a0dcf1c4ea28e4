//! Scheduler statistics: lifetime counters and point-in-time breakdowns.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core::queue::QueueSnapshot;

/// Lifetime totals since scheduler construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatTotals {
    /// Executions accepted by admission control.
    pub submitted: u64,
    /// Submissions rejected at admission.
    pub rejected: u64,
    /// Executions that completed normally.
    pub completed: u64,
    /// Executions that failed.
    pub failed: u64,
    /// Executions that exceeded their timeout.
    pub timed_out: u64,
    /// Executions cancelled before or during execution.
    pub cancelled: u64,
    /// Currently pending, across all queues.
    pub pending: u64,
    /// Currently running, across all queues.
    pub active: u64,
}

/// Full statistics snapshot.
///
/// Computed from atomic counters plus brief per-queue lock snapshots;
/// reading it never pauses dispatch, so the view is eventually consistent
/// with in-flight transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Lifetime totals and live gauges.
    pub totals: StatTotals,
    /// Live execution counts keyed by status name.
    pub by_status: BTreeMap<String, u64>,
    /// Live execution counts keyed by priority tier.
    pub by_priority: BTreeMap<String, u64>,
    /// Per-queue bookkeeping snapshots keyed by queue name.
    pub by_queue: BTreeMap<String, QueueSnapshot>,
}

/// Internal lock-free counters backing [`StatTotals`].
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub submitted: AtomicU64,
    pub rejected: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
    pub cancelled: AtomicU64,
}

impl SchedulerCounters {
    /// Snapshot the counters, filling live gauges from the caller.
    pub fn snapshot(&self, pending: u64, active: u64) -> StatTotals {
        StatTotals {
            submitted: self.submitted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            pending,
            active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = SchedulerCounters::default();
        counters.submitted.fetch_add(7, Ordering::Relaxed);
        counters.completed.fetch_add(4, Ordering::Relaxed);
        counters.timed_out.fetch_add(1, Ordering::Relaxed);

        let totals = counters.snapshot(2, 1);
        assert_eq!(totals.submitted, 7);
        assert_eq!(totals.completed, 4);
        assert_eq!(totals.timed_out, 1);
        assert_eq!(totals.pending, 2);
        assert_eq!(totals.active, 1);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = SchedulerStats::default();
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("by_status"));
        assert!(json.contains("by_queue"));
    }
}
