//! The execution scheduler: admission, dispatch, worker wrapping, and
//! retention.
//!
//! One dispatcher loop coordinates many concurrently running worker tasks.
//! The loop polls on a short fixed tick, scanning every queue and filling
//! free worker slots in (priority desc, submission order) priority; each
//! admitted execution runs as its own task under a wall-clock timeout and a
//! cancellation token. All terminal outcomes funnel through a single
//! finalize path that releases the running slot before any hook fires.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::error::SchedulerError;
use crate::core::execution::{
    ExecutionRecord, ExecutionRequest, ExecutionResult, ExecutionStatus,
};
use crate::core::extension::{ExtensionCall, ExtensionRegistry};
use crate::core::hooks::{ExecutionObserver, HookRegistry};
use crate::core::queue::{ExecutionQueue, PendingEntry, PendingQueue, QueueLimits};
use crate::core::stats::{SchedulerCounters, SchedulerStats};
use crate::infra::store::memory::InMemoryResultStore;
use crate::util::clock::now_ms;
use crate::util::ids::ExecutionId;

/// Abstraction for spawning scheduler tasks on a runtime.
pub trait Spawn {
    /// Spawn an async task.
    fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static;
}

/// Tunables that apply to the scheduler as a whole (queue limits are
/// per-queue, see [`QueueLimits`]).
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Dispatcher poll interval.
    pub tick_interval: Duration,
    /// Terminal results retained before oldest-first eviction.
    pub retention_limit: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            retention_limit: 100,
        }
    }
}

/// Outcome of one worker invocation, before it is written to the store.
enum WorkerOutcome {
    Completed(Value),
    Failed(String),
    TimedOut,
    Cancelled,
}

impl WorkerOutcome {
    const fn status(&self) -> ExecutionStatus {
        match self {
            Self::Completed(_) => ExecutionStatus::Completed,
            Self::Failed(_) => ExecutionStatus::Failed,
            Self::TimedOut => ExecutionStatus::TimedOut,
            Self::Cancelled => ExecutionStatus::Cancelled,
        }
    }
}

/// State shared between the scheduler handle, the dispatcher loop, and
/// every worker task.
struct SchedulerShared<Q> {
    queues: RwLock<HashMap<String, Arc<ExecutionQueue<Q>>>>,
    executions: Mutex<HashMap<ExecutionId, ExecutionRecord>>,
    results: Mutex<InMemoryResultStore>,
    cancellations: Mutex<HashMap<ExecutionId, CancellationToken>>,
    hooks: HookRegistry,
    counters: SchedulerCounters,
    seq: AtomicU64,
    retention_limit: usize,
}

impl<Q> SchedulerShared<Q> {
    fn queue(&self, name: &str) -> Option<Arc<ExecutionQueue<Q>>> {
        self.queues.read().get(name).cloned()
    }
}

/// The extension execution scheduler.
///
/// Owns its queues, records, results, and hooks explicitly; independent
/// instances do not share state. The handle is cheap to clone and all
/// methods take `&self`, so submission and cancellation can be called
/// concurrently from many tasks.
pub struct ExtensionScheduler<Q, R, S> {
    shared: Arc<SchedulerShared<Q>>,
    registry: R,
    spawner: S,
    tick_interval: Duration,
    shutdown: CancellationToken,
}

impl<Q, R: Clone, S: Clone> Clone for ExtensionScheduler<Q, R, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            registry: self.registry.clone(),
            spawner: self.spawner.clone(),
            tick_interval: self.tick_interval,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<Q, R, S> ExtensionScheduler<Q, R, S>
where
    Q: PendingQueue + Default,
    R: ExtensionRegistry,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a scheduler with no queues. At least one queue must be
    /// created before submissions can be admitted.
    pub fn new(registry: R, spawner: S, options: SchedulerOptions) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                queues: RwLock::new(HashMap::new()),
                executions: Mutex::new(HashMap::new()),
                results: Mutex::new(InMemoryResultStore::new()),
                cancellations: Mutex::new(HashMap::new()),
                hooks: HookRegistry::new(),
                counters: SchedulerCounters::default(),
                seq: AtomicU64::new(0),
                retention_limit: options.retention_limit,
            }),
            registry,
            spawner,
            tick_interval: options.tick_interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a named queue. Rejects duplicates rather than replacing a
    /// queue that may already hold work.
    pub fn create_queue(
        &self,
        name: &str,
        max_concurrent: usize,
        max_pending: usize,
        default_timeout: Duration,
    ) -> Result<(), SchedulerError> {
        if max_concurrent == 0 {
            return Err(SchedulerError::InvalidQueueConfig(
                "max_concurrent must be greater than 0".into(),
            ));
        }
        if max_pending == 0 {
            return Err(SchedulerError::InvalidQueueConfig(
                "max_pending must be greater than 0".into(),
            ));
        }
        if default_timeout.is_zero() {
            return Err(SchedulerError::InvalidQueueConfig(
                "default_timeout must be greater than 0".into(),
            ));
        }
        let mut queues = self.shared.queues.write();
        if queues.contains_key(name) {
            return Err(SchedulerError::QueueExists(name.to_string()));
        }
        let limits = QueueLimits {
            max_concurrent,
            max_pending,
            default_timeout,
        };
        queues.insert(
            name.to_string(),
            Arc::new(ExecutionQueue::new(name, limits, Q::default())),
        );
        tracing::info!(queue = name, max_concurrent, max_pending, "queue created");
        Ok(())
    }

    /// Register a lifecycle observer. Observers run synchronously on the
    /// dispatcher/worker task; a panicking observer is logged and skipped.
    pub fn register_observer(&self, observer: Arc<dyn ExecutionObserver>) {
        self.shared.hooks.register(observer);
    }

    /// Submit an execution into a named queue.
    ///
    /// Never blocks on worker completion; on success the record is visible
    /// as pending immediately.
    ///
    /// # Errors
    ///
    /// `UnknownQueue`, `QueueFull`, `DuplicateExecution`, or
    /// `InvalidTimeout` — all reported synchronously and never visible in
    /// the result store.
    pub fn submit(
        &self,
        queue_name: &str,
        request: ExecutionRequest,
    ) -> Result<ExecutionId, SchedulerError> {
        let outcome = self.admit(queue_name, request);
        match &outcome {
            Ok(id) => {
                self.shared.counters.submitted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(execution_id = %id, queue = queue_name, "execution admitted");
            }
            Err(err) => {
                self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(queue = queue_name, error = %err, "submission rejected");
            }
        }
        outcome
    }

    fn admit(
        &self,
        queue_name: &str,
        request: ExecutionRequest,
    ) -> Result<ExecutionId, SchedulerError> {
        let queue = self
            .shared
            .queue(queue_name)
            .ok_or_else(|| SchedulerError::UnknownQueue(queue_name.to_string()))?;

        let timeout = match request.timeout {
            Some(t) if !t.is_zero() => t,
            Some(_) => return Err(SchedulerError::InvalidTimeout),
            None => queue.limits().default_timeout,
        };
        let priority = request.priority.unwrap_or_default();
        let id = request.id.unwrap_or_else(ExecutionId::generate);
        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);

        let record = ExecutionRecord {
            id: id.clone(),
            extension_id: request.extension_id,
            queue: queue_name.to_string(),
            request: request.request,
            context: request.context,
            params: request.params,
            auth: request.auth,
            flags: request.flags,
            timeout,
            priority,
            status: ExecutionStatus::Pending,
            created_at_ms: now_ms(),
            started_at_ms: None,
            completed_at_ms: None,
        };

        {
            let mut executions = self.shared.executions.lock();
            if executions.contains_key(&id) {
                return Err(SchedulerError::DuplicateExecution(id));
            }
            executions.insert(id.clone(), record);
        }

        // Queue-depth rejection rolls the record back; nothing already
        // pending is ever evicted to make room.
        if let Err(err) = queue.admit(PendingEntry {
            priority,
            seq,
            id: id.clone(),
        }) {
            self.shared.executions.lock().remove(&id);
            return Err(err);
        }
        Ok(id)
    }

    /// Look up an execution record.
    #[must_use]
    pub fn get_execution(&self, id: &ExecutionId) -> Option<ExecutionRecord> {
        self.shared.executions.lock().get(id).cloned()
    }

    /// Look up an execution result. Present from the moment the execution
    /// leaves pending (transient `Running` entry) until retention evicts
    /// it.
    #[must_use]
    pub fn get_result(&self, id: &ExecutionId) -> Option<ExecutionResult> {
        self.shared.results.lock().get(id).cloned()
    }

    /// Cancel an execution.
    ///
    /// A pending execution is removed exactly and never starts. A running
    /// execution has its cancellation token fired: the worker writes the
    /// CANCELLED result and releases its slot promptly, and a child token
    /// inside the extension call lets cooperating extensions stop early.
    /// Returns false for terminal or unknown ids; never panics or errors.
    pub fn cancel(&self, id: &ExecutionId) -> bool {
        // The record lock is held across the pending-set removal so a
        // concurrent dispatch claim cannot start the record mid-cancel.
        let mut executions = self.shared.executions.lock();
        let Some(record) = executions.get_mut(id) else {
            return false;
        };
        match record.status {
            ExecutionStatus::Pending => {
                let queue = self.shared.queue(&record.queue);
                if let Some(q) = &queue {
                    // May return false if a dispatcher tick already claimed
                    // the entry; the Cancelled status below makes the
                    // dispatch guard drop it before it runs.
                    q.remove_pending(id);
                }
                record.status = ExecutionStatus::Cancelled;
                record.completed_at_ms = Some(now_ms());
                let snapshot = record.clone();
                // Written before the record lock drops so the result is
                // observable the instant the record has left pending.
                let result = self.shared.results.lock().finalize(
                    id,
                    ExecutionStatus::Cancelled,
                    None,
                    None,
                    0,
                );
                drop(executions);

                if let Some(q) = &queue {
                    q.record_terminal(id, false);
                }
                self.shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                tracing::info!(execution_id = %id, "pending execution cancelled");
                if let Some(result) = result {
                    self.shared.hooks.fire_terminal(&snapshot, &result);
                }
                true
            }
            ExecutionStatus::Running => {
                drop(executions);
                let token = self.shared.cancellations.lock().get(id).cloned();
                token.map_or(false, |token| {
                    tracing::info!(execution_id = %id, "cancellation signalled");
                    token.cancel();
                    true
                })
            }
            _ => false,
        }
    }

    /// Compute a statistics snapshot from live state without pausing the
    /// dispatcher. Eventually consistent with in-flight transitions.
    #[must_use]
    pub fn get_statistics(&self) -> SchedulerStats {
        let queues: Vec<Arc<ExecutionQueue<Q>>> =
            self.shared.queues.read().values().cloned().collect();

        let mut by_queue = BTreeMap::new();
        let mut pending: u64 = 0;
        let mut active: u64 = 0;
        for queue in &queues {
            let snap = queue.snapshot();
            pending += snap.pending as u64;
            active += snap.running as u64;
            by_queue.insert(snap.name.clone(), snap);
        }

        let mut by_status: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_priority: BTreeMap<String, u64> = BTreeMap::new();
        {
            let executions = self.shared.executions.lock();
            for record in executions.values() {
                *by_status.entry(record.status.as_str().to_string()).or_insert(0) += 1;
                *by_priority
                    .entry(record.priority.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }

        SchedulerStats {
            totals: self.shared.counters.snapshot(pending, active),
            by_status,
            by_priority,
            by_queue,
        }
    }

    /// Start the dispatcher loop on the configured spawner.
    ///
    /// The loop polls every `tick_interval`, dispatching and running
    /// retention; any per-iteration panic is caught, logged, and the loop
    /// continues. Call [`shutdown`](Self::shutdown) to stop it.
    pub fn start(&self) {
        let scheduler = self.clone();
        let shutdown = self.shutdown.clone();
        let tick = self.tick_interval;
        self.spawner.spawn(async move {
            tracing::info!(tick_ms = tick.as_millis() as u64, "dispatcher started");
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        tracing::info!("dispatcher shutting down");
                        break;
                    }
                    _ = interval.tick() => {}
                }
                if catch_unwind(AssertUnwindSafe(|| scheduler.dispatch_tick())).is_err() {
                    tracing::error!("dispatch tick panicked; continuing");
                }
                if catch_unwind(AssertUnwindSafe(|| scheduler.enforce_retention())).is_err() {
                    tracing::error!("retention pass panicked; continuing");
                }
            }
        });
    }

    /// Stop the dispatcher loop. Running workers finish naturally; pending
    /// work stays queued and would resume if a new loop were started.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// One dispatcher pass: fill free worker slots on every queue.
    fn dispatch_tick(&self) {
        let queues: Vec<Arc<ExecutionQueue<Q>>> =
            self.shared.queues.read().values().cloned().collect();
        for queue in queues {
            while let Some(entry) = queue.claim_next() {
                self.launch(&queue, entry);
            }
        }
    }

    /// Move one claimed entry onto a worker, or finalize it in place when
    /// it cannot run.
    fn launch(&self, queue: &Arc<ExecutionQueue<Q>>, entry: PendingEntry) {
        let id = entry.id;

        // A cancellation may have won between the claim and here; drop the
        // slot without ever starting the record.
        let extension_id = {
            let executions = self.shared.executions.lock();
            match executions.get(&id) {
                Some(record) if record.status == ExecutionStatus::Pending => {
                    record.extension_id.clone()
                }
                _ => {
                    queue.release(&id);
                    return;
                }
            }
        };

        if !self.registry.is_loaded(&extension_id) {
            self.fail_unloadable(queue, &id);
            return;
        }

        let snapshot = {
            let mut executions = self.shared.executions.lock();
            match executions.get_mut(&id) {
                Some(record) if record.status == ExecutionStatus::Pending => {
                    record.status = ExecutionStatus::Running;
                    record.started_at_ms = Some(now_ms());
                    // Opened before the record lock drops: a result entry
                    // exists from the instant the record leaves pending.
                    self.shared.results.lock().open(&id);
                    record.clone()
                }
                _ => {
                    queue.release(&id);
                    return;
                }
            }
        };

        let token = CancellationToken::new();
        self.shared.cancellations.lock().insert(id.clone(), token.clone());

        tracing::debug!(
            execution_id = %id,
            extension_id = %snapshot.extension_id,
            queue = queue.name(),
            "execution started"
        );
        self.shared.hooks.fire_started(&snapshot);

        let shared = Arc::clone(&self.shared);
        let registry = self.registry.clone();
        let queue = Arc::clone(queue);
        self.spawner.spawn(async move {
            Self::run_worker(shared, registry, queue, snapshot, token).await;
        });
    }

    /// Finalize a claimed entry whose extension is not loadable: an
    /// immediate FAILED result, never handed to a worker.
    fn fail_unloadable(&self, queue: &Arc<ExecutionQueue<Q>>, id: &ExecutionId) {
        let (snapshot, result) = {
            let mut executions = self.shared.executions.lock();
            match executions.get_mut(id) {
                Some(record) if record.status == ExecutionStatus::Pending => {
                    record.status = ExecutionStatus::Failed;
                    record.completed_at_ms = Some(now_ms());
                    let error = format!("extension not loaded: {}", record.extension_id);
                    let mut results = self.shared.results.lock();
                    let written =
                        results.finalize(id, ExecutionStatus::Failed, None, Some(error), 0);
                    if written.is_some() {
                        results.annotate(id, "queue", record.queue.clone());
                    }
                    (record.clone(), written)
                }
                _ => {
                    queue.release(id);
                    return;
                }
            }
        };
        queue.release(id);
        queue.record_terminal(id, false);

        tracing::warn!(
            execution_id = %id,
            extension_id = %snapshot.extension_id,
            "extension not loaded; execution failed without running"
        );
        self.shared.counters.failed.fetch_add(1, Ordering::Relaxed);
        if let Some(result) = result {
            self.shared.hooks.fire_terminal(&snapshot, &result);
        }
    }

    /// Run one admitted execution under its timeout and cancellation
    /// token, then finalize whatever happened.
    async fn run_worker(
        shared: Arc<SchedulerShared<Q>>,
        registry: R,
        queue: Arc<ExecutionQueue<Q>>,
        record: ExecutionRecord,
        cancel: CancellationToken,
    ) {
        let call = ExtensionCall::from_record(&record);
        let started = Instant::now();
        let outcome = tokio::select! {
            () = cancel.cancelled() => WorkerOutcome::Cancelled,
            invoked = tokio::time::timeout(
                record.timeout,
                registry.invoke(&record.extension_id, call, cancel.child_token()),
            ) => match invoked {
                Ok(Ok(value)) => WorkerOutcome::Completed(value),
                Ok(Err(err)) => WorkerOutcome::Failed(err.to_string()),
                // The invocation future was dropped at the deadline; any
                // detached work it spawned is abandoned, not awaited.
                Err(_) => WorkerOutcome::TimedOut,
            },
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Self::finalize(&shared, &queue, &record, outcome, elapsed_ms);
    }

    /// The single terminal path for worker executions. Queue bookkeeping
    /// and capacity release happen before hooks fire, so observers can
    /// never leak a running slot.
    fn finalize(
        shared: &Arc<SchedulerShared<Q>>,
        queue: &Arc<ExecutionQueue<Q>>,
        record: &ExecutionRecord,
        outcome: WorkerOutcome,
        elapsed_ms: u64,
    ) {
        let status = outcome.status();
        let (payload, error) = match outcome {
            WorkerOutcome::Completed(value) => (Some(value), None),
            WorkerOutcome::Failed(message) => (None, Some(message)),
            WorkerOutcome::TimedOut => (
                None,
                Some(format!(
                    "execution exceeded timeout of {} ms",
                    record.timeout.as_millis()
                )),
            ),
            WorkerOutcome::Cancelled => (None, None),
        };

        let snapshot = {
            let mut executions = shared.executions.lock();
            executions.get_mut(&record.id).map(|stored| {
                if !stored.status.is_terminal() {
                    stored.status = status;
                    stored.completed_at_ms = Some(now_ms());
                }
                stored.clone()
            })
        };

        let result = {
            let mut results = shared.results.lock();
            let written = results.finalize(&record.id, status, payload, error, elapsed_ms);
            if written.is_some() {
                results.annotate(&record.id, "queue", record.queue.clone());
                results.annotate(&record.id, "extension_id", record.extension_id.clone());
                results.get(&record.id).cloned()
            } else {
                None
            }
        };

        queue.finish(&record.id, status == ExecutionStatus::Completed);
        shared.cancellations.lock().remove(&record.id);

        match status {
            ExecutionStatus::Completed => {
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(execution_id = %record.id, elapsed_ms, "execution completed");
            }
            ExecutionStatus::Failed => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(execution_id = %record.id, elapsed_ms, "execution failed");
            }
            ExecutionStatus::TimedOut => {
                shared.counters.timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(execution_id = %record.id, elapsed_ms, "execution timed out");
            }
            ExecutionStatus::Cancelled => {
                shared.counters.cancelled.fetch_add(1, Ordering::Relaxed);
                tracing::info!(execution_id = %record.id, elapsed_ms, "execution cancelled");
            }
            ExecutionStatus::Pending | ExecutionStatus::Running => {}
        }

        if let (Some(snapshot), Some(result)) = (snapshot, result) {
            shared.hooks.fire_terminal(&snapshot, &result);
        }
    }

    /// Evict terminal results beyond the retention limit, oldest first,
    /// dropping every piece of bookkeeping that references an evicted id.
    fn enforce_retention(&self) {
        let evicted = {
            self.shared
                .results
                .lock()
                .evict_terminal_beyond(self.shared.retention_limit)
        };
        if evicted.is_empty() {
            return;
        }
        tracing::debug!(count = evicted.len(), "evicting old execution results");
        for id in evicted {
            let record = self.shared.executions.lock().remove(&id);
            self.shared.cancellations.lock().remove(&id);
            if let Some(record) = record {
                if let Some(queue) = self.shared.queue(&record.queue) {
                    queue.forget(&id);
                }
            }
        }
    }
}
