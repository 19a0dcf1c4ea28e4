//! Integration tests for cancellation, timeouts, failure capture, and
//! retention.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use extension_dispatch::core::{
    ExecutionObserver, ExecutionRecord, ExecutionRequest, ExecutionResult, ExecutionStatus,
    ExtensionCall, ExtensionError, ExtensionRegistry, ExtensionScheduler, RecordingObserver,
    SchedulerOptions,
};
use extension_dispatch::infra::queue::InMemoryPendingQueue;
use extension_dispatch::runtime::TokioSpawner;
use extension_dispatch::util::ids::ExecutionId;

#[derive(Clone, Default)]
struct MockRegistry {
    invocations: Arc<AtomicUsize>,
}

impl MockRegistry {
    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtensionRegistry for MockRegistry {
    fn is_loaded(&self, extension_id: &str) -> bool {
        extension_id != "ext.missing"
    }

    async fn invoke(
        &self,
        extension_id: &str,
        call: ExtensionCall,
        cancel: CancellationToken,
    ) -> Result<Value, ExtensionError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let delay = call
            .params
            .get("delay_ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10u64);
        match extension_id {
            "ext.fail" => Err(ExtensionError::Runtime("synthetic failure".into())),
            "ext.block" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Value::Null)
            }
            "ext.cooperative" => tokio::select! {
                () = cancel.cancelled() => Err(ExtensionError::Runtime("stopped".into())),
                () = tokio::time::sleep(Duration::from_millis(delay)) => Ok(json!({"done": true})),
            },
            _ => {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(call.request)
            }
        }
    }
}

type TestScheduler = ExtensionScheduler<InMemoryPendingQueue, MockRegistry, TokioSpawner>;

fn scheduler_with(
    max_concurrent: usize,
    retention_limit: usize,
) -> (TestScheduler, MockRegistry) {
    let registry = MockRegistry::default();
    let sched = ExtensionScheduler::<InMemoryPendingQueue, _, _>::new(
        registry.clone(),
        TokioSpawner::current(),
        SchedulerOptions {
            tick_interval: Duration::from_millis(10),
            retention_limit,
        },
    );
    sched
        .create_queue("default", max_concurrent, 32, Duration::from_secs(30))
        .unwrap();
    (sched, registry)
}

fn request(extension_id: &str) -> ExecutionRequest {
    ExecutionRequest::new(extension_id, json!({"n": 1}))
}

async fn wait_for_status(sched: &TestScheduler, id: &ExecutionId, status: ExecutionStatus) {
    for _ in 0..200 {
        if sched.get_execution(id).map(|r| r.status) == Some(status) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {id} never reached {status:?}");
}

#[tokio::test]
async fn test_cancel_pending_never_starts() {
    let (sched, registry) = scheduler_with(1, 100);

    // Dispatcher not started yet, so the record is guaranteed pending.
    let id = sched.submit("default", request("ext.echo")).unwrap();
    assert!(sched.cancel(&id));

    let record = sched.get_execution(&id).unwrap();
    assert_eq!(record.status, ExecutionStatus::Cancelled);
    assert!(record.started_at_ms.is_none());
    assert_eq!(
        sched.get_result(&id).unwrap().status,
        ExecutionStatus::Cancelled
    );

    // Even after dispatch begins, the cancelled record never runs.
    sched.start();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.invocations(), 0);
    assert_eq!(
        sched.get_execution(&id).unwrap().status,
        ExecutionStatus::Cancelled
    );

    // Cancelling a terminal execution is a no-op.
    assert!(!sched.cancel(&id));

    sched.shutdown();
}

#[tokio::test]
async fn test_cancel_running_releases_capacity() {
    let (sched, _registry) = scheduler_with(1, 100);
    sched.start();

    let id = sched.submit("default", request("ext.block")).unwrap();
    wait_for_status(&sched, &id, ExecutionStatus::Running).await;

    assert!(sched.cancel(&id));
    wait_for_status(&sched, &id, ExecutionStatus::Cancelled).await;

    let result = sched.get_result(&id).unwrap();
    assert_eq!(result.status, ExecutionStatus::Cancelled);

    // The worker slot is free again: new work runs to completion.
    let next = sched.submit("default", request("ext.echo")).unwrap();
    wait_for_status(&sched, &next, ExecutionStatus::Completed).await;

    let stats = sched.get_statistics();
    assert_eq!(stats.totals.cancelled, 1);
    assert_eq!(stats.totals.active, 0);

    sched.shutdown();
}

#[tokio::test]
async fn test_cooperative_extension_observes_cancellation() {
    let (sched, _registry) = scheduler_with(1, 100);
    sched.start();

    let id = sched
        .submit(
            "default",
            request("ext.cooperative").with_param("delay_ms", "3600000"),
        )
        .unwrap();
    wait_for_status(&sched, &id, ExecutionStatus::Running).await;

    assert!(sched.cancel(&id));
    wait_for_status(&sched, &id, ExecutionStatus::Cancelled).await;
    assert_eq!(
        sched.get_result(&id).unwrap().status,
        ExecutionStatus::Cancelled
    );

    sched.shutdown();
}

#[tokio::test]
async fn test_cancel_completed_returns_false_and_preserves_result() {
    let (sched, _registry) = scheduler_with(2, 100);
    sched.start();

    let id = sched.submit("default", request("ext.echo")).unwrap();
    wait_for_status(&sched, &id, ExecutionStatus::Completed).await;

    assert!(!sched.cancel(&id));
    let result = sched.get_result(&id).unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.result, Some(json!({"n": 1})));

    sched.shutdown();
}

#[tokio::test]
async fn test_cancel_unknown_id_is_noop() {
    let (sched, _registry) = scheduler_with(1, 100);
    assert!(!sched.cancel(&ExecutionId::from("no-such-execution")));
}

#[tokio::test]
async fn test_timeout_yields_distinct_status() {
    let (sched, _registry) = scheduler_with(1, 100);
    sched.start();

    let id = sched
        .submit(
            "default",
            request("ext.block").with_timeout(Duration::from_millis(100)),
        )
        .unwrap();
    wait_for_status(&sched, &id, ExecutionStatus::TimedOut).await;

    let result = sched.get_result(&id).unwrap();
    assert_eq!(result.status, ExecutionStatus::TimedOut);
    assert!(result.execution_time_ms >= 100);
    assert!(result.result.is_none());

    let stats = sched.get_statistics();
    assert_eq!(stats.totals.timed_out, 1);
    assert_eq!(stats.totals.failed, 0);

    sched.shutdown();
}

#[tokio::test]
async fn test_extension_error_captured_as_failed() {
    let (sched, _registry) = scheduler_with(1, 100);
    sched.start();

    let id = sched.submit("default", request("ext.fail")).unwrap();
    wait_for_status(&sched, &id, ExecutionStatus::Failed).await;

    let result = sched.get_result(&id).unwrap();
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.result.is_none());
    assert!(result.error.as_deref().unwrap().contains("synthetic failure"));

    // One extension's failure does not stall the dispatcher.
    let next = sched.submit("default", request("ext.echo")).unwrap();
    wait_for_status(&sched, &next, ExecutionStatus::Completed).await;

    sched.shutdown();
}

#[tokio::test]
async fn test_unloadable_extension_fails_without_running() {
    let (sched, registry) = scheduler_with(2, 100);
    sched.start();

    let id = sched.submit("default", request("ext.missing")).unwrap();
    wait_for_status(&sched, &id, ExecutionStatus::Failed).await;

    let record = sched.get_execution(&id).unwrap();
    assert!(record.started_at_ms.is_none());

    let result = sched.get_result(&id).unwrap();
    assert!(result.error.as_deref().unwrap().contains("not loaded"));
    assert_eq!(registry.invocations(), 0);

    sched.shutdown();
}

#[tokio::test]
async fn test_retention_evicts_oldest_results() {
    // max_concurrent=1 keeps completion order equal to submission order.
    let (sched, _registry) = scheduler_with(1, 3);
    sched.start();

    let ids: Vec<ExecutionId> = (0..6)
        .map(|n| {
            sched
                .submit(
                    "default",
                    request("ext.echo").with_id(format!("keep-{n}").as_str()),
                )
                .unwrap()
        })
        .collect();

    for id in &ids {
        // Wait until each leaves pending before checking the tail, so the
        // eviction order stays deterministic.
        for _ in 0..200 {
            let gone = sched.get_execution(id).is_none();
            let terminal = sched
                .get_execution(id)
                .is_some_and(|r| r.status.is_terminal());
            if gone || terminal {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Oldest three evicted, newest three retrievable.
    for id in &ids[..3] {
        assert!(sched.get_result(id).is_none(), "expected {id} evicted");
        assert!(sched.get_execution(id).is_none());
    }
    for id in &ids[3..] {
        assert_eq!(
            sched.get_result(id).unwrap().status,
            ExecutionStatus::Completed
        );
    }

    let stats = sched.get_statistics();
    assert_eq!(stats.by_queue.get("default").unwrap().completed, 3);

    sched.shutdown();
}

#[tokio::test]
async fn test_panicking_observer_does_not_stall_dispatch() {
    struct PanickingObserver;

    impl ExecutionObserver for PanickingObserver {
        fn on_completed(&self, _record: &ExecutionRecord, _result: &ExecutionResult) {
            panic!("observer bug");
        }
    }

    let (sched, _registry) = scheduler_with(1, 100);
    let recorder = Arc::new(RecordingObserver::new());
    sched.register_observer(Arc::new(PanickingObserver));
    sched.register_observer(recorder.clone());
    sched.start();

    let a = sched.submit("default", request("ext.echo")).unwrap();
    wait_for_status(&sched, &a, ExecutionStatus::Completed).await;
    let b = sched.submit("default", request("ext.echo")).unwrap();
    wait_for_status(&sched, &b, ExecutionStatus::Completed).await;

    let completions = recorder
        .events()
        .iter()
        .filter(|e| e.status == ExecutionStatus::Completed)
        .count();
    assert_eq!(completions, 2);

    sched.shutdown();
}
