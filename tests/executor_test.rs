use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use isojs::error::ExecError;
use isojs::executor::Executor;
use isojs::registry::Registry;
use serde_json::json;
use tokio::time::Instant;

fn executor(max_script_size: usize) -> (Executor, Arc<Registry>) {
    let registry = Arc::new(Registry::new());
    (Executor::new(Arc::clone(&registry), max_script_size), registry)
}

fn deadline_in(duration: Duration) -> Instant {
    Instant::now() + duration
}

async fn wait_until_empty(registry: &Registry) {
    for _ in 0..100 {
        if registry.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry did not drain");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_successful_evaluation() {
    let (executor, registry) = executor(1024);
    let result = executor
        .execute(Bytes::from_static(b"2 + 3;"), deadline_in(Duration::from_secs(5)))
        .await;
    assert_eq!(result.unwrap(), json!(5));
    wait_until_empty(&registry).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_engine_failure_is_reported() {
    let (executor, registry) = executor(1024);
    let result = executor
        .execute(
            Bytes::from_static(b"throw new Error('boom');"),
            deadline_in(Duration::from_secs(5)),
        )
        .await;
    match result {
        Err(ExecError::Engine(detail)) => assert!(detail.contains("boom")),
        other => panic!("expected engine failure, got {other:?}"),
    }
    wait_until_empty(&registry).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadline_interrupts_runaway_script() {
    let (executor, registry) = executor(1024);
    let started = std::time::Instant::now();
    let result = executor
        .execute(
            Bytes::from_static(b"while (true) {}"),
            deadline_in(Duration::from_millis(200)),
        )
        .await;
    assert_eq!(result, Err(ExecError::Timeout));
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "deadline overshoot: {:?}",
        started.elapsed()
    );
    wait_until_empty(&registry).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_all_interrupts_running_script() {
    let (executor, registry) = executor(1024);
    let registry_for_cancel = Arc::clone(&registry);

    let cancel = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        registry_for_cancel.cancel_all();
    });

    let result = executor
        .execute(
            Bytes::from_static(b"while (true) {}"),
            deadline_in(Duration::from_secs(10)),
        )
        .await;
    assert_eq!(result, Err(ExecError::Interrupted));
    cancel.await.unwrap();
    wait_until_empty(&registry).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_evaluations_after_cancel_all_are_unaffected() {
    let (executor, registry) = executor(1024);
    registry.cancel_all();

    let result = executor
        .execute(Bytes::from_static(b"1 + 1;"), deadline_in(Duration::from_secs(5)))
        .await;
    assert_eq!(result.unwrap(), json!(2));
    wait_until_empty(&registry).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_source_is_rejected_before_vm_construction() {
    let (executor, registry) = executor(8);
    let result = executor
        .execute(
            Bytes::from_static(b"'this source is too long';"),
            deadline_in(Duration::from_secs(5)),
        )
        .await;
    assert_eq!(result, Err(ExecError::ScriptTooLarge));
    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_registry_tracks_evaluation_while_running() {
    let (executor, registry) = executor(1024);
    let registry_probe = Arc::clone(&registry);

    let probe = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let live = registry_probe.len();
        registry_probe.cancel_all();
        live
    });

    let _ = executor
        .execute(
            Bytes::from_static(b"while (true) {}"),
            deadline_in(Duration::from_secs(10)),
        )
        .await;
    assert_eq!(probe.await.unwrap(), 1);
    wait_until_empty(&registry).await;
}
