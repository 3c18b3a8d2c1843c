//! Process manager behaviour against scripted in-memory transports.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};

use a11y_bridge::host::{ProcessManager, SubprocessRole};
use a11y_bridge::models::ErrorCode;

use super::test_helpers::{request, MockFactory};

const MARGIN: Duration = Duration::from_millis(50);
const BUDGET: Duration = Duration::from_secs(5);

// ── Lazy start ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn nothing_is_spawned_before_first_call() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    assert!(!manager.is_worker_process_available());
    assert!(!manager.is_monitor_process_available());
    assert_eq!(manager.worker_pid(), None);
    assert_eq!(state.connects(), 0);
}

#[tokio::test]
async fn first_call_spawns_and_later_calls_reuse() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let first = manager
        .execute(SubprocessRole::Worker, request("Echo", "a", json!({})), BUDGET)
        .await;
    let second = manager
        .execute(SubprocessRole::Worker, request("Echo", "b", json!({})), BUDGET)
        .await;

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(second.request_id(), Some("b"));
    assert_eq!(state.connects(), 1);
    assert_eq!(manager.worker_pid(), Some(1001));
    assert!(manager.is_worker_process_available());
    assert!(!manager.is_monitor_process_available());
}

// ── Ordering ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn calls_to_one_subprocess_never_interleave() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let (a, b, c) = tokio::join!(
        manager.execute(SubprocessRole::Worker, request("Slow", "a", json!({"ms": 80})), BUDGET),
        manager.execute(SubprocessRole::Worker, request("Slow", "b", json!({"ms": 10})), BUDGET),
        manager.execute(SubprocessRole::Worker, request("Echo", "c", json!({})), BUDGET),
    );

    assert_eq!(a.request_id(), Some("a"));
    assert_eq!(b.request_id(), Some("b"));
    assert_eq!(c.request_id(), Some("c"));
    assert_eq!(
        state.events(),
        [
            "worker:write:a",
            "worker:read:a",
            "worker:write:b",
            "worker:read:b",
            "worker:write:c",
            "worker:read:c",
        ]
    );
}

#[tokio::test]
async fn roles_do_not_wait_for_each_other() {
    let (_state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let slow_worker = manager.execute(
        SubprocessRole::Worker,
        request("Slow", "w", json!({"ms": 500})),
        BUDGET,
    );
    let quick_monitor = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = Instant::now();
        let result = manager
            .execute(SubprocessRole::Monitor, request("Echo", "m", json!({})), BUDGET)
            .await;
        (result, started.elapsed())
    };

    let (worker, (monitor, monitor_elapsed)) = tokio::join!(slow_worker, quick_monitor);
    assert!(worker.is_success());
    assert!(monitor.is_success());
    assert!(monitor_elapsed < Duration::from_millis(250), "{monitor_elapsed:?}");
}

#[tokio::test]
async fn availability_check_does_not_block_on_a_call() {
    let (_state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let in_flight = manager.execute(
        SubprocessRole::Worker,
        request("Slow", "a", json!({"ms": 400})),
        BUDGET,
    );
    let probe = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        let available = manager.is_worker_process_available();
        (available, started.elapsed())
    };

    let (_result, (available, elapsed)) = tokio::join!(in_flight, probe);
    assert!(available);
    assert!(elapsed < Duration::from_millis(50), "{elapsed:?}");
}

// ── Recycling ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn unresponsive_subprocess_is_replaced() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let started = Instant::now();
    let hung = manager
        .execute(
            SubprocessRole::Worker,
            request("Hang", "h", json!({})),
            Duration::from_millis(100),
        )
        .await;
    assert_eq!(hung.error_code(), Some(ErrorCode::TimeoutError));
    assert_eq!(hung.request_id(), Some("h"));
    assert!(started.elapsed() >= Duration::from_millis(150));
    assert_eq!(state.terminations(), 1);
    assert!(!manager.is_worker_process_available());

    let next = manager
        .execute(SubprocessRole::Worker, request("Echo", "n", json!({})), BUDGET)
        .await;
    assert!(next.is_success());
    assert_eq!(state.connects(), 2);
    assert_eq!(manager.worker_pid(), Some(1002));
}

#[tokio::test]
async fn crash_is_reported_and_next_call_respawns() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let crashed = manager
        .execute(SubprocessRole::Monitor, request("Crash", "x", json!({})), BUDGET)
        .await;
    assert_eq!(crashed.error_code(), Some(ErrorCode::ProcessCrashed));
    assert!(crashed.error_message().unwrap().contains("exited with code 3"));

    let next = manager
        .execute(SubprocessRole::Monitor, request("Echo", "y", json!({})), BUDGET)
        .await;
    assert!(next.is_success());
    assert_eq!(state.connects(), 2);
}

#[tokio::test]
async fn unreadable_response_is_a_protocol_violation() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let result = manager
        .execute(SubprocessRole::Worker, request("Garbage", "g", json!({})), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::SerializationError));
    assert_eq!(state.terminations(), 1);
}

#[tokio::test]
async fn response_for_another_request_is_rejected() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let result = manager
        .execute(SubprocessRole::Worker, request("WrongId", "mine", json!({})), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::SerializationError));
    assert_eq!(result.request_id(), Some("mine"));
    assert_eq!(state.terminations(), 1);
}

#[tokio::test]
async fn subprocess_reported_timeout_recycles() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let result = manager
        .execute(SubprocessRole::Worker, request("ReportTimeout", "t", json!({})), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::TimeoutError));
    assert_eq!(state.terminations(), 1);

    manager
        .execute(SubprocessRole::Worker, request("Echo", "u", json!({})), BUDGET)
        .await;
    assert_eq!(state.connects(), 2);
}

#[tokio::test]
async fn handler_failures_keep_the_subprocess() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let result = manager
        .execute(SubprocessRole::Worker, request("Nope", "n", json!({})), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::OperationNotFound));
    assert_eq!(state.terminations(), 0);
    assert!(manager.is_worker_process_available());
}

#[tokio::test]
async fn spawn_failure_is_process_unavailable() {
    let (_state, factory) = MockFactory::failing();
    let manager = ProcessManager::new(factory, MARGIN);

    let result = manager
        .execute(SubprocessRole::Worker, request("Echo", "a", json!({})), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::ProcessUnavailable));
    assert_eq!(result.request_id(), Some("a"));
    assert!(!manager.is_worker_process_available());
}

// ── Typed calls ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Echoed {
    pid: u32,
    parameters: Value,
}

#[tokio::test]
async fn typed_call_builds_frame_and_decodes_reply() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let result = manager
        .execute_worker_operation::<_, Echoed>(
            "Echo",
            &json!({"automationId": "btn1"}),
            Duration::from_millis(1500),
        )
        .await;
    let echoed = result.into_result().unwrap();
    assert_eq!(echoed.pid, 1001);
    assert_eq!(echoed.parameters, json!({"automationId": "btn1"}));

    let frames = state.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].operation_name, "Echo");
    assert_eq!(frames[0].timeout_seconds, Some(2));
    assert!(frames[0].request_id.is_some());
}

#[tokio::test]
async fn typed_call_with_wrong_shape_is_serialization_error() {
    let (_state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    let result = manager
        .execute_monitor_operation::<_, Echoed>("Slow", &json!({"ms": 1}), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::SerializationError));
    assert!(manager.is_monitor_process_available());
}

// ── Shutdown ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_closes_running_subprocesses() {
    let (state, factory) = MockFactory::new();
    let manager = ProcessManager::new(factory, MARGIN);

    manager
        .execute(SubprocessRole::Worker, request("Echo", "a", json!({})), BUDGET)
        .await;
    manager.shutdown(Duration::from_millis(100)).await;

    assert_eq!(state.shutdowns.load(Ordering::SeqCst), 1);
    assert!(!manager.is_worker_process_available());
    assert_eq!(manager.worker_pid(), None);
}
