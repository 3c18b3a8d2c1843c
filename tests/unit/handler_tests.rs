//! Unit tests for the Worker and Monitor handler sets, driven through the
//! executor the way the subprocess main loop drives them.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use a11y_bridge::automation::{AutomationBackend, EventSource, FixtureDesktop, UnavailableBackend};
use a11y_bridge::handlers::{monitor_registry, worker_registry};
use a11y_bridge::models::{ErrorCode, OperationResult};
use a11y_bridge::monitor::SessionManager;
use a11y_bridge::operations::OperationExecutor;

const BUDGET: Duration = Duration::from_secs(5);

const DESKTOP: &str = r#"{
    "elements": [
        { "automationId": "window", "name": "Main", "controlType": "Window" },
        { "automationId": "btn1", "name": "OK", "controlType": "Button",
          "patterns": ["Invoke"], "parent": "window" },
        { "automationId": "edit1", "controlType": "Edit",
          "patterns": ["Value"], "parent": "window" },
        { "automationId": "chk1", "controlType": "CheckBox",
          "patterns": ["Toggle"], "parent": "window" }
    ],
    "events": [
        { "delayMs": 1, "eventType": "Invoked", "source": "btn1" }
    ]
}"#;

fn fixture() -> Arc<FixtureDesktop> {
    Arc::new(FixtureDesktop::from_json_str(DESKTOP).unwrap())
}

fn worker(desktop: &Arc<FixtureDesktop>) -> OperationExecutor {
    let backend = Arc::clone(desktop) as Arc<dyn AutomationBackend>;
    OperationExecutor::new(Arc::new(worker_registry(&backend).unwrap()))
}

fn monitor(desktop: &Arc<FixtureDesktop>) -> (Arc<SessionManager>, OperationExecutor) {
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(desktop) as Arc<dyn EventSource>,
    ));
    let executor = OperationExecutor::new(Arc::new(monitor_registry(&sessions).unwrap()));
    (sessions, executor)
}

fn data(result: OperationResult) -> Value {
    assert!(result.is_success(), "unexpected failure: {:?}", result.error_details());
    result.into_result().unwrap()
}

// ── Registries ──────────────────────────────────────────────────────────────

#[test]
fn worker_serves_element_actions() {
    let executor = worker(&fixture());
    assert_eq!(
        executor.registry().list_registered(),
        ["GetElementInfo", "InvokeElement", "Ping", "SetElementValue", "ToggleElement"]
    );
}

#[test]
fn monitor_serves_session_operations() {
    let (_sessions, executor) = monitor(&fixture());
    assert_eq!(
        executor.registry().list_registered(),
        ["GetEventLog", "Ping", "StartEventMonitoring", "StopEventMonitoring"]
    );
}

// ── Worker ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invoke_element_succeeds() {
    let desktop = fixture();
    let result = worker(&desktop)
        .execute("InvokeElement", json!({"automationId": "btn1"}), BUDGET)
        .await;

    assert_eq!(data(result), json!({"automationId": "btn1", "invoked": true}));
    assert_eq!(desktop.invocation_count("btn1"), 1);
}

#[tokio::test]
async fn invoke_unknown_element_fails() {
    let result = worker(&fixture())
        .execute("InvokeElement", json!({"automationId": "btn9"}), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::ElementNotFound));
}

#[tokio::test]
async fn empty_query_fails_validation() {
    let desktop = fixture();
    let result = worker(&desktop)
        .execute("InvokeElement", json!({}), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::ValidationFailed));
    assert_eq!(desktop.invocation_count("btn1"), 0);
}

#[tokio::test]
async fn set_value_reports_new_value() {
    let result = worker(&fixture())
        .execute(
            "SetElementValue",
            json!({"automationId": "edit1", "value": "hello"}),
            BUDGET,
        )
        .await;
    assert_eq!(data(result), json!({"automationId": "edit1", "value": "hello"}));
}

#[tokio::test]
async fn set_value_requires_value_field() {
    let result = worker(&fixture())
        .execute("SetElementValue", json!({"automationId": "edit1"}), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::InvalidRequest));
}

#[tokio::test]
async fn toggle_reports_state() {
    let result = worker(&fixture())
        .execute("ToggleElement", json!({"automationId": "chk1"}), BUDGET)
        .await;
    assert_eq!(data(result), json!({"automationId": "chk1", "toggleState": "on"}));
}

#[tokio::test]
async fn element_info_is_returned() {
    let result = worker(&fixture())
        .execute("GetElementInfo", json!({"name": "OK"}), BUDGET)
        .await;
    let info = data(result);
    assert_eq!(info["automationId"], json!("btn1"));
    assert_eq!(info["patterns"], json!(["Invoke"]));
}

#[tokio::test]
async fn unavailable_backend_reports_pattern_not_supported() {
    let backend: Arc<dyn AutomationBackend> = Arc::new(UnavailableBackend);
    let executor = OperationExecutor::new(Arc::new(worker_registry(&backend).unwrap()));
    let result = executor
        .execute("InvokeElement", json!({"automationId": "btn1"}), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::PatternNotSupported));
}

#[tokio::test]
async fn ping_reports_role_and_echo() {
    let data = data(
        worker(&fixture())
            .execute("Ping", json!({"echo": "hi"}), BUDGET)
            .await,
    );
    assert_eq!(data["pong"], json!(true));
    assert_eq!(data["role"], json!("worker"));
    assert_eq!(data["echo"], json!("hi"));
    assert_eq!(data["pid"], json!(std::process::id()));
}

#[tokio::test]
async fn slow_ping_times_out() {
    let result = worker(&fixture())
        .execute("Ping", json!({"delayMs": 2000}), Duration::from_millis(50))
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::TimeoutError));
}

// ── Monitor ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn session_lifecycle_through_handlers() {
    let (_sessions, executor) = monitor(&fixture());

    let started = data(
        executor
            .execute(
                "StartEventMonitoring",
                json!({"eventTypes": ["Invoked"]}),
                BUDGET,
            )
            .await,
    );
    let session_id = started["sessionId"].as_str().unwrap().to_owned();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let log = data(
        executor
            .execute("GetEventLog", json!({"sessionId": session_id}), BUDGET)
            .await,
    );
    assert_eq!(log["sessionId"], json!(session_id));
    assert_eq!(log["events"].as_array().unwrap().len(), 1);
    assert_eq!(log["events"][0]["eventType"], json!("Invoked"));
    assert_eq!(log["events"][0]["sequence"], json!(0));

    let summary = data(
        executor
            .execute("StopEventMonitoring", json!({"sessionId": session_id}), BUDGET)
            .await,
    );
    assert_eq!(summary["state"], json!("stopped"));
    assert_eq!(summary["eventCount"], json!(1));

    let again = executor
        .execute("StopEventMonitoring", json!({"sessionId": session_id}), BUDGET)
        .await;
    assert_eq!(again.error_code(), Some(ErrorCode::InvalidOperation));
}

#[tokio::test]
async fn unknown_session_is_session_not_found() {
    let (_sessions, executor) = monitor(&fixture());
    let result = executor
        .execute("GetEventLog", json!({"sessionId": "nope"}), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::SessionNotFound));
}

#[tokio::test]
async fn blank_session_id_fails_validation() {
    let (_sessions, executor) = monitor(&fixture());
    let result = executor
        .execute("StopEventMonitoring", json!({"sessionId": "  "}), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::ValidationFailed));
}

#[tokio::test]
async fn worker_operation_is_not_served_by_monitor() {
    let (_sessions, executor) = monitor(&fixture());
    let result = executor
        .execute("InvokeElement", json!({"automationId": "btn1"}), BUDGET)
        .await;
    assert_eq!(result.error_code(), Some(ErrorCode::OperationNotFound));
}
