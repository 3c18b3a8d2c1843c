//! Shared test helpers for the integration suites.
//!
//! Provides an in-memory [`Transport`] whose behaviour is chosen by the
//! operation name of each request, plus fixture and config files for the
//! end-to-end tests that run the real binary.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use a11y_bridge::config::GlobalConfig;
use a11y_bridge::host::SubprocessRole;
use a11y_bridge::models::{ErrorCode, OperationRequest, OperationResult};
use a11y_bridge::operations::BoxFuture;
use a11y_bridge::transport::{Transport, TransportFactory};
use a11y_bridge::{AppError, Result};

// ── Scripted transport ──────────────────────────────────────────────────────

/// Everything the mock transports observed, shared with the test.
#[derive(Debug, Default)]
pub struct MockState {
    events: Mutex<Vec<String>>,
    frames: Mutex<Vec<OperationRequest>>,
    pub connects: AtomicUsize,
    pub terminations: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl MockState {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    /// `<role>:write:<id>` / `<role>:read:<id>` in the order they happened.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Every request frame written, in order.
    pub fn frames(&self) -> Vec<OperationRequest> {
        self.frames.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

/// Factory handing out [`MockTransport`]s; pids count up from 1001.
pub struct MockFactory {
    pub state: Arc<MockState>,
    pub fail: bool,
}

impl MockFactory {
    pub fn new() -> (Arc<MockState>, Arc<Self>) {
        let state = Arc::new(MockState::default());
        let factory = Arc::new(Self {
            state: Arc::clone(&state),
            fail: false,
        });
        (state, factory)
    }

    pub fn failing() -> (Arc<MockState>, Arc<Self>) {
        let state = Arc::new(MockState::default());
        let factory = Arc::new(Self {
            state: Arc::clone(&state),
            fail: true,
        });
        (state, factory)
    }
}

impl TransportFactory for MockFactory {
    fn connect(&self, role: SubprocessRole) -> BoxFuture<'_, Result<Box<dyn Transport>>> {
        Box::pin(async move {
            if self.fail {
                return Err(AppError::ProcessUnavailable(format!(
                    "failed to spawn {role} subprocess: no such file"
                )));
            }
            let n = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Box::new(MockTransport {
                role,
                pid: 1000 + u32::try_from(n).unwrap(),
                broken: false,
                state: Arc::clone(&self.state),
            }) as Box<dyn Transport>)
        })
    }
}

/// Transport whose reply depends on the operation name:
///
/// - `Echo`: success with the pid and the parameters.
/// - `Slow`: success after `parameters.ms` milliseconds.
/// - `Hang`: never answers; fails with a timeout at the deadline.
/// - `Crash`: fails as if the process exited.
/// - `Garbage`: answers with a line that is not JSON.
/// - `WrongId`: answers with someone else's request id.
/// - `ReportTimeout`: answers with a handler-level `TimeoutError`.
/// - anything else: `OperationNotFound`.
pub struct MockTransport {
    role: SubprocessRole,
    pid: u32,
    broken: bool,
    state: Arc<MockState>,
}

impl MockTransport {
    async fn reply(&self, request: &OperationRequest, deadline: Duration) -> Result<String> {
        let answer = |result: OperationResult| -> Result<String> {
            Ok(serde_json::to_string(
                &result.with_request_id(request.request_id.clone()),
            )?)
        };

        match request.operation_name.as_str() {
            "Echo" => answer(OperationResult::success(
                json!({"pid": self.pid, "parameters": request.parameters}),
            )),
            "Slow" => {
                let ms = request.parameters["ms"].as_u64().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                answer(OperationResult::success(json!({"slept": ms})))
            }
            "Hang" => {
                tokio::time::sleep(deadline).await;
                Err(AppError::Timeout(format!(
                    "{} subprocess did not answer within {}ms",
                    self.role,
                    deadline.as_millis()
                )))
            }
            "Crash" => Err(AppError::ProcessCrashed(format!(
                "{} subprocess exited with code 3 while a call was in flight",
                self.role
            ))),
            "Garbage" => Ok("this is not json".to_owned()),
            "WrongId" => Ok(serde_json::to_string(
                &OperationResult::success(json!({}))
                    .with_request_id(Some("someone-else".to_owned())),
            )?),
            "ReportTimeout" => answer(OperationResult::error(
                ErrorCode::TimeoutError,
                "handler did not complete within 1s",
            )),
            other => answer(OperationResult::error(
                ErrorCode::OperationNotFound,
                format!("operation not registered: {other}"),
            )),
        }
    }
}

impl Transport for MockTransport {
    fn send(&mut self, frame: String, deadline: Duration) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let request: OperationRequest = serde_json::from_str(&frame)?;
            let id = request.request_id.clone().unwrap_or_default();
            self.state.record(format!("{}:write:{id}", self.role));
            self.state.frames.lock().unwrap().push(request.clone());

            let reply = self.reply(&request, deadline).await;
            self.state.record(format!("{}:read:{id}", self.role));
            if reply.is_err() {
                self.broken = true;
            }
            reply
        })
    }

    fn is_connected(&mut self) -> bool {
        !self.broken
    }

    fn process_id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn terminate(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.broken = true;
            self.state.terminations.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn shutdown(self: Box<Self>, _grace: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Raw request with a fixed id.
pub fn request(operation: &str, id: &str, parameters: Value) -> OperationRequest {
    OperationRequest::new(operation, parameters).with_request_id(id)
}

// ── Real binary ─────────────────────────────────────────────────────────────

/// Fixture desktop used by the end-to-end suite.
pub const DESKTOP_FIXTURE: &str = r#"{
    "elements": [
        { "automationId": "window", "name": "Main", "controlType": "Window" },
        { "automationId": "btn1", "name": "OK", "controlType": "Button",
          "patterns": ["Invoke"], "parent": "window" },
        { "automationId": "edit1", "name": "Title", "controlType": "Edit",
          "patterns": ["Value"], "parent": "window" }
    ],
    "events": [
        { "delayMs": 50, "eventType": "Invoked", "source": "btn1" },
        { "delayMs": 50, "eventType": "FocusChanged", "source": "edit1" }
    ]
}"#;

/// Path of the binary under test.
pub fn bridge_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_a11y-bridge"))
}

/// Write a fixture plus a config pointing both roles at the binary under
/// test. Returns the config path.
pub fn write_bridge_config(dir: &Path) -> PathBuf {
    std::fs::write(dir.join("desktop.json"), DESKTOP_FIXTURE).unwrap();

    let program = bridge_binary().display().to_string().replace('\\', "\\\\");
    let config = format!(
        r#"
[communication]
timeout_seconds = 10

[process]
shutdown_grace_ms = 2000
response_margin_ms = 2000

[worker]
program = "{program}"

[monitor]
program = "{program}"

[backend]
kind = "fixture"
fixture_path = "desktop.json"
"#
    );
    let path = dir.join("config.toml");
    std::fs::write(&path, config).unwrap();
    path
}

/// Load the config written by [`write_bridge_config`].
pub fn load_bridge_config(path: &Path) -> GlobalConfig {
    GlobalConfig::load_from_path(path).expect("valid test config")
}
