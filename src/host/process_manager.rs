//! Host-side owner of the Worker and Monitor subprocesses.
//!
//! Each role has one slot holding at most one live [`Transport`]. A call
//! locks the slot for its whole request/response exchange, so calls to the
//! same subprocess are strictly serialised in arrival order while the two
//! roles never wait on each other. Any transport failure, a protocol
//! violation, or a timeout reported by the subprocess itself retires the
//! transport; the next call on that slot spawns a fresh subprocess.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::SubprocessRole;
use crate::config::GlobalConfig;
use crate::models::{ErrorCode, OperationRequest, OperationResult};
use crate::transport::stdio::StdioTransportFactory;
use crate::transport::{Transport, TransportFactory};
use crate::Result;

/// One subprocess role's transport plus lock-free status mirrors.
struct SubprocessSlot {
    role: SubprocessRole,
    transport: Mutex<Option<Box<dyn Transport>>>,
    alive: AtomicBool,
    /// Process id of the current transport; 0 when none.
    pid: AtomicU32,
}

impl SubprocessSlot {
    fn new(role: SubprocessRole) -> Self {
        Self {
            role,
            transport: Mutex::new(None),
            alive: AtomicBool::new(false),
            pid: AtomicU32::new(0),
        }
    }

    fn mark_alive(&self, pid: Option<u32>) {
        self.pid.store(pid.unwrap_or(0), Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.pid.store(0, Ordering::SeqCst);
    }

    fn is_available(&self) -> bool {
        match self.transport.try_lock() {
            Ok(mut guard) => {
                let connected = guard.as_mut().is_some_and(|t| t.is_connected());
                if !connected {
                    self.alive.store(false, Ordering::SeqCst);
                }
                connected
            }
            // A call is in flight; report the state it last observed.
            Err(_) => self.alive.load(Ordering::SeqCst),
        }
    }

    fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }
}

/// Supervises one Worker and one Monitor subprocess.
pub struct ProcessManager {
    factory: Arc<dyn TransportFactory>,
    worker: SubprocessSlot,
    monitor: SubprocessSlot,
    response_margin: Duration,
}

impl ProcessManager {
    /// Create a manager that connects through `factory`.
    ///
    /// Nothing is spawned until the first call on each role. Every call is
    /// given `response_margin` on top of its own timeout before the host
    /// declares the subprocess unresponsive.
    #[must_use]
    pub fn new(factory: Arc<dyn TransportFactory>, response_margin: Duration) -> Self {
        Self {
            factory,
            worker: SubprocessSlot::new(SubprocessRole::Worker),
            monitor: SubprocessSlot::new(SubprocessRole::Monitor),
            response_margin,
        }
    }

    /// Build a stdio-backed manager from configuration.
    ///
    /// `config_path` is forwarded to the subprocesses so they load the same
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a launch command cannot be resolved.
    pub fn from_config(config: &GlobalConfig, config_path: Option<&Path>) -> Result<Self> {
        let factory = StdioTransportFactory::new(
            config.spawn_config(SubprocessRole::Worker, config_path)?,
            config.spawn_config(SubprocessRole::Monitor, config_path)?,
            config.communication.buffer_size,
        );
        Ok(Self::new(
            Arc::new(factory),
            config.process.response_margin(),
        ))
    }

    fn slot(&self, role: SubprocessRole) -> &SubprocessSlot {
        match role {
            SubprocessRole::Worker => &self.worker,
            SubprocessRole::Monitor => &self.monitor,
        }
    }

    /// Run `operation_name` on the Worker with a typed request and response.
    pub async fn execute_worker_operation<Req, Res>(
        &self,
        operation_name: &str,
        request: &Req,
        timeout: Duration,
    ) -> OperationResult<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.execute_typed(SubprocessRole::Worker, operation_name, request, timeout)
            .await
    }

    /// Run `operation_name` on the Monitor with a typed request and response.
    pub async fn execute_monitor_operation<Req, Res>(
        &self,
        operation_name: &str,
        request: &Req,
        timeout: Duration,
    ) -> OperationResult<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        self.execute_typed(SubprocessRole::Monitor, operation_name, request, timeout)
            .await
    }

    async fn execute_typed<Req, Res>(
        &self,
        role: SubprocessRole,
        operation_name: &str,
        request: &Req,
        timeout: Duration,
    ) -> OperationResult<Res>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let parameters = match serde_json::to_value(request) {
            Ok(value) => value,
            Err(err) => {
                return OperationResult::error(
                    ErrorCode::SerializationError,
                    format!("failed to encode {operation_name} parameters: {err}"),
                )
            }
        };

        let frame = OperationRequest::new(operation_name, parameters)
            .with_request_id(Uuid::new_v4().to_string())
            .with_timeout_seconds(whole_seconds(timeout));
        self.execute(role, frame, timeout).await.into_typed()
    }

    /// Send one raw request frame to `role` and wait for its response.
    ///
    /// The host gives up after `timeout` plus the response margin. Failures
    /// of the channel itself come back as failed results, never as errors.
    pub async fn execute(
        &self,
        role: SubprocessRole,
        request: OperationRequest,
        timeout: Duration,
    ) -> OperationResult {
        let request_id = request.request_id.clone();
        let span = info_span!(
            "subprocess_call",
            role = role.as_str(),
            operation = %request.operation_name,
            request_id = request_id.as_deref().unwrap_or(""),
        );
        self.call(role, request, timeout)
            .instrument(span)
            .await
            .with_request_id(request_id)
    }

    async fn call(
        &self,
        role: SubprocessRole,
        request: OperationRequest,
        timeout: Duration,
    ) -> OperationResult {
        let frame = match serde_json::to_string(&request) {
            Ok(frame) => frame,
            Err(err) => {
                return OperationResult::error(
                    ErrorCode::SerializationError,
                    format!("failed to encode request frame: {err}"),
                )
            }
        };

        let slot = self.slot(role);
        let mut guard = slot.transport.lock().await;

        if !guard.as_mut().is_some_and(|t| t.is_connected()) {
            if let Some(mut stale) = guard.take() {
                debug!(role = role.as_str(), "discarding disconnected subprocess");
                stale.terminate().await;
            }
            slot.mark_dead();

            match self.factory.connect(role).await {
                Ok(transport) => {
                    slot.mark_alive(transport.process_id());
                    info!(
                        role = role.as_str(),
                        pid = transport.process_id().unwrap_or(0),
                        "subprocess ready"
                    );
                    *guard = Some(transport);
                }
                Err(err) => {
                    warn!(role = role.as_str(), %err, "subprocess could not be started");
                    return OperationResult::error(ErrorCode::ProcessUnavailable, err.to_string());
                }
            }
        }

        let Some(transport) = guard.as_mut() else {
            return OperationResult::error(
                ErrorCode::ProcessUnavailable,
                format!("{role} subprocess is not running"),
            );
        };

        let deadline = timeout.saturating_add(self.response_margin);
        let outcome = transport.send(frame, deadline).await;

        let (result, recycle) = match outcome {
            Ok(line) => match decode_response(&line, request.request_id.as_deref()) {
                Ok(result) => {
                    let timed_out = result.error_code() == Some(ErrorCode::TimeoutError);
                    (result, timed_out)
                }
                Err(reason) => {
                    warn!(role = role.as_str(), %reason, "protocol violation");
                    (
                        OperationResult::error(ErrorCode::SerializationError, reason),
                        true,
                    )
                }
            },
            Err(err) => {
                warn!(role = role.as_str(), %err, "subprocess call failed");
                (OperationResult::error(err.error_code(), err.to_string()), true)
            }
        };

        if recycle {
            if let Some(mut transport) = guard.take() {
                transport.terminate().await;
            }
            slot.mark_dead();
        }
        result
    }

    /// Whether the Worker is running and its channel usable.
    ///
    /// Never waits for an in-flight call.
    #[must_use]
    pub fn is_worker_process_available(&self) -> bool {
        self.worker.is_available()
    }

    /// Whether the Monitor is running and its channel usable.
    ///
    /// Never waits for an in-flight call.
    #[must_use]
    pub fn is_monitor_process_available(&self) -> bool {
        self.monitor.is_available()
    }

    /// OS process id of the current Worker, if one is running.
    #[must_use]
    pub fn worker_pid(&self) -> Option<u32> {
        self.worker.pid()
    }

    /// OS process id of the current Monitor, if one is running.
    #[must_use]
    pub fn monitor_pid(&self) -> Option<u32> {
        self.monitor.pid()
    }

    /// Close both subprocesses, giving each `grace` to exit on its own.
    ///
    /// Waits for in-flight calls to finish first.
    pub async fn shutdown(&self, grace: Duration) {
        tokio::join!(
            shutdown_slot(&self.worker, grace),
            shutdown_slot(&self.monitor, grace)
        );
    }
}

async fn shutdown_slot(slot: &SubprocessSlot, grace: Duration) {
    let transport = slot.transport.lock().await.take();
    slot.mark_dead();
    if let Some(transport) = transport {
        info!(role = slot.role.as_str(), "shutting down subprocess");
        transport.shutdown(grace).await;
    }
}

/// Decode and sanity-check one response line.
fn decode_response(
    line: &str,
    expected_request_id: Option<&str>,
) -> std::result::Result<OperationResult, String> {
    let result: OperationResult = serde_json::from_str(line)
        .map_err(|err| format!("subprocess sent an unreadable response: {err}"))?;

    if !result.is_well_formed() {
        return Err("subprocess response sets both or neither of data and error".into());
    }

    if let (Some(expected), Some(actual)) = (expected_request_id, result.request_id()) {
        if expected != actual {
            return Err(format!(
                "response for request {actual} arrived while waiting for {expected}"
            ));
        }
    }
    Ok(result)
}

/// Round a call timeout up to whole seconds for the request frame.
fn whole_seconds(timeout: Duration) -> u64 {
    let secs = timeout
        .as_secs()
        .saturating_add(u64::from(timeout.subsec_nanos() > 0));
    secs.max(1)
}
