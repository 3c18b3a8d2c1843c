//! Operation handlers hosted by the Worker and Monitor processes.
//!
//! Handler types are named `<Operation>Handler`; the registries below derive
//! operation names from that convention.
//!
//! - `worker`: element actions.
//! - `monitor`: event-monitoring sessions.
//! - `ping`: liveness probe registered in both processes.

pub mod monitor;
pub mod ping;
pub mod worker;

use std::sync::Arc;

use crate::automation::AutomationBackend;
use crate::host::SubprocessRole;
use crate::monitor::SessionManager;
use crate::operations::{HandlerError, Operation, OperationRegistry, Registration};
use crate::Result;

pub use monitor::{GetEventLogHandler, StartEventMonitoringHandler, StopEventMonitoringHandler};
pub use ping::PingHandler;
pub use worker::{
    GetElementInfoHandler, InvokeElementHandler, SetElementValueHandler, ToggleElementHandler,
};

/// Type-name suffix stripped to obtain an operation name.
pub const HANDLER_SUFFIX: &str = "Handler";

fn with_backend<H: Operation>(
    backend: &Arc<dyn AutomationBackend>,
    build: fn(Arc<dyn AutomationBackend>) -> H,
) -> Registration {
    let backend = Arc::clone(backend);
    Registration::new::<H, _>(move || Ok(build(Arc::clone(&backend))))
}

fn with_sessions<H: Operation>(
    sessions: &Arc<SessionManager>,
    build: fn(Arc<SessionManager>) -> H,
) -> Registration {
    let sessions = Arc::clone(sessions);
    Registration::new::<H, _>(move || Ok(build(Arc::clone(&sessions))))
}

fn ping(role: SubprocessRole) -> Registration {
    Registration::new::<PingHandler, _>(move || Ok(PingHandler::new(role)))
}

/// Registry served by the Worker process.
///
/// # Errors
///
/// Returns `AppError::DuplicateOperation` or `AppError::Config` if the
/// handler set violates the naming convention.
pub fn worker_registry(backend: &Arc<dyn AutomationBackend>) -> Result<OperationRegistry> {
    let mut registry = OperationRegistry::new();
    registry.register_by_convention(
        [
            with_backend(backend, InvokeElementHandler::new),
            with_backend(backend, SetElementValueHandler::new),
            with_backend(backend, ToggleElementHandler::new),
            with_backend(backend, GetElementInfoHandler::new),
            ping(SubprocessRole::Worker),
        ],
        HANDLER_SUFFIX,
    )?;
    Ok(registry)
}

/// Registry served by the Monitor process.
///
/// # Errors
///
/// Returns `AppError::DuplicateOperation` or `AppError::Config` if the
/// handler set violates the naming convention.
pub fn monitor_registry(sessions: &Arc<SessionManager>) -> Result<OperationRegistry> {
    let mut registry = OperationRegistry::new();
    registry.register_by_convention(
        [
            with_sessions(sessions, StartEventMonitoringHandler::new),
            with_sessions(sessions, StopEventMonitoringHandler::new),
            with_sessions(sessions, GetEventLogHandler::new),
            ping(SubprocessRole::Monitor),
        ],
        HANDLER_SUFFIX,
    )?;
    Ok(registry)
}

/// Run blocking backend work off the async runtime.
///
/// A panic inside `task` is resumed on the calling task so the executor
/// reports it like any other handler panic.
async fn run_blocking<T, F>(task: F) -> std::result::Result<T, HandlerError>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, HandlerError> + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(HandlerError::Other(format!("backend task was cancelled: {err}"))),
    }
}

fn require_non_blank(field: &str, value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{field} must not be blank"))
    } else {
        Ok(())
    }
}
