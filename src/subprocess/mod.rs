//! Entry point of the Worker and Monitor processes.
//!
//! A subprocess builds the registry for its role, then serves requests from
//! stdin until the host closes it. Stdout carries nothing but response
//! frames; all diagnostics go to stderr.

pub mod main_loop;

use std::sync::Arc;

use tracing::info;

use crate::automation::Backend;
use crate::config::GlobalConfig;
use crate::handlers::{monitor_registry, worker_registry};
use crate::host::SubprocessRole;
use crate::monitor::SessionManager;
use crate::operations::{OperationExecutor, OperationRegistry};
use crate::Result;

pub use main_loop::{run_main_loop, LoopOptions};

/// Build the registry served by `role`.
///
/// For the Monitor the session manager is returned too so the caller can
/// stop its sessions on exit.
///
/// # Errors
///
/// Returns `AppError::Config` when the backend cannot be opened, or a
/// registration error if the handler set is inconsistent.
pub fn build_registry(
    role: SubprocessRole,
    config: &GlobalConfig,
) -> Result<(OperationRegistry, Option<Arc<SessionManager>>)> {
    let backend = Backend::open(&config.backend)?;
    match role {
        SubprocessRole::Worker => Ok((worker_registry(&backend.automation)?, None)),
        SubprocessRole::Monitor => {
            let sessions = Arc::new(SessionManager::with_retention(
                backend.events,
                config.process.max_retained_sessions,
            ));
            let registry = monitor_registry(&sessions)?;
            Ok((registry, Some(sessions)))
        }
    }
}

/// Serve `role` over the process's stdin and stdout.
///
/// # Errors
///
/// Returns the startup error, or the I/O error that ended the loop.
pub async fn serve(role: SubprocessRole, config: &GlobalConfig) -> Result<()> {
    let (registry, sessions) = build_registry(role, config)?;
    info!(
        role = role.as_str(),
        pid = std::process::id(),
        operations = ?registry.list_registered(),
        "subprocess serving"
    );

    let executor = OperationExecutor::new(Arc::new(registry));
    let options = LoopOptions::from_communication(&config.communication);
    let outcome = run_main_loop(tokio::io::stdin(), tokio::io::stdout(), &executor, &options).await;

    if let Some(sessions) = sessions {
        sessions.stop_all();
    }
    outcome
}
