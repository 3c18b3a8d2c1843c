//! Per-call execution context.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Execution context created at the entry of every operation call.
///
/// Never persisted; dropped once the call has produced its result.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    operation_id: String,
    method_name: String,
    timeout: Duration,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ServiceContext {
    /// Open a context for `method_name` with a fresh operation id.
    #[must_use]
    pub fn new(method_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            operation_id: Uuid::new_v4().to_string(),
            method_name: method_name.into(),
            timeout,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Unique identifier of this call.
    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Operation name being executed.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Time budget for the handler body.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wall-clock time the call started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time spent since the context was opened.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// [`ServiceContext::elapsed`] in whole milliseconds, saturating.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
