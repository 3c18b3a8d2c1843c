//! Liveness probe.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::host::SubprocessRole;
use crate::models::ServiceContext;
use crate::operations::{HandlerError, Operation};

/// Parameters of `Ping`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    /// Text returned unchanged in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
    /// Artificial latency before answering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

/// Result of `Ping`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    /// Always `true`.
    pub pong: bool,
    /// Role of the answering process.
    pub role: SubprocessRole,
    /// OS process id of the answering process.
    pub pid: u32,
    /// Echo of [`PingRequest::echo`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
    /// Time the answer was produced.
    pub timestamp: DateTime<Utc>,
}

/// `Ping`: report the subprocess role and pid.
#[derive(Debug, Clone, Copy)]
pub struct PingHandler {
    role: SubprocessRole,
}

impl PingHandler {
    /// Create a probe answering as `role`.
    #[must_use]
    pub fn new(role: SubprocessRole) -> Self {
        Self { role }
    }
}

impl Operation for PingHandler {
    type Request = PingRequest;
    type Response = PingResponse;

    async fn execute(
        &self,
        request: PingRequest,
        _ctx: &ServiceContext,
    ) -> Result<PingResponse, HandlerError> {
        if let Some(delay) = request.delay_ms.filter(|ms| *ms > 0) {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(PingResponse {
            pong: true,
            role: self.role,
            pid: std::process::id(),
            echo: request.echo,
            timestamp: Utc::now(),
        })
    }
}
