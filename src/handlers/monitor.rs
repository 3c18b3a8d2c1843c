//! Event-monitoring handlers served by the Monitor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{require_non_blank, run_blocking};
use crate::models::element::ElementScope;
use crate::models::session::{EventLogFilter, MonitorEvent, SessionSummary};
use crate::models::ServiceContext;
use crate::monitor::SessionManager;
use crate::operations::{HandlerError, Operation};

/// Parameters of `StartEventMonitoring`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartEventMonitoringRequest {
    /// Subtree to observe; the whole desktop by default.
    #[serde(default)]
    pub scope: ElementScope,
    /// Event types to record; empty records every type.
    #[serde(default)]
    pub event_types: Vec<String>,
}

/// Result of `StartEventMonitoring`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StartEventMonitoringResponse {
    /// Identifier for the follow-up calls.
    pub session_id: String,
}

/// Parameters naming one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    /// Session returned by `StartEventMonitoring`.
    pub session_id: String,
}

/// Parameters of `GetEventLog`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetEventLogRequest {
    /// Session returned by `StartEventMonitoring`.
    pub session_id: String,
    /// Optional bounds on the snapshot.
    #[serde(flatten)]
    pub filter: EventLogFilter,
}

/// Result of `GetEventLog`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetEventLogResponse {
    /// Session the events belong to.
    pub session_id: String,
    /// Events in recording order.
    pub events: Vec<MonitorEvent>,
}

/// `StartEventMonitoring`: open a session and subscribe.
#[derive(Debug, Clone)]
pub struct StartEventMonitoringHandler {
    sessions: Arc<SessionManager>,
}

impl StartEventMonitoringHandler {
    /// Create a handler over `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

impl Operation for StartEventMonitoringHandler {
    type Request = StartEventMonitoringRequest;
    type Response = StartEventMonitoringResponse;

    fn validate(&self, request: &StartEventMonitoringRequest) -> Result<(), String> {
        if let Some(ref root) = request.scope.root {
            root.validate()?;
        }
        request
            .event_types
            .iter()
            .try_for_each(|event_type| require_non_blank("eventTypes entry", event_type))
    }

    async fn execute(
        &self,
        request: StartEventMonitoringRequest,
        _ctx: &ServiceContext,
    ) -> Result<StartEventMonitoringResponse, HandlerError> {
        let sessions = Arc::clone(&self.sessions);
        run_blocking(move || {
            let session_id =
                sessions.start_event_monitoring(request.scope, request.event_types)?;
            Ok(StartEventMonitoringResponse { session_id })
        })
        .await
    }
}

/// `StopEventMonitoring`: unsubscribe and freeze the log.
#[derive(Debug, Clone)]
pub struct StopEventMonitoringHandler {
    sessions: Arc<SessionManager>,
}

impl StopEventMonitoringHandler {
    /// Create a handler over `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

impl Operation for StopEventMonitoringHandler {
    type Request = SessionRequest;
    type Response = SessionSummary;

    fn validate(&self, request: &SessionRequest) -> Result<(), String> {
        require_non_blank("sessionId", &request.session_id)
    }

    async fn execute(
        &self,
        request: SessionRequest,
        _ctx: &ServiceContext,
    ) -> Result<SessionSummary, HandlerError> {
        let sessions = Arc::clone(&self.sessions);
        run_blocking(move || {
            sessions
                .stop_event_monitoring(&request.session_id)
                .map_err(HandlerError::from)
        })
        .await
    }
}

/// `GetEventLog`: snapshot a session's recorded events.
#[derive(Debug, Clone)]
pub struct GetEventLogHandler {
    sessions: Arc<SessionManager>,
}

impl GetEventLogHandler {
    /// Create a handler over `sessions`.
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}

impl Operation for GetEventLogHandler {
    type Request = GetEventLogRequest;
    type Response = GetEventLogResponse;

    fn validate(&self, request: &GetEventLogRequest) -> Result<(), String> {
        require_non_blank("sessionId", &request.session_id)
    }

    async fn execute(
        &self,
        request: GetEventLogRequest,
        _ctx: &ServiceContext,
    ) -> Result<GetEventLogResponse, HandlerError> {
        let sessions = Arc::clone(&self.sessions);
        run_blocking(move || {
            let events = sessions.get_event_log(&request.session_id, &request.filter)?;
            Ok(GetEventLogResponse {
                session_id: request.session_id,
                events,
            })
        })
        .await
    }
}
