//! Monitoring session model and lifecycle helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::element::ElementScope;

/// Lifecycle state of an event-monitoring session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// Session allocated, subscription not yet active.
    Created,
    /// Subscription active; events are being recorded.
    Monitoring,
    /// Subscription released; the log is frozen. Terminal.
    Stopped,
}

impl SessionState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Monitoring | Self::Stopped) | (Self::Monitoring, Self::Stopped)
        )
    }
}

/// Lightweight description of the element that raised an event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceElement {
    /// Automation id of the source element, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    /// Accessible name of the source element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Control type of the source element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
}

/// One recorded accessibility event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEvent {
    /// Position in the session log, starting at 0.
    pub sequence: u64,
    /// Time the event callback fired.
    pub timestamp: DateTime<Utc>,
    /// Event type, e.g. `Invoked` or `FocusChanged`.
    pub event_type: String,
    /// Element that raised the event.
    pub source_element: SourceElement,
}

/// Bounds applied to an event log snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventLogFilter {
    /// Keep only the most recent `max_count` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_count: Option<usize>,
    /// Keep only events at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
}

impl EventLogFilter {
    /// Apply the filter to an ordered log, preserving event order.
    #[must_use]
    pub fn apply(&self, events: &[MonitorEvent]) -> Vec<MonitorEvent> {
        let recent: Vec<&MonitorEvent> = events
            .iter()
            .filter(|event| self.since.is_none_or(|since| event.timestamp >= since))
            .collect();
        let skip = self
            .max_count
            .map_or(0, |max| recent.len().saturating_sub(max));
        recent.into_iter().skip(skip).cloned().collect()
    }
}

/// Externally visible description of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Unique session identifier.
    pub session_id: String,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Element subtree being observed.
    pub scope: ElementScope,
    /// Event types subscribed to; empty means every type.
    pub event_types: Vec<String>,
    /// Events recorded so far.
    pub event_count: usize,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Time the session was stopped, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}
