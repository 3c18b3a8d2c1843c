//! Event-monitoring session lifecycle.
//!
//! Each session owns a subscription on the [`EventSource`] and an
//! append-only log. The subscription's callback thread only ever pushes into
//! an unbounded channel; the log itself is owned by the session and filled
//! by draining that channel whenever the session is read or stopped, so the
//! callback never waits on a reader.
//!
//! Stopped sessions stay readable until more than the retention limit have
//! accumulated; the oldest stopped session is then dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::automation::{EventSink, EventSource, ObservedEvent, Subscription};
use crate::models::element::ElementScope;
use crate::models::session::{
    EventLogFilter, MonitorEvent, SessionState, SessionSummary,
};
use crate::{AppError, Result};

struct MonitorSession {
    session_id: String,
    scope: ElementScope,
    event_types: Vec<String>,
    state: SessionState,
    created_at: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
    subscription: Option<Subscription>,
    events: mpsc::UnboundedReceiver<ObservedEvent>,
    log: Vec<MonitorEvent>,
}

impl MonitorSession {
    /// Move everything the callback delivered so far into the log.
    fn drain(&mut self) {
        while let Ok(observed) = self.events.try_recv() {
            let sequence = u64::try_from(self.log.len()).unwrap_or(u64::MAX);
            self.log.push(MonitorEvent {
                sequence,
                timestamp: observed.timestamp,
                event_type: observed.event_type,
                source_element: observed.source_element,
            });
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AppError::InvalidOperation(format!(
                "session {} cannot move from {:?} to {next:?}",
                self.session_id, self.state
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Release the subscription and freeze the log.
    fn stop(&mut self) -> Result<()> {
        self.transition(SessionState::Stopped)?;
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.drain();
        self.events.close();
        self.stopped_at = Some(Utc::now());
        Ok(())
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            state: self.state,
            scope: self.scope.clone(),
            event_types: self.event_types.clone(),
            event_count: self.log.len(),
            created_at: self.created_at,
            stopped_at: self.stopped_at,
        }
    }
}

/// Stopped sessions kept by [`SessionManager::new`].
pub const DEFAULT_MAX_RETAINED_SESSIONS: usize = 64;

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<String, MonitorSession>,
    /// Ids of stopped sessions, oldest stop first.
    stopped: VecDeque<String>,
}

impl SessionTable {
    fn get_mut(&mut self, session_id: &str) -> Result<&mut MonitorSession> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_owned()))
    }

    fn retire(&mut self, session_id: String, max_retained: usize) {
        self.stopped.push_back(session_id);
        while self.stopped.len() > max_retained {
            if let Some(evicted) = self.stopped.pop_front() {
                self.sessions.remove(&evicted);
                debug!(session_id = %evicted, "stopped session evicted");
            }
        }
    }
}

/// Owns every monitoring session of the Monitor process.
pub struct SessionManager {
    source: Arc<dyn EventSource>,
    table: Mutex<SessionTable>,
    max_retained: usize,
}

impl SessionManager {
    /// Create a manager subscribing through `source` that keeps up to
    /// [`DEFAULT_MAX_RETAINED_SESSIONS`] stopped sessions.
    #[must_use]
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self::with_retention(source, DEFAULT_MAX_RETAINED_SESSIONS)
    }

    /// Create a manager that keeps at most `max_retained` stopped sessions.
    #[must_use]
    pub fn with_retention(source: Arc<dyn EventSource>, max_retained: usize) -> Self {
        Self {
            source,
            table: Mutex::new(SessionTable::default()),
            max_retained,
        }
    }

    fn table(&self) -> MutexGuard<'_, SessionTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to `event_types` inside `scope` and start recording.
    ///
    /// Returns the new session id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` when the event source refuses the
    /// subscription; no session is kept in that case.
    pub fn start_event_monitoring(
        &self,
        scope: ElementScope,
        event_types: Vec<String>,
    ) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        let span = info_span!("start_event_monitoring", session_id = %session_id);
        let _guard = span.enter();

        let (sink, events) = EventSink::channel();
        let mut session = MonitorSession {
            session_id: session_id.clone(),
            scope,
            event_types,
            state: SessionState::Created,
            created_at: Utc::now(),
            stopped_at: None,
            subscription: None,
            events,
            log: Vec::new(),
        };

        let subscription = self
            .source
            .subscribe(&session.scope, &session.event_types, sink)?;
        session.subscription = Some(subscription);
        session.transition(SessionState::Monitoring)?;

        info!(
            session_id = %session_id,
            event_types = ?session.event_types,
            "event monitoring started"
        );
        self.table().sessions.insert(session_id.clone(), session);
        Ok(session_id)
    }

    /// Ordered snapshot of a session's log after applying `filter`.
    ///
    /// Works for stopped sessions too; their log is frozen.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` for an unknown or evicted id.
    pub fn get_event_log(
        &self,
        session_id: &str,
        filter: &EventLogFilter,
    ) -> Result<Vec<MonitorEvent>> {
        let mut table = self.table();
        let session = table.get_mut(session_id)?;
        session.drain();
        Ok(filter.apply(&session.log))
    }

    /// Stop recording and release the subscription.
    ///
    /// The stopped session may evict the oldest stopped one once the
    /// retention limit is exceeded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` for an unknown id and
    /// `AppError::InvalidOperation` when the session is already stopped.
    pub fn stop_event_monitoring(&self, session_id: &str) -> Result<SessionSummary> {
        let span = info_span!("stop_event_monitoring", session_id);
        let _guard = span.enter();

        let mut table = self.table();
        let session = table.get_mut(session_id)?;
        if session.state == SessionState::Stopped {
            return Err(AppError::InvalidOperation(format!(
                "session {session_id} is already stopped"
            )));
        }
        session.stop()?;

        info!(
            session_id,
            event_count = session.log.len(),
            "event monitoring stopped"
        );
        let summary = session.summary();
        table.retire(session_id.to_owned(), self.max_retained);
        Ok(summary)
    }

    /// Current description of one session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::SessionNotFound` for an unknown id.
    pub fn summary(&self, session_id: &str) -> Result<SessionSummary> {
        let mut table = self.table();
        let session = table.get_mut(session_id)?;
        session.drain();
        Ok(session.summary())
    }

    /// Every known session, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut table = self.table();
        let mut summaries: Vec<SessionSummary> = table
            .sessions
            .values_mut()
            .map(|session| {
                session.drain();
                session.summary()
            })
            .collect();
        summaries.sort_by_key(|summary| summary.created_at);
        summaries
    }

    /// Stop every session that is still recording; returns how many were
    /// stopped.
    pub fn stop_all(&self) -> usize {
        let mut table = self.table();
        let mut retired = Vec::new();
        for session in table.sessions.values_mut() {
            if session.state == SessionState::Stopped {
                continue;
            }
            match session.stop() {
                Ok(()) => retired.push((session.created_at, session.session_id.clone())),
                Err(err) => warn!(session_id = %session.session_id, %err, "failed to stop session"),
            }
        }
        retired.sort();
        let stopped = retired.len();
        for (_, session_id) in retired {
            table.retire(session_id, self.max_retained);
        }
        if stopped > 0 {
            info!(stopped, "stopped remaining monitoring sessions");
        }
        stopped
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.table().sessions.len())
            .field("max_retained", &self.max_retained)
            .finish_non_exhaustive()
    }
}
