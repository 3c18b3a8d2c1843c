//! Unit tests for the monitoring session lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use a11y_bridge::automation::{BackendResult, EventSink, EventSource, Subscription};
use a11y_bridge::models::element::{ElementQuery, ElementScope};
use a11y_bridge::models::session::{EventLogFilter, SessionState, SourceElement};
use a11y_bridge::monitor::SessionManager;
use a11y_bridge::operations::HandlerError;
use a11y_bridge::AppError;

/// Event source whose events are pushed by the test itself.
#[derive(Default)]
struct ManualSource {
    sinks: Mutex<Vec<EventSink>>,
    released: Arc<AtomicUsize>,
}

impl ManualSource {
    fn fire(&self, index: usize, event_type: &str, automation_id: &str) -> bool {
        let sinks = self.sinks.lock().unwrap();
        sinks[index].emit(
            event_type,
            SourceElement {
                automation_id: Some(automation_id.to_owned()),
                ..SourceElement::default()
            },
        )
    }
}

impl EventSource for ManualSource {
    fn subscribe(
        &self,
        _scope: &ElementScope,
        _event_types: &[String],
        sink: EventSink,
    ) -> BackendResult<Subscription> {
        self.sinks.lock().unwrap().push(sink);
        let released = Arc::clone(&self.released);
        Ok(Subscription::new(move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

struct RefusingSource;

impl EventSource for RefusingSource {
    fn subscribe(
        &self,
        _scope: &ElementScope,
        _event_types: &[String],
        _sink: EventSink,
    ) -> BackendResult<Subscription> {
        Err(HandlerError::PatternNotSupported("no events here".into()))
    }
}

fn manager() -> (Arc<ManualSource>, SessionManager) {
    let source = Arc::new(ManualSource::default());
    let manager = SessionManager::new(Arc::clone(&source) as Arc<dyn EventSource>);
    (source, manager)
}

fn invoked() -> Vec<String> {
    vec!["Invoked".to_owned()]
}

// ── Start ───────────────────────────────────────────────────────────────────

#[test]
fn new_session_has_empty_log() {
    let (_source, manager) = manager();
    let id = manager
        .start_event_monitoring(ElementScope::default(), invoked())
        .unwrap();

    let log = manager.get_event_log(&id, &EventLogFilter::default()).unwrap();
    assert!(log.is_empty());

    let summary = manager.summary(&id).unwrap();
    assert_eq!(summary.state, SessionState::Monitoring);
    assert_eq!(summary.event_types, invoked());
    assert_eq!(summary.event_count, 0);
    assert!(summary.stopped_at.is_none());
}

#[test]
fn session_ids_are_unique() {
    let (_source, manager) = manager();
    let first = manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();
    let second = manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();

    assert_ne!(first, second);
    assert_eq!(manager.list().len(), 2);
}

#[test]
fn refused_subscription_keeps_no_session() {
    let manager = SessionManager::new(Arc::new(RefusingSource));
    let err = manager
        .start_event_monitoring(ElementScope::default(), invoked())
        .unwrap_err();

    assert!(matches!(err, AppError::Automation(HandlerError::PatternNotSupported(_))));
    assert!(manager.list().is_empty());
}

// ── Recording ───────────────────────────────────────────────────────────────

#[test]
fn events_are_logged_in_order() {
    let (source, manager) = manager();
    let id = manager
        .start_event_monitoring(ElementScope::default(), invoked())
        .unwrap();

    for element in ["btn1", "btn2", "btn3"] {
        assert!(source.fire(0, "Invoked", element));
    }

    let log = manager.get_event_log(&id, &EventLogFilter::default()).unwrap();
    let ids: Vec<_> = log
        .iter()
        .map(|event| event.source_element.automation_id.as_deref().unwrap())
        .collect();
    assert_eq!(ids, ["btn1", "btn2", "btn3"]);
    let sequences: Vec<u64> = log.iter().map(|event| event.sequence).collect();
    assert_eq!(sequences, [0, 1, 2]);
    assert!(log.windows(2).all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[test]
fn sessions_record_independently() {
    let (source, manager) = manager();
    let first = manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();
    let second = manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();

    source.fire(0, "Invoked", "btn1");
    source.fire(1, "FocusChanged", "edit1");
    source.fire(1, "FocusChanged", "edit2");

    let none = EventLogFilter::default();
    assert_eq!(manager.get_event_log(&first, &none).unwrap().len(), 1);
    assert_eq!(manager.get_event_log(&second, &none).unwrap().len(), 2);
}

#[test]
fn max_count_keeps_most_recent() {
    let (source, manager) = manager();
    let id = manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();
    for element in ["a", "b", "c", "d"] {
        source.fire(0, "Invoked", element);
    }

    let filter = EventLogFilter {
        max_count: Some(2),
        since: None,
    };
    let log = manager.get_event_log(&id, &filter).unwrap();
    let sequences: Vec<u64> = log.iter().map(|event| event.sequence).collect();
    assert_eq!(sequences, [2, 3]);
}

// ── Stop ────────────────────────────────────────────────────────────────────

#[test]
fn stopped_log_is_frozen_but_readable() {
    let (source, manager) = manager();
    let id = manager
        .start_event_monitoring(ElementScope::default(), invoked())
        .unwrap();
    source.fire(0, "Invoked", "btn1");

    let summary = manager.stop_event_monitoring(&id).unwrap();
    assert_eq!(summary.state, SessionState::Stopped);
    assert_eq!(summary.event_count, 1);
    assert!(summary.stopped_at.is_some());
    assert_eq!(source.released.load(Ordering::SeqCst), 1);

    assert!(!source.fire(0, "Invoked", "btn2"), "sink must be closed after stop");
    let log = manager.get_event_log(&id, &EventLogFilter::default()).unwrap();
    assert_eq!(log.len(), 1);
}

#[test]
fn stopping_twice_is_invalid() {
    let (_source, manager) = manager();
    let id = manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();
    manager.stop_event_monitoring(&id).unwrap();

    let err = manager.stop_event_monitoring(&id).unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));
}

#[test]
fn unknown_session_is_reported() {
    let (_source, manager) = manager();

    assert!(matches!(
        manager.stop_event_monitoring("missing"),
        Err(AppError::SessionNotFound(_))
    ));
    assert!(matches!(
        manager.get_event_log("missing", &EventLogFilter::default()),
        Err(AppError::SessionNotFound(_))
    ));
}

#[test]
fn stop_all_skips_stopped_sessions() {
    let (source, manager) = manager();
    let scope = ElementScope {
        root: Some(ElementQuery::by_automation_id("window1")),
        include_descendants: false,
    };
    let first = manager.start_event_monitoring(scope, vec![]).unwrap();
    manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();
    manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();
    manager.stop_event_monitoring(&first).unwrap();

    assert_eq!(manager.stop_all(), 2);
    assert_eq!(manager.stop_all(), 0);
    assert_eq!(source.released.load(Ordering::SeqCst), 3);
    assert!(manager
        .list()
        .iter()
        .all(|summary| summary.state == SessionState::Stopped));
}

// ── Retention ───────────────────────────────────────────────────────────────

#[test]
fn oldest_stopped_session_is_evicted() {
    let source = Arc::new(ManualSource::default());
    let manager = SessionManager::with_retention(Arc::clone(&source) as Arc<dyn EventSource>, 2);

    let ids: Vec<String> = (0..3)
        .map(|_| manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap())
        .collect();
    let running = manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();
    for id in &ids {
        manager.stop_event_monitoring(id).unwrap();
    }

    let none = EventLogFilter::default();
    assert!(matches!(
        manager.get_event_log(&ids[0], &none),
        Err(AppError::SessionNotFound(_))
    ));
    assert!(matches!(
        manager.stop_event_monitoring(&ids[0]),
        Err(AppError::SessionNotFound(_))
    ));
    assert!(manager.get_event_log(&ids[1], &none).is_ok());
    assert!(manager.get_event_log(&ids[2], &none).is_ok());
    assert_eq!(manager.summary(&running).unwrap().state, SessionState::Monitoring);
    assert_eq!(manager.list().len(), 3);
}

#[test]
fn stop_all_applies_retention() {
    let source = Arc::new(ManualSource::default());
    let manager = SessionManager::with_retention(Arc::clone(&source) as Arc<dyn EventSource>, 1);

    let running: Vec<String> = (0..4)
        .map(|_| manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap())
        .collect();
    assert_eq!(manager.list().len(), 4);

    assert_eq!(manager.stop_all(), 4);
    assert_eq!(manager.list().len(), 1);
    assert_eq!(source.released.load(Ordering::SeqCst), 4);
    let retained = running.iter().filter(|id| manager.summary(id).is_ok()).count();
    assert_eq!(retained, 1);
}

#[test]
fn dropping_the_manager_releases_subscriptions() {
    let (source, manager) = manager();
    manager.start_event_monitoring(ElementScope::default(), vec![]).unwrap();
    drop(manager);

    assert_eq!(source.released.load(Ordering::SeqCst), 1);
}
