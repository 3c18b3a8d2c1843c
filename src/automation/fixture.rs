//! In-memory desktop loaded from a JSON fixture.
//!
//! ```json
//! {
//!   "elements": [
//!     { "automationId": "window", "name": "Main", "controlType": "Window" },
//!     { "automationId": "btn1", "name": "OK", "controlType": "Button",
//!       "patterns": ["Invoke"], "parent": "window" }
//!   ],
//!   "events": [
//!     { "delayMs": 20, "eventType": "Invoked", "source": "btn1" }
//!   ]
//! }
//! ```
//!
//! Scripted events are replayed on a dedicated thread for every
//! subscription, each after `delayMs` measured from the previous one.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    AutomationBackend, BackendResult, ElementHandle, EventSink, EventSource, Subscription,
};
use crate::models::element::{ElementInfo, ElementQuery, ElementScope, ToggleState};
use crate::models::session::SourceElement;
use crate::operations::HandlerError;
use crate::{AppError, Result};

/// One element of the fixture tree.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FixtureElement {
    /// Accessible properties.
    #[serde(flatten)]
    pub info: ElementInfo,
    /// Automation id of the parent element, if any.
    #[serde(default)]
    pub parent: Option<String>,
}

/// Event replayed after a subscription starts.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedEvent {
    /// Delay after the previous event (or the subscription) in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    /// Event type name.
    pub event_type: String,
    /// Automation id of the element raising the event.
    pub source: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureFile {
    #[serde(default)]
    elements: Vec<FixtureElement>,
    #[serde(default)]
    events: Vec<ScriptedEvent>,
}

#[derive(Debug)]
struct DesktopState {
    elements: Vec<FixtureElement>,
    invocations: BTreeMap<String, usize>,
}

/// Scriptable in-memory accessibility tree.
#[derive(Debug)]
pub struct FixtureDesktop {
    state: Mutex<DesktopState>,
    script: Vec<ScriptedEvent>,
}

impl FixtureDesktop {
    /// Load a fixture file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or is invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read fixture {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse a fixture document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on malformed JSON, duplicate automation
    /// ids, or an event naming an unknown element.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: FixtureFile = serde_json::from_str(raw)
            .map_err(|err| AppError::Config(format!("invalid fixture: {err}")))?;

        let mut seen = std::collections::BTreeSet::new();
        for element in &file.elements {
            if !seen.insert(element.info.automation_id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate automation id in fixture: {}",
                    element.info.automation_id
                )));
            }
        }
        if let Some(event) = file
            .events
            .iter()
            .find(|event| !seen.contains(event.source.as_str()))
        {
            return Err(AppError::Config(format!(
                "scripted event references unknown element: {}",
                event.source
            )));
        }

        Ok(Self {
            state: Mutex::new(DesktopState {
                elements: file.elements,
                invocations: BTreeMap::new(),
            }),
            script: file.events,
        })
    }

    /// Number of successful `invoke` calls on `automation_id`.
    #[must_use]
    pub fn invocation_count(&self, automation_id: &str) -> usize {
        self.lock()
            .invocations
            .get(automation_id)
            .copied()
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, DesktopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `action` on the element behind `handle` after checking that it
    /// supports `pattern` and is enabled.
    fn act<T>(
        &self,
        handle: &ElementHandle,
        pattern: &str,
        action: impl FnOnce(&mut FixtureElement) -> T,
    ) -> BackendResult<T> {
        let mut state = self.lock();
        let element = state
            .elements
            .iter_mut()
            .find(|element| element.info.automation_id == handle.runtime_id)
            .ok_or_else(|| HandlerError::ElementNotFound(handle.runtime_id.clone()))?;

        if !element.info.supports(pattern) {
            return Err(HandlerError::PatternNotSupported(format!(
                "{} does not support the {pattern} pattern",
                handle.runtime_id
            )));
        }
        if !element.info.is_enabled {
            return Err(HandlerError::InvalidOperation(format!(
                "{} is disabled",
                handle.runtime_id
            )));
        }
        Ok(action(element))
    }
}

/// Whether `automation_id` lies inside `scope`.
fn in_scope(elements: &[FixtureElement], scope: &ElementScope, automation_id: &str) -> bool {
    let Some(ref root) = scope.root else {
        return true;
    };

    let mut current = elements
        .iter()
        .find(|element| element.info.automation_id == automation_id);
    // Bounded walk; a cyclic fixture cannot loop forever.
    for _ in 0..=elements.len() {
        let Some(element) = current else {
            return false;
        };
        if root.matches(&element.info) {
            return true;
        }
        if !scope.include_descendants {
            return false;
        }
        current = element.parent.as_deref().and_then(|parent| {
            elements
                .iter()
                .find(|candidate| candidate.info.automation_id == parent)
        });
    }
    false
}

fn source_of(elements: &[FixtureElement], automation_id: &str) -> SourceElement {
    elements
        .iter()
        .find(|element| element.info.automation_id == automation_id)
        .map_or_else(
            || SourceElement {
                automation_id: Some(automation_id.to_owned()),
                ..SourceElement::default()
            },
            |element| SourceElement {
                automation_id: Some(element.info.automation_id.clone()),
                name: Some(element.info.name.clone()),
                control_type: Some(element.info.control_type.clone()),
            },
        )
}

impl AutomationBackend for FixtureDesktop {
    fn find_element(&self, query: &ElementQuery) -> BackendResult<ElementHandle> {
        let state = self.lock();
        state
            .elements
            .iter()
            .find(|element| query.matches(&element.info))
            .map(|element| ElementHandle {
                runtime_id: element.info.automation_id.clone(),
            })
            .ok_or_else(|| HandlerError::ElementNotFound(describe_query(query)))
    }

    fn invoke(&self, element: &ElementHandle) -> BackendResult<()> {
        let id = element.runtime_id.clone();
        self.act(element, "Invoke", |_| ())?;
        *self.lock().invocations.entry(id).or_insert(0) += 1;
        Ok(())
    }

    fn set_value(&self, element: &ElementHandle, value: &str) -> BackendResult<()> {
        self.act(element, "Value", |target| {
            target.info.value = Some(value.to_owned());
        })
    }

    fn toggle(&self, element: &ElementHandle) -> BackendResult<ToggleState> {
        self.act(element, "Toggle", |target| {
            let next = target.info.toggle_state.unwrap_or(ToggleState::Off).next();
            target.info.toggle_state = Some(next);
            next
        })
    }

    fn element_info(&self, element: &ElementHandle) -> BackendResult<ElementInfo> {
        self.lock()
            .elements
            .iter()
            .find(|candidate| candidate.info.automation_id == element.runtime_id)
            .map(|candidate| candidate.info.clone())
            .ok_or_else(|| HandlerError::ElementNotFound(element.runtime_id.clone()))
    }
}

impl EventSource for FixtureDesktop {
    fn subscribe(
        &self,
        scope: &ElementScope,
        event_types: &[String],
        sink: EventSink,
    ) -> BackendResult<Subscription> {
        let planned: Vec<(Duration, String, SourceElement)> = {
            let state = self.lock();
            if let Some(ref root) = scope.root {
                if !state.elements.iter().any(|element| root.matches(&element.info)) {
                    return Err(HandlerError::ElementNotFound(describe_query(root)));
                }
            }

            // Delays accumulate across filtered-out events so timing matches
            // the full script.
            let mut pending = Duration::ZERO;
            let mut planned = Vec::new();
            for event in &self.script {
                pending = pending.saturating_add(Duration::from_millis(event.delay_ms));
                let wanted = event_types.is_empty() || event_types.contains(&event.event_type);
                if wanted && in_scope(&state.elements, scope, &event.source) {
                    planned.push((
                        pending,
                        event.event_type.clone(),
                        source_of(&state.elements, &event.source),
                    ));
                    pending = Duration::ZERO;
                }
            }
            planned
        };

        if planned.is_empty() {
            return Ok(Subscription::inert());
        }

        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let replay = std::thread::Builder::new()
            .name("fixture-events".into())
            .spawn(move || {
                for (delay, event_type, source) in planned {
                    match stop_rx.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    }
                    if !sink.emit(event_type, source) {
                        return;
                    }
                }
                debug!("fixture event script finished");
            })
            .map_err(|err| HandlerError::Other(format!("failed to start event thread: {err}")))?;

        Ok(Subscription::new(move || {
            drop(stop_tx);
            if replay.join().is_err() {
                warn!("fixture event thread panicked");
            }
        }))
    }
}

fn describe_query(query: &ElementQuery) -> String {
    let mut parts = Vec::new();
    if let Some(ref id) = query.automation_id {
        parts.push(format!("automationId={id}"));
    }
    if let Some(ref name) = query.name {
        parts.push(format!("name={name}"));
    }
    if let Some(ref control_type) = query.control_type {
        parts.push(format!("controlType={control_type}"));
    }
    format!("no element matches {}", parts.join(", "))
}
