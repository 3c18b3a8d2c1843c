//! Accessibility backend seam.
//!
//! Handlers talk to the platform only through [`AutomationBackend`] (element
//! actions) and [`EventSource`] (event subscriptions). Both are blocking
//! interfaces; callers run them on `tokio::task::spawn_blocking`.
//!
//! - `fixture`: in-memory desktop loaded from a JSON file.
//! - `unavailable`: placeholder used when no platform backend exists.

pub mod fixture;
pub mod unavailable;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::config::{BackendConfig, BackendKind};
use crate::models::element::{ElementInfo, ElementQuery, ElementScope, ToggleState};
use crate::models::session::SourceElement;
use crate::operations::HandlerError;
use crate::{AppError, Result};

pub use fixture::FixtureDesktop;
pub use unavailable::UnavailableBackend;

/// Result type of backend calls.
pub type BackendResult<T> = std::result::Result<T, HandlerError>;

/// Reference to an element located by [`AutomationBackend::find_element`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    /// Backend-specific runtime identifier.
    pub runtime_id: String,
}

/// Element actions against the platform accessibility tree.
pub trait AutomationBackend: Send + Sync {
    /// Locate the first element matching `query`.
    ///
    /// # Errors
    ///
    /// `ElementNotFound` when nothing matches.
    fn find_element(&self, query: &ElementQuery) -> BackendResult<ElementHandle>;

    /// Activate the element through its `Invoke` pattern.
    ///
    /// # Errors
    ///
    /// `PatternNotSupported` or `InvalidOperation` when the element cannot
    /// be invoked.
    fn invoke(&self, element: &ElementHandle) -> BackendResult<()>;

    /// Replace the element's value through its `Value` pattern.
    ///
    /// # Errors
    ///
    /// `PatternNotSupported` or `InvalidOperation` when the value cannot be
    /// set.
    fn set_value(&self, element: &ElementHandle, value: &str) -> BackendResult<()>;

    /// Cycle the element's `Toggle` pattern once, returning the new state.
    ///
    /// # Errors
    ///
    /// `PatternNotSupported` or `InvalidOperation` when the element cannot
    /// be toggled.
    fn toggle(&self, element: &ElementHandle) -> BackendResult<ToggleState>;

    /// Current properties of the element.
    ///
    /// # Errors
    ///
    /// `ElementNotFound` when the element disappeared.
    fn element_info(&self, element: &ElementHandle) -> BackendResult<ElementInfo>;
}

/// Accessibility event as delivered by an [`EventSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedEvent {
    /// Time the callback fired.
    pub timestamp: DateTime<Utc>,
    /// Event type name.
    pub event_type: String,
    /// Element that raised the event.
    pub source_element: SourceElement,
}

/// Write end handed to an event subscription.
///
/// Sending never blocks, so it is safe to call from the platform's own
/// callback thread.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ObservedEvent>,
}

impl EventSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ObservedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Record one event stamped with the current time.
    ///
    /// Returns `false` once the receiving session is gone.
    pub fn emit(&self, event_type: impl Into<String>, source_element: SourceElement) -> bool {
        self.tx
            .send(ObservedEvent {
                timestamp: Utc::now(),
                event_type: event_type.into(),
                source_element,
            })
            .is_ok()
    }

    /// Whether the receiving side has been dropped or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Active event subscription; delivery stops when it is released.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap the action that tears the subscription down.
    #[must_use]
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    #[must_use]
    pub fn inert() -> Self {
        Self { release: None }
    }

    /// Stop delivery and wait for the event source to let go of the sink.
    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Source of accessibility events.
pub trait EventSource: Send + Sync {
    /// Start delivering events of `event_types` raised inside `scope` to
    /// `sink`. An empty `event_types` list means every type.
    ///
    /// # Errors
    ///
    /// `PatternNotSupported` when the platform cannot subscribe, or
    /// `ElementNotFound` when the scope root does not exist.
    fn subscribe(
        &self,
        scope: &ElementScope,
        event_types: &[String],
        sink: EventSink,
    ) -> BackendResult<Subscription>;
}

/// Backend pair shared by the handlers of one subprocess.
#[derive(Clone)]
pub struct Backend {
    /// Element actions.
    pub automation: Arc<dyn AutomationBackend>,
    /// Event subscriptions.
    pub events: Arc<dyn EventSource>,
}

impl Backend {
    /// Open the backend selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the fixture cannot be loaded.
    pub fn open(config: &BackendConfig) -> Result<Self> {
        match config.kind {
            BackendKind::Unavailable => {
                let backend = Arc::new(UnavailableBackend);
                Ok(Self {
                    automation: Arc::clone(&backend) as Arc<dyn AutomationBackend>,
                    events: backend,
                })
            }
            BackendKind::Fixture => {
                let path = config.fixture_path.as_deref().ok_or_else(|| {
                    AppError::Config("fixture backend selected without fixture_path".into())
                })?;
                let desktop = Arc::new(FixtureDesktop::load(path)?);
                Ok(Self {
                    automation: Arc::clone(&desktop) as Arc<dyn AutomationBackend>,
                    events: desktop,
                })
            }
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}
