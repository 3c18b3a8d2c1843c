//! Backend used when no platform accessibility API is present.

use super::{
    AutomationBackend, BackendResult, ElementHandle, EventSink, EventSource, Subscription,
};
use crate::models::element::{ElementInfo, ElementQuery, ElementScope, ToggleState};
use crate::operations::HandlerError;

const REASON: &str = "no accessibility backend is available on this platform";

/// Rejects every call with `PatternNotSupported`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableBackend;

impl AutomationBackend for UnavailableBackend {
    fn find_element(&self, _query: &ElementQuery) -> BackendResult<ElementHandle> {
        Err(HandlerError::PatternNotSupported(REASON.into()))
    }

    fn invoke(&self, _element: &ElementHandle) -> BackendResult<()> {
        Err(HandlerError::PatternNotSupported(REASON.into()))
    }

    fn set_value(&self, _element: &ElementHandle, _value: &str) -> BackendResult<()> {
        Err(HandlerError::PatternNotSupported(REASON.into()))
    }

    fn toggle(&self, _element: &ElementHandle) -> BackendResult<ToggleState> {
        Err(HandlerError::PatternNotSupported(REASON.into()))
    }

    fn element_info(&self, _element: &ElementHandle) -> BackendResult<ElementInfo> {
        Err(HandlerError::PatternNotSupported(REASON.into()))
    }
}

impl EventSource for UnavailableBackend {
    fn subscribe(
        &self,
        _scope: &ElementScope,
        _event_types: &[String],
        _sink: EventSink,
    ) -> BackendResult<Subscription> {
        Err(HandlerError::PatternNotSupported(REASON.into()))
    }
}
