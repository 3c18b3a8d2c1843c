//! Element action handlers served by the Worker.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::run_blocking;
use crate::automation::AutomationBackend;
use crate::models::element::{ElementInfo, ElementQuery, ToggleState};
use crate::models::ServiceContext;
use crate::operations::{HandlerError, Operation};

/// Result of `InvokeElement`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InvokeElementResponse {
    /// Element that was invoked.
    pub automation_id: String,
    /// Always `true` on success.
    pub invoked: bool,
}

/// Parameters of `SetElementValue`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetElementValueRequest {
    /// Target element.
    #[serde(flatten)]
    pub element: ElementQuery,
    /// New value.
    pub value: String,
}

/// Result of `SetElementValue`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetElementValueResponse {
    /// Element that was updated.
    pub automation_id: String,
    /// Value reported by the element after the update.
    pub value: Option<String>,
}

/// Result of `ToggleElement`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToggleElementResponse {
    /// Element that was toggled.
    pub automation_id: String,
    /// State after the toggle.
    pub toggle_state: ToggleState,
}

/// `InvokeElement`: press a button-like element.
#[derive(Clone)]
pub struct InvokeElementHandler {
    backend: Arc<dyn AutomationBackend>,
}

impl InvokeElementHandler {
    /// Create a handler acting through `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self { backend }
    }
}

impl Operation for InvokeElementHandler {
    type Request = ElementQuery;
    type Response = InvokeElementResponse;

    fn validate(&self, request: &ElementQuery) -> Result<(), String> {
        request.validate()
    }

    async fn execute(
        &self,
        request: ElementQuery,
        _ctx: &ServiceContext,
    ) -> Result<InvokeElementResponse, HandlerError> {
        let backend = Arc::clone(&self.backend);
        run_blocking(move || {
            let element = backend.find_element(&request)?;
            backend.invoke(&element)?;
            Ok(InvokeElementResponse {
                automation_id: element.runtime_id,
                invoked: true,
            })
        })
        .await
    }
}

/// `SetElementValue`: replace the text of an editable element.
#[derive(Clone)]
pub struct SetElementValueHandler {
    backend: Arc<dyn AutomationBackend>,
}

impl SetElementValueHandler {
    /// Create a handler acting through `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self { backend }
    }
}

impl Operation for SetElementValueHandler {
    type Request = SetElementValueRequest;
    type Response = SetElementValueResponse;

    fn validate(&self, request: &SetElementValueRequest) -> Result<(), String> {
        request.element.validate()
    }

    async fn execute(
        &self,
        request: SetElementValueRequest,
        _ctx: &ServiceContext,
    ) -> Result<SetElementValueResponse, HandlerError> {
        let backend = Arc::clone(&self.backend);
        run_blocking(move || {
            let element = backend.find_element(&request.element)?;
            backend.set_value(&element, &request.value)?;
            let info = backend.element_info(&element)?;
            Ok(SetElementValueResponse {
                automation_id: element.runtime_id,
                value: info.value,
            })
        })
        .await
    }
}

/// `ToggleElement`: flip a checkbox-like element.
#[derive(Clone)]
pub struct ToggleElementHandler {
    backend: Arc<dyn AutomationBackend>,
}

impl ToggleElementHandler {
    /// Create a handler acting through `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self { backend }
    }
}

impl Operation for ToggleElementHandler {
    type Request = ElementQuery;
    type Response = ToggleElementResponse;

    fn validate(&self, request: &ElementQuery) -> Result<(), String> {
        request.validate()
    }

    async fn execute(
        &self,
        request: ElementQuery,
        _ctx: &ServiceContext,
    ) -> Result<ToggleElementResponse, HandlerError> {
        let backend = Arc::clone(&self.backend);
        run_blocking(move || {
            let element = backend.find_element(&request)?;
            let toggle_state = backend.toggle(&element)?;
            Ok(ToggleElementResponse {
                automation_id: element.runtime_id,
                toggle_state,
            })
        })
        .await
    }
}

/// `GetElementInfo`: read an element's accessible properties.
#[derive(Clone)]
pub struct GetElementInfoHandler {
    backend: Arc<dyn AutomationBackend>,
}

impl GetElementInfoHandler {
    /// Create a handler reading through `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn AutomationBackend>) -> Self {
        Self { backend }
    }
}

impl Operation for GetElementInfoHandler {
    type Request = ElementQuery;
    type Response = ElementInfo;

    fn validate(&self, request: &ElementQuery) -> Result<(), String> {
        request.validate()
    }

    async fn execute(
        &self,
        request: ElementQuery,
        _ctx: &ServiceContext,
    ) -> Result<ElementInfo, HandlerError> {
        let backend = Arc::clone(&self.backend);
        run_blocking(move || {
            let element = backend.find_element(&request)?;
            backend.element_info(&element)
        })
        .await
    }
}
