//! Request frame sent from the host to a subprocess.
//!
//! The response frame is [`OperationResult`](super::result::OperationResult)
//! itself; both travel as one compact JSON object per `\n`-terminated line.

use serde::{Deserialize, Serialize};

/// One operation call on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    /// Registered operation name, e.g. `InvokeElement`.
    pub operation_name: String,
    /// Handler-specific parameters object.
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,
    /// Optional correlation id echoed back in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Handler time budget; the subprocess default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl OperationRequest {
    /// Build a request with no correlation id or explicit timeout.
    #[must_use]
    pub fn new(operation_name: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            operation_name: operation_name.into(),
            parameters,
            request_id: None,
            timeout_seconds: None,
        }
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set the handler time budget.
    #[must_use]
    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }
}
