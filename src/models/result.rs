//! Operation outcome model shared by the host and the subprocesses.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Wire-level failure taxonomy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Handler-level request validation rejected the parameters.
    ValidationFailed,
    /// Parameters could not be deserialized into the handler's request type.
    InvalidRequest,
    /// No handler is registered under the requested name.
    OperationNotFound,
    /// The registered handler does not satisfy the requested contract.
    TypeMismatch,
    /// The handler factory failed.
    InstantiationFailed,
    /// The target UI element could not be located.
    ElementNotFound,
    /// The element does not support the required accessibility pattern.
    PatternNotSupported,
    /// The element or session is in a state that forbids the operation.
    InvalidOperation,
    /// The call exceeded its time budget.
    TimeoutError,
    /// The backing subprocess exited while the call was in flight.
    ProcessCrashed,
    /// The backing subprocess could not be started.
    ProcessUnavailable,
    /// The monitoring session id is unknown.
    SessionNotFound,
    /// A frame could not be encoded or decoded.
    SerializationError,
    /// Anything not covered above.
    Unknown,
}

/// Coarse grouping of [`ErrorCode`]s.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller supplied bad input.
    Validation,
    /// Operation lookup or construction failed.
    Dispatch,
    /// The accessibility call itself failed.
    Automation,
    /// A time budget was exceeded.
    Timeout,
    /// Subprocess supervision failure.
    Process,
    /// Monitoring session failure.
    Session,
    /// Wire encoding failure.
    Serialization,
    /// Unclassified internal failure.
    Internal,
}

impl ErrorCode {
    /// Category this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::ValidationFailed | Self::InvalidRequest => ErrorCategory::Validation,
            Self::OperationNotFound | Self::TypeMismatch | Self::InstantiationFailed => {
                ErrorCategory::Dispatch
            }
            Self::ElementNotFound | Self::PatternNotSupported | Self::InvalidOperation => {
                ErrorCategory::Automation
            }
            Self::TimeoutError => ErrorCategory::Timeout,
            Self::ProcessCrashed | Self::ProcessUnavailable => ErrorCategory::Process,
            Self::SessionNotFound => ErrorCategory::Session,
            Self::SerializationError => ErrorCategory::Serialization,
            Self::Unknown => ErrorCategory::Internal,
        }
    }
}

/// Structured failure attached to an unsuccessful [`OperationResult`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Machine-readable failure code.
    pub error_code: ErrorCode,
    /// Category derived from `error_code`.
    pub error_category: ErrorCategory,
    /// Human-readable message.
    pub message: String,
    /// Captured stack trace; populated in debug builds only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Free-form diagnostic context (operation id, elapsed time, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_info: BTreeMap<String, serde_json::Value>,
}

impl ErrorInfo {
    /// Build an error with the category derived from `code`.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error_code: code,
            error_category: code.category(),
            message: message.into(),
            stack_trace: None,
            additional_info: BTreeMap::new(),
        }
    }

    /// Attach one diagnostic key/value pair.
    #[must_use]
    pub fn with_info(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.additional_info.insert(key.to_owned(), value.into());
        self
    }

    /// Attach a stack trace when built with debug assertions.
    #[must_use]
    pub fn with_debug_trace(mut self, trace: impl FnOnce() -> String) -> Self {
        if cfg!(debug_assertions) {
            self.stack_trace = Some(trace());
        }
        self
    }
}

/// Outcome of one operation call, exactly as it travels on the wire.
///
/// Fields are private so that the "exactly one of `data` / `error`"
/// invariant holds for every value built in-process. Values decoded from the
/// wire are checked with [`OperationResult::is_well_formed`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult<T = serde_json::Value> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_details: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl<T> OperationResult<T> {
    /// Successful result carrying `data`.
    #[must_use]
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_details: None,
            request_id: None,
        }
    }

    /// Failed result carrying `details`.
    #[must_use]
    pub fn failure(details: ErrorInfo) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(details.message.clone()),
            error_details: Some(details),
            request_id: None,
        }
    }

    /// Shorthand for [`OperationResult::failure`] with a fresh [`ErrorInfo`].
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::failure(ErrorInfo::new(code, message))
    }

    /// Echo the caller's correlation id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Option<String>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Whether the call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Result payload, if successful.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Short error message, if failed.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Structured error, if failed.
    #[must_use]
    pub fn error_details(&self) -> Option<&ErrorInfo> {
        self.error_details.as_ref()
    }

    /// Failure code, if failed.
    #[must_use]
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_details.as_ref().map(|details| details.error_code)
    }

    /// Correlation id echoed from the request.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// True when exactly one of `data` / `error` is populated and it agrees
    /// with `success`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        if self.success {
            self.data.is_some() && self.error.is_none() && self.error_details.is_none()
        } else {
            self.data.is_none() && self.error.is_some()
        }
    }

    /// Convert into a standard `Result`.
    ///
    /// # Errors
    ///
    /// Returns the attached [`ErrorInfo`] when the call failed. A malformed
    /// value is reported as [`ErrorCode::SerializationError`].
    pub fn into_result(self) -> std::result::Result<T, ErrorInfo> {
        match (self.success, self.data, self.error_details, self.error) {
            (true, Some(data), None, None) => Ok(data),
            (false, None, Some(details), _) => Err(details),
            (false, None, None, Some(message)) => Err(ErrorInfo::new(ErrorCode::Unknown, message)),
            _ => Err(ErrorInfo::new(
                ErrorCode::SerializationError,
                "result violates the data/error exclusivity invariant",
            )),
        }
    }
}

impl OperationResult<serde_json::Value> {
    /// Deserialize the untyped payload into `T`.
    ///
    /// A payload that does not match `T` becomes a
    /// [`ErrorCode::SerializationError`] failure; failures pass through.
    #[must_use]
    pub fn into_typed<T: DeserializeOwned>(self) -> OperationResult<T> {
        let request_id = self.request_id.clone();
        let typed = match self.into_result() {
            Ok(value) => match serde_json::from_value::<T>(value) {
                Ok(data) => OperationResult::success(data),
                Err(err) => OperationResult::error(
                    ErrorCode::SerializationError,
                    format!("response payload does not match the expected type: {err}"),
                ),
            },
            Err(details) => OperationResult::failure(details),
        };
        typed.with_request_id(request_id)
    }
}
