//! Typed operation contract, registry and executor.
//!
//! Every unit of work a subprocess can perform is an [`Operation`]: a handler
//! with a request type, a result type, a synchronous `validate` step and an
//! asynchronous `execute` body. Handlers are registered by name in an
//! [`OperationRegistry`] at startup and dispatched through the
//! [`OperationExecutor`], which owns the failure classification.

pub mod executor;
pub mod registry;

use std::any::Any;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{ErrorCode, ServiceContext};
use crate::AppError;

pub use executor::OperationExecutor;
pub use registry::{OperationRegistry, Registration};

/// Boxed, sendable future used at type-erased seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failure raised by a handler body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The target element could not be located.
    ElementNotFound(String),
    /// The element lacks the accessibility pattern the operation needs.
    PatternNotSupported(String),
    /// The element or session state forbids the operation.
    InvalidOperation(String),
    /// The referenced monitoring session does not exist.
    SessionNotFound(String),
    /// The handler result could not be encoded.
    Serialization(String),
    /// Any other failure.
    Other(String),
}

impl HandlerError {
    /// Wire code this failure is reported under.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ElementNotFound(_) => ErrorCode::ElementNotFound,
            Self::PatternNotSupported(_) => ErrorCode::PatternNotSupported,
            Self::InvalidOperation(_) => ErrorCode::InvalidOperation,
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::Serialization(_) => ErrorCode::SerializationError,
            Self::Other(_) => ErrorCode::Unknown,
        }
    }

    /// Message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::ElementNotFound(msg)
            | Self::PatternNotSupported(msg)
            | Self::InvalidOperation(msg)
            | Self::SessionNotFound(msg)
            | Self::Serialization(msg)
            | Self::Other(msg) => msg,
        }
    }
}

impl Display for HandlerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ElementNotFound(msg) => write!(f, "element not found: {msg}"),
            Self::PatternNotSupported(msg) => write!(f, "pattern not supported: {msg}"),
            Self::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            Self::SessionNotFound(msg) => write!(f, "session not found: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<AppError> for HandlerError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::SessionNotFound(msg) => Self::SessionNotFound(msg),
            AppError::InvalidOperation(msg) => Self::InvalidOperation(msg),
            AppError::Serialization(msg) => Self::Serialization(msg),
            AppError::Automation(inner) => inner,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A named, typed unit of work.
///
/// `validate` runs before any side effect and must be cheap and synchronous;
/// `execute` carries the actual accessibility call. Blocking platform calls
/// belong on `tokio::task::spawn_blocking` inside `execute` so the executor's
/// time budget can still fire.
pub trait Operation: Send + Sync + 'static {
    /// Parameters object decoded from the request frame.
    type Request: DeserializeOwned + Send + 'static;
    /// Payload placed in the `data` slot of a successful result.
    type Response: Serialize + Send + 'static;

    /// Check the request before anything is attempted.
    ///
    /// # Errors
    ///
    /// Returns the human-readable reason the request was rejected.
    fn validate(&self, _request: &Self::Request) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Run the operation.
    fn execute(
        &self,
        request: Self::Request,
        ctx: &ServiceContext,
    ) -> impl Future<Output = std::result::Result<Self::Response, HandlerError>> + Send;
}

/// Failure in the synchronous preparation stage of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareError {
    /// Parameters did not decode into the request type.
    InvalidRequest(String),
    /// `validate` rejected the request.
    ValidationFailed(String),
}

/// Type-erased view of an [`Operation`] used by the registry and executor.
pub trait DynOperation: Send + Sync {
    /// Fully qualified handler type name.
    fn type_name(&self) -> &'static str;

    /// Decode and validate `parameters`, returning the handler body as a
    /// future that has not started yet.
    ///
    /// # Errors
    ///
    /// Returns [`PrepareError`] when decoding or validation fails; in that
    /// case the handler body is never polled.
    fn prepare<'a>(
        &'a self,
        parameters: serde_json::Value,
        ctx: &'a ServiceContext,
    ) -> std::result::Result<
        BoxFuture<'a, std::result::Result<serde_json::Value, HandlerError>>,
        PrepareError,
    >;

    /// Recover the concrete handler for typed access.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

/// Adapter from a concrete [`Operation`] to [`DynOperation`].
pub(crate) struct Erased<H>(pub(crate) H);

impl<H: Operation> DynOperation for Erased<H> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<H>()
    }

    fn prepare<'a>(
        &'a self,
        parameters: serde_json::Value,
        ctx: &'a ServiceContext,
    ) -> std::result::Result<
        BoxFuture<'a, std::result::Result<serde_json::Value, HandlerError>>,
        PrepareError,
    > {
        let request: H::Request = serde_json::from_value(parameters)
            .map_err(|err| PrepareError::InvalidRequest(err.to_string()))?;
        self.0
            .validate(&request)
            .map_err(PrepareError::ValidationFailed)?;

        Ok(Box::pin(async move {
            let response = self.0.execute(request, ctx).await?;
            serde_json::to_value(response).map_err(|err| {
                HandlerError::Serialization(format!("failed to encode handler result: {err}"))
            })
        }))
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        Box::new(self.0)
    }
}
