//! Error types shared across the application.

use std::fmt::{Display, Formatter};

use crate::models::result::ErrorCode;
use crate::operations::HandlerError;

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all infrastructure failure modes.
///
/// Handler-level failures are expressed as [`HandlerError`]
/// and converted into wire results by the executor; `AppError` covers the
/// plumbing around them (configuration, registry, transport, processes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or stream I/O failure.
    Io(String),
    /// JSON encoding or decoding failure.
    Serialization(String),
    /// Wire framing or protocol violation.
    Protocol(String),
    /// An operation name was registered twice.
    DuplicateOperation(String),
    /// No handler is registered under the requested name.
    OperationNotRegistered(String),
    /// The registered handler type does not match the requested contract.
    TypeMismatch(String),
    /// A handler factory failed to build its handler.
    InstantiationFailed(String),
    /// A subprocess did not answer within its deadline.
    Timeout(String),
    /// A subprocess exited while a call was in flight.
    ProcessCrashed(String),
    /// A subprocess could not be spawned or is not connected.
    ProcessUnavailable(String),
    /// Requested monitoring session does not exist.
    SessionNotFound(String),
    /// Requested state transition is not permitted.
    InvalidOperation(String),
    /// The accessibility backend rejected a call.
    Automation(HandlerError),
}

impl AppError {
    /// Map the error onto the wire taxonomy reported to clients.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) | Self::Io(_) | Self::DuplicateOperation(_) => ErrorCode::Unknown,
            Self::Serialization(_) | Self::Protocol(_) => ErrorCode::SerializationError,
            Self::OperationNotRegistered(_) => ErrorCode::OperationNotFound,
            Self::TypeMismatch(_) => ErrorCode::TypeMismatch,
            Self::InstantiationFailed(_) => ErrorCode::InstantiationFailed,
            Self::Timeout(_) => ErrorCode::TimeoutError,
            Self::ProcessCrashed(_) => ErrorCode::ProcessCrashed,
            Self::ProcessUnavailable(_) => ErrorCode::ProcessUnavailable,
            Self::SessionNotFound(_) => ErrorCode::SessionNotFound,
            Self::InvalidOperation(_) => ErrorCode::InvalidOperation,
            Self::Automation(err) => err.error_code(),
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Serialization(msg) => write!(f, "serialization: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::DuplicateOperation(msg) => write!(f, "duplicate operation: {msg}"),
            Self::OperationNotRegistered(msg) => write!(f, "operation not registered: {msg}"),
            Self::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            Self::InstantiationFailed(msg) => write!(f, "instantiation failed: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::ProcessCrashed(msg) => write!(f, "process crashed: {msg}"),
            Self::ProcessUnavailable(msg) => write!(f, "process unavailable: {msg}"),
            Self::SessionNotFound(msg) => write!(f, "session not found: {msg}"),
            Self::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            Self::Automation(err) => write!(f, "automation: {err}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<HandlerError> for AppError {
    fn from(err: HandlerError) -> Self {
        Self::Automation(err)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
