//! Domain model module declarations.

pub mod context;
pub mod element;
pub mod result;
pub mod session;
pub mod wire;

pub use context::ServiceContext;
pub use result::{ErrorCategory, ErrorCode, ErrorInfo, OperationResult};
pub use wire::OperationRequest;
