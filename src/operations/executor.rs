//! Resolve, validate, run and time-box one operation call.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, info_span, warn, Instrument};

use super::{HandlerError, OperationRegistry, PrepareError};
use crate::models::{ErrorCode, ErrorInfo, OperationResult, ServiceContext};
use crate::AppError;

/// Dispatches operation calls against a shared [`OperationRegistry`].
///
/// [`OperationExecutor::execute`] never panics and never returns an error:
/// every failure, including a panicking handler, comes back as a failed
/// [`OperationResult`].
#[derive(Debug, Clone)]
pub struct OperationExecutor {
    registry: Arc<OperationRegistry>,
}

impl OperationExecutor {
    /// Create an executor over `registry`.
    #[must_use]
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    /// Registry this executor dispatches against.
    #[must_use]
    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Execute `operation_name` with `parameters` under `timeout`.
    ///
    /// On timeout the handler future is dropped; blocking work it started on
    /// another thread may keep running. Reclaiming that thread is the
    /// supervising host's job.
    pub async fn execute(
        &self,
        operation_name: &str,
        parameters: serde_json::Value,
        timeout: Duration,
    ) -> OperationResult {
        let ctx = ServiceContext::new(operation_name, timeout);
        let span = info_span!(
            "execute_operation",
            operation = operation_name,
            operation_id = ctx.operation_id(),
        );

        let result = self.run(&ctx, parameters).instrument(span).await;
        match result {
            Ok(data) => {
                debug!(
                    operation = operation_name,
                    elapsed_ms = ctx.elapsed_ms(),
                    "operation succeeded"
                );
                OperationResult::success(data)
            }
            Err(details) => {
                warn!(
                    operation = operation_name,
                    operation_id = ctx.operation_id(),
                    code = ?details.error_code,
                    error = %details.message,
                    elapsed_ms = ctx.elapsed_ms(),
                    "operation failed"
                );
                OperationResult::failure(
                    details
                        .with_info("operationId", ctx.operation_id())
                        .with_info("operationName", operation_name)
                        .with_info("elapsedMs", ctx.elapsed_ms()),
                )
            }
        }
    }

    async fn run(
        &self,
        ctx: &ServiceContext,
        parameters: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ErrorInfo> {
        let handler = self
            .registry
            .instantiate(ctx.method_name())
            .map_err(|err| classify_dispatch(&err))?;

        let prepared = std::panic::catch_unwind(AssertUnwindSafe(|| {
            handler.prepare(parameters, ctx)
        }))
        .map_err(|payload| classify_panic(payload.as_ref()))?;

        let body = prepared.map_err(|err| match err {
            PrepareError::InvalidRequest(reason) => ErrorInfo::new(
                ErrorCode::InvalidRequest,
                format!("invalid parameters for {}: {reason}", ctx.method_name()),
            ),
            PrepareError::ValidationFailed(reason) => {
                ErrorInfo::new(ErrorCode::ValidationFailed, reason)
            }
        })?;

        match tokio::time::timeout(ctx.timeout(), AssertUnwindSafe(body).catch_unwind()).await {
            Err(_elapsed) => Err(ErrorInfo::new(
                ErrorCode::TimeoutError,
                format!(
                    "{} did not complete within {}s",
                    ctx.method_name(),
                    ctx.timeout().as_secs_f64()
                ),
            )),
            Ok(Err(payload)) => Err(classify_panic(payload.as_ref())),
            Ok(Ok(Err(err))) => Err(classify_handler(&err)),
            Ok(Ok(Ok(value))) => Ok(normalise_payload(value)),
        }
    }
}

/// Keep the `data` slot populated for handlers whose result encodes to `null`.
fn normalise_payload(value: serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        value
    }
}

fn classify_dispatch(err: &AppError) -> ErrorInfo {
    let message = match err {
        AppError::OperationNotRegistered(name) => format!("operation '{name}' is not registered"),
        other => other.to_string(),
    };
    ErrorInfo::new(err.error_code(), message)
}

fn classify_handler(err: &HandlerError) -> ErrorInfo {
    ErrorInfo::new(err.error_code(), err.message())
        .with_debug_trace(|| Backtrace::force_capture().to_string())
}

/// Text carried by a panic payload.
pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

fn classify_panic(payload: &(dyn Any + Send)) -> ErrorInfo {
    ErrorInfo::new(
        ErrorCode::Unknown,
        format!("handler panicked: {}", describe_panic(payload)),
    )
    .with_debug_trace(|| Backtrace::force_capture().to_string())
}
