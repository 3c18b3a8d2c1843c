//! Read-dispatch-write loop of a Worker or Monitor process.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::{FutureExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::config::CommunicationOptions;
use crate::models::{ErrorCode, OperationRequest, OperationResult};
use crate::operations::executor::describe_panic;
use crate::operations::OperationExecutor;
use crate::transport::codec::FrameCodec;
use crate::{AppError, Result};

/// Settings of one main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOptions {
    /// Time budget for requests without `timeoutSeconds`.
    pub default_timeout: Duration,
    /// Longest accepted request line.
    pub max_line_bytes: usize,
}

impl LoopOptions {
    /// Derive loop settings from the channel configuration.
    #[must_use]
    pub fn from_communication(options: &CommunicationOptions) -> Self {
        Self {
            default_timeout: options.timeout(),
            max_line_bytes: options.buffer_size,
        }
    }
}

/// Serve requests from `reader` until it reaches end of stream.
///
/// Every non-blank line gets exactly one response line on `writer`, flushed
/// before the next request is read. Returns `Ok(())` on end of stream.
///
/// # Errors
///
/// Returns `AppError::Io` when reading the request stream or writing a
/// response fails; the caller should exit non-zero.
pub async fn run_main_loop<R, W>(
    reader: R,
    mut writer: W,
    executor: &OperationExecutor,
    options: &LoopOptions,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedRead::new(reader, FrameCodec::with_max_length(options.max_line_bytes));
    let mut served: u64 = 0;
    let mut resuming = false;

    loop {
        let Some(frame) = frames.next().await else {
            // FramedRead yields one `None` after a decode error, then resumes.
            if std::mem::take(&mut resuming) {
                continue;
            }
            break;
        };

        let response = match frame {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => dispatch_line(executor, &line, options.default_timeout).await,
            Err(AppError::Protocol(reason)) => {
                warn!(%reason, "rejected request frame");
                resuming = true;
                OperationResult::error(ErrorCode::SerializationError, reason)
            }
            Err(err) => return Err(err),
        };

        write_response(&mut writer, &response).await?;
        served += 1;
    }

    info!(served, "request stream closed");
    Ok(())
}

async fn dispatch_line(
    executor: &OperationExecutor,
    line: &str,
    default_timeout: Duration,
) -> OperationResult {
    let request: OperationRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            warn!(%err, "malformed request frame");
            return OperationResult::error(
                ErrorCode::SerializationError,
                format!("malformed request frame: {err}"),
            )
            .with_request_id(salvage_request_id(line));
        }
    };

    let timeout = request
        .timeout_seconds
        .filter(|secs| *secs > 0)
        .map_or(default_timeout, Duration::from_secs);
    let request_id = request.request_id;
    debug!(
        operation = %request.operation_name,
        request_id = request_id.as_deref().unwrap_or(""),
        "dispatching request"
    );

    let dispatched = AssertUnwindSafe(executor.execute(
        &request.operation_name,
        request.parameters,
        timeout,
    ))
    .catch_unwind()
    .await;

    let result = dispatched.unwrap_or_else(|payload| {
        OperationResult::error(
            ErrorCode::Unknown,
            format!("dispatch panicked: {}", describe_panic(payload.as_ref())),
        )
    });
    result.with_request_id(request_id)
}

/// Best-effort correlation id from a frame that failed to decode.
fn salvage_request_id(line: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()?
        .get("requestId")?
        .as_str()
        .map(str::to_owned)
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &OperationResult,
) -> Result<()> {
    let mut bytes = serde_json::to_vec(response)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
