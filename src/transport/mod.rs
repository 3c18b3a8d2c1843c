//! Host ↔ subprocess channel abstraction.
//!
//! A [`Transport`] carries one request frame out and one response frame
//! back per call; it never multiplexes. [`stdio::StdioTransport`] is the
//! only implementation: the request is written to the child's stdin and the
//! response read from its stdout, while stderr is relayed into the host's
//! log.
//!
//! - `codec`: [`FrameCodec`](codec::FrameCodec) newline framing with a
//!   length limit.
//! - `stdio`: child-process transport and its factory.

pub mod codec;
pub mod stdio;

use std::time::Duration;

use crate::host::SubprocessRole;
use crate::operations::BoxFuture;
use crate::Result;

/// Exclusive request/response channel to one subprocess instance.
pub trait Transport: Send {
    /// Write `frame` as one line and wait up to `deadline` for one line back.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`](crate::AppError::Timeout): no line within `deadline`.
    /// - [`AppError::ProcessCrashed`](crate::AppError::ProcessCrashed): the
    ///   peer exited or closed its end mid-call.
    /// - [`AppError::Protocol`](crate::AppError::Protocol): the frame could
    ///   not be encoded or the reply violated framing.
    fn send(&mut self, frame: String, deadline: Duration) -> BoxFuture<'_, Result<String>>;

    /// Whether the peer is alive and the channel still usable.
    fn is_connected(&mut self) -> bool;

    /// OS process id of the peer, when known.
    fn process_id(&self) -> Option<u32>;

    /// Force-kill the peer and everything it spawned.
    fn terminate(&mut self) -> BoxFuture<'_, ()>;

    /// Close the request stream, wait up to `grace` for a clean exit, then
    /// force-kill.
    fn shutdown(self: Box<Self>, grace: Duration) -> BoxFuture<'static, ()>;
}

/// Creates fresh transports; called on first use and after every failure.
pub trait TransportFactory: Send + Sync {
    /// Start a subprocess for `role` and connect to it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ProcessUnavailable`](crate::AppError::ProcessUnavailable)
    /// when the subprocess cannot be started.
    fn connect(&self, role: SubprocessRole) -> BoxFuture<'_, Result<Box<dyn Transport>>>;
}
