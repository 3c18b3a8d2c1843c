//! Child-process transport over standard I/O.

use std::process::ExitStatus;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::codec::{Encoder, FramedRead};
use tracing::{debug, warn};

use super::codec::FrameCodec;
use super::{Transport, TransportFactory};
use crate::host::spawner::{spawn_subprocess, SpawnConfig, SpawnedProcess};
use crate::host::SubprocessRole;
use crate::operations::BoxFuture;
use crate::{AppError, Result};

/// Grace given to a child that closed stdout to report its exit status.
const REAP_WINDOW: Duration = Duration::from_millis(250);

/// Tracing target for relayed subprocess diagnostics.
const RELAY_TARGET: &str = "a11y_bridge::subprocess";

/// Transport bound to one running subprocess.
pub struct StdioTransport {
    role: SubprocessRole,
    pid: Option<u32>,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: FramedRead<ChildStdout, FrameCodec>,
    encoder: FrameCodec,
    relay: JoinHandle<()>,
    /// Set for the whole exchange and cleared once a reply line is read, so
    /// an exchange abandoned mid-flight leaves the channel unusable.
    broken: bool,
}

impl StdioTransport {
    /// Wrap a spawned process; starts relaying its stderr immediately.
    #[must_use]
    pub fn new(role: SubprocessRole, process: SpawnedProcess, max_line_bytes: usize) -> Self {
        let SpawnedProcess {
            child,
            pid,
            stdin,
            stdout,
            stderr,
        } = process;

        Self {
            role,
            pid,
            child,
            stdin: Some(stdin),
            stdout: FramedRead::new(stdout, FrameCodec::with_max_length(max_line_bytes)),
            encoder: FrameCodec::with_max_length(max_line_bytes),
            relay: spawn_stderr_relay(role, pid, stderr),
            broken: false,
        }
    }

    async fn write_frame(&mut self, frame: String) -> Result<()> {
        let mut buf = BytesMut::with_capacity(frame.len().saturating_add(1));
        self.encoder.encode(frame, &mut buf)?;

        let role = self.role;
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            AppError::ProcessCrashed(format!("{role} request stream already closed"))
        })?;
        stdin.write_all(&buf).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Describe why the response stream ended.
    async fn exit_description(&mut self) -> String {
        match tokio::time::timeout(REAP_WINDOW, self.child.wait()).await {
            Ok(Ok(status)) => describe_exit(status),
            Ok(Err(err)) => format!("wait error: {err}"),
            Err(_) => "closed its output stream".to_owned(),
        }
    }

    async fn kill_tree(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) {
                if let Err(err) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                    debug!(role = self.role.as_str(), pid, %err, "killpg failed");
                }
            }
        }

        if let Err(err) = self.child.kill().await {
            debug!(role = self.role.as_str(), %err, "kill after killpg failed");
        }
    }
}

impl Transport for StdioTransport {
    fn send(&mut self, frame: String, deadline: Duration) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let role = self.role;
            if self.broken {
                return Err(AppError::ProcessCrashed(format!(
                    "{role} channel is no longer usable"
                )));
            }

            self.broken = true;
            let exchange = async {
                if let Err(err) = self.write_frame(frame).await {
                    return Err(match err {
                        AppError::Io(msg) => AppError::ProcessCrashed(format!(
                            "{role} subprocess stopped accepting requests: {msg}"
                        )),
                        other => other,
                    });
                }
                if let Some(line) = self.stdout.next().await {
                    line
                } else {
                    let reason = self.exit_description().await;
                    Err(AppError::ProcessCrashed(format!(
                        "{role} subprocess {reason} while a call was in flight"
                    )))
                }
            };

            let outcome = match tokio::time::timeout(deadline, exchange).await {
                Ok(outcome) => outcome,
                Err(_elapsed) => Err(AppError::Timeout(format!(
                    "{role} subprocess did not answer within {}ms",
                    deadline.as_millis()
                ))),
            };

            if outcome.is_ok() {
                self.broken = false;
            }
            outcome
        })
    }

    fn is_connected(&mut self) -> bool {
        !self.broken && self.stdin.is_some() && matches!(self.child.try_wait(), Ok(None))
    }

    fn process_id(&self) -> Option<u32> {
        self.pid
    }

    fn terminate(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            warn!(
                role = self.role.as_str(),
                pid = self.pid.unwrap_or(0),
                "force-killing subprocess tree"
            );
            self.broken = true;
            self.kill_tree().await;
        })
    }

    fn shutdown(mut self: Box<Self>, grace: Duration) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            // Closing stdin is the shutdown signal: the main loop sees EOF.
            drop(self.stdin.take());

            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(
                        role = self.role.as_str(),
                        status = %describe_exit(status),
                        "subprocess exited on shutdown"
                    );
                }
                Ok(Err(err)) => {
                    warn!(role = self.role.as_str(), %err, "error waiting for subprocess");
                }
                Err(_) => {
                    warn!(
                        role = self.role.as_str(),
                        grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                        "subprocess ignored shutdown, forcing kill"
                    );
                    self.kill_tree().await;
                }
            }
        })
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

/// Forward every stderr line of the subprocess into the host log.
fn spawn_stderr_relay(
    role: SubprocessRole,
    pid: Option<u32>,
    stderr: ChildStderr,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = FramedRead::new(stderr, FrameCodec::new());
        let mut resuming = false;
        loop {
            let Some(line) = lines.next().await else {
                if std::mem::take(&mut resuming) {
                    continue;
                }
                break;
            };
            match line {
                Ok(text) if text.trim().is_empty() => {}
                Ok(text) => {
                    debug!(
                        target: RELAY_TARGET,
                        role = role.as_str(),
                        pid = pid.unwrap_or(0),
                        "{text}"
                    );
                }
                Err(AppError::Protocol(msg)) => {
                    debug!(target: RELAY_TARGET, role = role.as_str(), %msg, "stderr line skipped");
                    resuming = true;
                }
                Err(_) => break,
            }
        }
    })
}

fn describe_exit(status: ExitStatus) -> String {
    status.code().map_or_else(
        || "was terminated by a signal".to_owned(),
        |code| format!("exited with code {code}"),
    )
}

/// [`TransportFactory`] spawning one subprocess per role.
#[derive(Debug, Clone)]
pub struct StdioTransportFactory {
    worker: SpawnConfig,
    monitor: SpawnConfig,
    max_line_bytes: usize,
}

impl StdioTransportFactory {
    /// Create a factory from per-role launch settings.
    #[must_use]
    pub fn new(worker: SpawnConfig, monitor: SpawnConfig, max_line_bytes: usize) -> Self {
        Self {
            worker,
            monitor,
            max_line_bytes,
        }
    }

    /// Launch settings for `role`.
    #[must_use]
    pub fn spawn_config(&self, role: SubprocessRole) -> &SpawnConfig {
        match role {
            SubprocessRole::Worker => &self.worker,
            SubprocessRole::Monitor => &self.monitor,
        }
    }
}

impl TransportFactory for StdioTransportFactory {
    fn connect(&self, role: SubprocessRole) -> BoxFuture<'_, Result<Box<dyn Transport>>> {
        Box::pin(async move {
            let process = spawn_subprocess(role, self.spawn_config(role))?;
            Ok(Box::new(StdioTransport::new(role, process, self.max_line_bytes))
                as Box<dyn Transport>)
        })
    }
}
