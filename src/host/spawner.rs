//! Subprocess spawner.
//!
//! Spawns Worker and Monitor processes with:
//! - `kill_on_drop(true)` so a dropped handle never leaks a process.
//! - Its own process group on Unix, so a forced kill takes grandchildren
//!   down with it.
//! - `env_clear()` plus a small allowlist; the role and the configuration
//!   path are injected explicitly.
//! - All three standard streams piped: stdin/stdout carry frames, stderr
//!   carries diagnostics.

use std::path::PathBuf;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::info;

use super::SubprocessRole;
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by a spawned subprocess.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "RUST_BACKTRACE",
    "DISPLAY",
    "WAYLAND_DISPLAY",
    "DBUS_SESSION_BUS_ADDRESS",
    "XDG_RUNTIME_DIR",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
];

/// Environment variable naming the subprocess role.
pub const ROLE_ENV_VAR: &str = "A11Y_BRIDGE_ROLE";

/// Environment variable carrying the host's configuration file path.
pub const CONFIG_ENV_VAR: &str = "A11Y_BRIDGE_CONFIG";

// ── Configuration ────────────────────────────────────────────────────────────

/// How to launch one subprocess role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    /// Executable to run.
    pub program: PathBuf,
    /// Arguments passed to `program`.
    pub args: Vec<String>,
    /// Configuration file forwarded through [`CONFIG_ENV_VAR`].
    pub config_path: Option<PathBuf>,
}

// ── Process handle ───────────────────────────────────────────────────────────

/// A freshly spawned subprocess with its standard streams captured.
#[derive(Debug)]
pub struct SpawnedProcess {
    /// Child handle; `kill_on_drop` is set.
    pub child: Child,
    /// OS process id (also the process group id on Unix).
    pub pid: Option<u32>,
    /// Request stream.
    pub stdin: ChildStdin,
    /// Response stream.
    pub stdout: ChildStdout,
    /// Diagnostic stream.
    pub stderr: ChildStderr,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn the subprocess for `role`.
///
/// # Errors
///
/// Returns `AppError::ProcessUnavailable` on OS spawn failure or when a
/// standard stream could not be captured.
pub fn spawn_subprocess(role: SubprocessRole, config: &SpawnConfig) -> Result<SpawnedProcess> {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args);

    // Strip inherited environment, then inject only the safe allowlist.
    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    cmd.env(ROLE_ENV_VAR, role.as_str());
    if let Some(ref path) = config.config_path {
        cmd.env(CONFIG_ENV_VAR, path);
    }

    cmd.stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|err| {
        AppError::ProcessUnavailable(format!(
            "failed to spawn {role} subprocess '{}': {err}",
            config.program.display()
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::ProcessUnavailable(format!("failed to capture {role} stdin")))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::ProcessUnavailable(format!("failed to capture {role} stdout")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::ProcessUnavailable(format!("failed to capture {role} stderr")))?;

    let pid = child.id();
    info!(
        role = role.as_str(),
        pid = pid.unwrap_or(0),
        program = %config.program.display(),
        "subprocess spawned"
    );

    Ok(SpawnedProcess {
        child,
        pid,
        stdin,
        stdout,
        stderr,
    })
}
