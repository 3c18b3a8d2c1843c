//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::host::spawner::SpawnConfig;
use crate::host::SubprocessRole;
use crate::monitor::session_manager::DEFAULT_MAX_RETAINED_SESSIONS;
use crate::transport::codec::DEFAULT_MAX_LINE_BYTES;
use crate::{AppError, Result};

/// Smallest accepted frame limit.
const MIN_BUFFER_SIZE: usize = 1024;

/// Channel implementation between host and subprocesses.
///
/// Every method is recognised so that configuration files written for other
/// deployments parse, but only [`CommunicationMethod::Stdio`] is implemented.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationMethod {
    /// Child stdin/stdout pipes.
    #[default]
    Stdio,
    /// Named pipe / Unix domain socket.
    NamedPipe,
    /// Loopback TCP.
    Tcp,
    /// gRPC channel.
    Grpc,
}

impl CommunicationMethod {
    fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::NamedPipe => "named_pipe",
            Self::Tcp => "tcp",
            Self::Grpc => "grpc",
        }
    }
}

/// Frame payload encoding.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SerializationFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// `MessagePack` frames.
    MessagePack,
}

/// Host ↔ subprocess channel settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct CommunicationOptions {
    /// Channel implementation.
    pub method: CommunicationMethod,
    /// Pipe name for [`CommunicationMethod::NamedPipe`].
    pub pipe_name: String,
    /// Port for [`CommunicationMethod::Tcp`]; 0 picks a free port.
    pub port: u16,
    /// Maximum frame length in bytes.
    pub buffer_size: usize,
    /// Default per-call time budget.
    pub timeout_seconds: u64,
    /// Frame payload encoding.
    pub serialization_format: SerializationFormat,
}

impl Default for CommunicationOptions {
    fn default() -> Self {
        Self {
            method: CommunicationMethod::Stdio,
            pipe_name: "a11y-bridge".into(),
            port: 0,
            buffer_size: DEFAULT_MAX_LINE_BYTES,
            timeout_seconds: 30,
            serialization_format: SerializationFormat::Json,
        }
    }
}

impl CommunicationOptions {
    /// Default per-call time budget.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Subprocess supervision timings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ProcessConfig {
    /// Time a subprocess gets to exit after its stdin closes.
    pub shutdown_grace_ms: u64,
    /// Extra time the host waits beyond a call's own timeout.
    pub response_margin_ms: u64,
    /// Stopped monitoring sessions the Monitor keeps readable.
    pub max_retained_sessions: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 3000,
            response_margin_ms: 2000,
            max_retained_sessions: DEFAULT_MAX_RETAINED_SESSIONS,
        }
    }
}

impl ProcessConfig {
    /// [`ProcessConfig::shutdown_grace_ms`] as a duration.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// [`ProcessConfig::response_margin_ms`] as a duration.
    #[must_use]
    pub fn response_margin(&self) -> Duration {
        Duration::from_millis(self.response_margin_ms)
    }
}

/// Launch command override for one subprocess role.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SubprocessCommand {
    /// Executable; defaults to the running binary.
    pub program: Option<PathBuf>,
    /// Arguments; default to the role's subcommand.
    pub args: Option<Vec<String>>,
}

/// Accessibility backend used inside the subprocesses.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// No platform backend; every action fails `PatternNotSupported`.
    #[default]
    Unavailable,
    /// In-memory desktop loaded from a JSON fixture.
    Fixture,
}

/// Backend selection.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct BackendConfig {
    /// Backend implementation.
    pub kind: BackendKind,
    /// Fixture file for [`BackendKind::Fixture`].
    pub fixture_path: Option<PathBuf>,
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Channel settings.
    pub communication: CommunicationOptions,
    /// Supervision timings.
    pub process: ProcessConfig,
    /// Worker launch override.
    pub worker: SubprocessCommand,
    /// Monitor launch override.
    pub monitor: SubprocessCommand,
    /// Accessibility backend.
    pub backend: BackendConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// A relative `backend.fixture_path` is resolved against the directory
    /// holding the file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::Config(format!("failed to read config {}: {err}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&raw)?;

        if let (Some(fixture), Some(base)) = (config.backend.fixture_path.as_mut(), path.parent())
        {
            if fixture.is_relative() {
                *fixture = base.join(&*fixture);
            }
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Launch settings for `role`, forwarding `config_path` to the child.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when no program is configured and the
    /// running executable cannot be determined.
    pub fn spawn_config(
        &self,
        role: SubprocessRole,
        config_path: Option<&Path>,
    ) -> Result<SpawnConfig> {
        let command = match role {
            SubprocessRole::Worker => &self.worker,
            SubprocessRole::Monitor => &self.monitor,
        };

        let program = match command.program {
            Some(ref program) => program.clone(),
            None => std::env::current_exe().map_err(|err| {
                AppError::Config(format!("cannot locate the running executable: {err}"))
            })?,
        };
        let args = command
            .args
            .clone()
            .unwrap_or_else(|| vec![role.as_str().to_owned()]);

        Ok(SpawnConfig {
            program,
            args,
            config_path: config_path.map(Path::to_path_buf),
        })
    }

    fn validate(&self) -> Result<()> {
        let comm = &self.communication;
        if comm.method != CommunicationMethod::Stdio {
            return Err(AppError::Config(format!(
                "communication method '{}' is not supported; use 'stdio'",
                comm.method.as_str()
            )));
        }
        if comm.serialization_format != SerializationFormat::Json {
            return Err(AppError::Config(
                "only the 'json' serialization format is supported".into(),
            ));
        }
        if comm.buffer_size < MIN_BUFFER_SIZE {
            return Err(AppError::Config(format!(
                "buffer_size must be at least {MIN_BUFFER_SIZE} bytes"
            )));
        }
        if comm.timeout_seconds == 0 {
            return Err(AppError::Config(
                "timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.process.max_retained_sessions == 0 {
            return Err(AppError::Config(
                "max_retained_sessions must be at least 1".into(),
            ));
        }
        if self.backend.kind == BackendKind::Fixture && self.backend.fixture_path.is_none() {
            return Err(AppError::Config(
                "backend.fixture_path is required when backend.kind = \"fixture\"".into(),
            ));
        }
        Ok(())
    }
}
