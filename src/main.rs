#![forbid(unsafe_code)]

//! `a11y-bridge`: accessibility bridge binary.
//!
//! Runs as the Worker or Monitor subprocess (`worker` / `monitor`), or as a
//! small host-side client that spawns a subprocess through the process
//! manager and performs one call (`call`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use a11y_bridge::host::spawner::CONFIG_ENV_VAR;
use a11y_bridge::host::{ProcessManager, SubprocessRole};
use a11y_bridge::models::OperationRequest;
use a11y_bridge::{subprocess, AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum Target {
    Worker,
    Monitor,
}

impl From<Target> for SubprocessRole {
    fn from(target: Target) -> Self {
        match target {
            Target::Worker => Self::Worker,
            Target::Monitor => Self::Monitor,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "a11y-bridge", about = "Accessibility automation bridge", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve element actions over stdin/stdout.
    Worker,
    /// Serve event-monitoring sessions over stdin/stdout.
    Monitor,
    /// Spawn a subprocess, perform one call and print the response.
    Call {
        /// Subprocess to call.
        #[arg(long, value_enum)]
        target: Target,
        /// Operation name, e.g. `InvokeElement`.
        #[arg(long)]
        operation: String,
        /// Parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
        /// Call timeout in seconds; defaults to `communication.timeout_seconds`.
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List the operations a subprocess serves.
    Operations {
        /// Subprocess to inspect.
        #[arg(long, value_enum)]
        target: Target,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            error!(%err, "fatal error");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<ExitCode> {
    // Subprocesses receive the host's config path through the environment.
    let config_path = args
        .config
        .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    let config = match config_path {
        Some(ref path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };

    match args.command {
        Command::Worker => serve(SubprocessRole::Worker, &config),
        Command::Monitor => serve(SubprocessRole::Monitor, &config),
        Command::Operations { target } => {
            let (registry, _sessions) = subprocess::build_registry(target.into(), &config)?;
            for name in registry.list_registered() {
                println!("{name}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Call {
            target,
            operation,
            params,
            timeout,
        } => {
            let parameters: serde_json::Value = serde_json::from_str(&params)
                .map_err(|err| AppError::Config(format!("--params is not valid JSON: {err}")))?;
            let timeout = timeout.map_or_else(|| config.communication.timeout(), Duration::from_secs);
            let request = OperationRequest::new(operation, parameters)
                .with_request_id(uuid::Uuid::new_v4().to_string())
                .with_timeout_seconds(timeout.as_secs().max(1));

            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
                .block_on(call(
                    &config,
                    config_path.as_deref(),
                    target.into(),
                    request,
                    timeout,
                ))
        }
    }
}

fn serve(role: SubprocessRole, config: &GlobalConfig) -> Result<ExitCode> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(subprocess::serve(role, config))?;
    Ok(ExitCode::SUCCESS)
}

async fn call(
    config: &GlobalConfig,
    config_path: Option<&std::path::Path>,
    role: SubprocessRole,
    request: OperationRequest,
    timeout: Duration,
) -> Result<ExitCode> {
    let manager = ProcessManager::from_config(config, config_path)?;

    let code = tokio::select! {
        result = manager.execute(role, request, timeout) => {
            println!("{}", serde_json::to_string(&result)?);
            if result.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        () = shutdown_signal() => {
            warn!("interrupted before the call completed");
            ExitCode::FAILURE
        }
    };

    manager.shutdown(config.process.shutdown_grace()).await;
    info!("subprocesses shut down");
    Ok(code)
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

/// Install the global subscriber. Output goes to stderr: a subprocess's
/// stdout is reserved for response frames.
fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
