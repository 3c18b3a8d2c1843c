#![forbid(unsafe_code)]

//! Supervised subprocess bridge between automation clients and OS
//! accessibility APIs.
//!
//! The host side ([`host::ProcessManager`]) owns a Worker and a Monitor
//! subprocess and talks to each over one JSON line per request. Inside the
//! subprocesses, [`subprocess::run_main_loop`] feeds every request to an
//! [`operations::OperationExecutor`] that dispatches it to a typed handler.

pub mod automation;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod host;
pub mod models;
pub mod monitor;
pub mod operations;
pub mod subprocess;
pub mod transport;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
