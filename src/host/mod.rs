//! Host-side supervision of the Worker and Monitor subprocesses.
//!
//! - `spawner`: launches one subprocess with a sanitised environment.
//! - `process_manager`: owns both subprocess slots and the typed call
//!   contract.

pub mod process_manager;
pub mod spawner;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AppError;

pub use process_manager::ProcessManager;

/// Which subprocess a call is routed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubprocessRole {
    /// Stateless accessibility actions.
    Worker,
    /// Long-lived event-monitoring sessions.
    Monitor,
}

impl SubprocessRole {
    /// Lower-case role name used in logs and the role environment variable.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Monitor => "monitor",
        }
    }
}

impl Display for SubprocessRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubprocessRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "worker" => Ok(Self::Worker),
            "monitor" => Ok(Self::Monitor),
            other => Err(AppError::Config(format!("unknown subprocess role: {other}"))),
        }
    }
}
