//! Security mode: the closed set of network postures a process can run in.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::SecurityError;

/// Network posture for the lifetime of a [`SecurityContext`](super::SecurityContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// No outbound network access of any kind.
    Offline,
    /// Outbound GETs to allowlisted destinations with sanitized queries.
    Egress,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Offline => "offline",
            Mode::Egress => "egress",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offline" => Ok(Mode::Offline),
            "egress" => Ok(Mode::Egress),
            other => Err(SecurityError::InvalidConfiguration(format!(
                "Invalid mode: {:?} (expected \"offline\" or \"egress\")",
                other
            ))),
        }
    }
}
