//! Error taxonomy for the egress boundary.
//!
//! | Variant | Meaning | Caller recovery |
//! |---------|---------|-----------------|
//! | `InvalidConfiguration` | Unknown mode or malformed allowlist | Fatal at startup |
//! | `Violation` | Any action the boundary refused | Report, do not retry verbatim |
//! | `TransientFetch` | One destination failed or timed out | Retry on a later call |
//! | `CacheIo` | Cache entry unreadable/unwritable | Treated as a cache miss |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of rule a rejected action broke.
///
/// Serialized into the `violation` field of `security_violation` audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A network-capable path was used while the context is offline.
    OfflineNetwork,
    /// Retrieval was requested while the context is offline.
    OfflineRetrieval,
    /// The destination host is not covered by the allowlist.
    DisallowedDestination,
    /// The raw query matched a forbidden pattern (path, hash, SQL, ...).
    ForbiddenPattern,
    /// Nothing searchable survived sanitization.
    EmptyQuery,
    /// An operation asserted a mode the context is not in.
    ModeMismatch,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::OfflineNetwork => "offline_network",
            ViolationKind::OfflineRetrieval => "offline_retrieval",
            ViolationKind::DisallowedDestination => "disallowed_destination",
            ViolationKind::ForbiddenPattern => "forbidden_pattern",
            ViolationKind::EmptyQuery => "empty_query",
            ViolationKind::ModeMismatch => "mode_mismatch",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SecurityError {
    /// Bad mode string or allowlist entry. The process should not proceed.
    #[error("Invalid security configuration: {0}")]
    InvalidConfiguration(String),

    /// The boundary refused the action.
    #[error("Security violation ({kind}): {reason}")]
    Violation { kind: ViolationKind, reason: String },

    /// Network or timeout failure contacting one destination.
    #[error("Fetch from {target} failed: {message}")]
    TransientFetch { target: String, message: String },

    /// Disk failure reading or writing a cache entry.
    #[error("Cache I/O error for {key}: {message}")]
    CacheIo { key: String, message: String },
}

impl SecurityError {
    pub fn violation(kind: ViolationKind, reason: impl Into<String>) -> Self {
        SecurityError::Violation {
            kind,
            reason: reason.into(),
        }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, SecurityError::Violation { .. })
    }

    /// The violation kind, if this error is a violation.
    pub fn violation_kind(&self) -> Option<ViolationKind> {
        match self {
            SecurityError::Violation { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type SecurityResult<T> = std::result::Result<T, SecurityError>;
