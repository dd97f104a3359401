//! The security context: the single gate for every network decision.
//!
//! A context is built once per process (or per test) from configuration and
//! is immutable afterwards. Share it as `Arc<SecurityContext>`; to change
//! mode, build a new one.

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::allowlist::DomainAllowlist;
use super::audit::{AuditEvent, AuditSink};
use super::capability::NetworkCapability;
use super::error::{SecurityError, ViolationKind};
use super::mode::Mode;
use super::sanitizer::{collapse_whitespace, replace_special_chars, strip_quoted, truncate_on_word_boundary};
use crate::config::SecurityConfig;

/// Default bound for [`SecurityContext::sanitize_query`].
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 100;

/// Construction parameters for a [`SecurityContext`].
#[derive(Debug, Clone)]
pub struct SecuritySettings {
    pub mode: Mode,
    pub allowlist: DomainAllowlist,
    pub sanitize_enabled: bool,
    pub max_query_length: usize,
}

impl SecuritySettings {
    /// Offline, empty allowlist, sanitization on.
    pub fn offline() -> Self {
        Self {
            mode: Mode::Offline,
            allowlist: DomainAllowlist::default(),
            sanitize_enabled: true,
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
        }
    }

    /// Egress to the given domains, sanitization on.
    pub fn egress<I, S>(domains: I) -> Result<Self, SecurityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            mode: Mode::Egress,
            allowlist: DomainAllowlist::new(domains)?,
            sanitize_enabled: true,
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
        })
    }
}

pub struct SecurityContext {
    mode: Mode,
    allowlist: DomainAllowlist,
    sanitize_enabled: bool,
    max_query_length: usize,
    audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityContext")
            .field("mode", &self.mode)
            .field("allowlist", &self.allowlist)
            .field("sanitize_enabled", &self.sanitize_enabled)
            .field("max_query_length", &self.max_query_length)
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

impl SecurityContext {
    pub fn new(settings: SecuritySettings, audit: Option<Arc<dyn AuditSink>>) -> Self {
        info!(
            "Security context initialized: mode={}, {} allowlisted domain(s), sanitize={}",
            settings.mode,
            settings.allowlist.len(),
            settings.sanitize_enabled
        );
        Self {
            mode: settings.mode,
            allowlist: settings.allowlist,
            sanitize_enabled: settings.sanitize_enabled,
            max_query_length: settings.max_query_length,
            audit,
        }
    }

    /// Build a context from the `[security]` config section.
    ///
    /// Fails with `InvalidConfiguration` for an unknown mode or a malformed
    /// allowlist entry.
    pub fn from_config(
        config: &SecurityConfig,
        audit: Option<Arc<dyn AuditSink>>,
    ) -> Result<Self, SecurityError> {
        let mode: Mode = config.mode.parse()?;
        let allowlist = DomainAllowlist::new(&config.egress.allowlist_domains)?;
        if config.max_query_length == 0 {
            return Err(SecurityError::InvalidConfiguration(
                "max_query_length must be greater than zero".to_string(),
            ));
        }
        Ok(Self::new(
            SecuritySettings {
                mode,
                allowlist,
                sanitize_enabled: config.sanitize_queries,
                max_query_length: config.max_query_length,
            },
            audit,
        ))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn allowlist(&self) -> &DomainAllowlist {
        &self.allowlist
    }

    pub fn sanitize_enabled(&self) -> bool {
        self.sanitize_enabled
    }

    pub fn max_query_length(&self) -> usize {
        self.max_query_length
    }

    /// Request permission to use the network.
    ///
    /// Offline contexts never issue a capability; the refusal is recorded
    /// to the audit sink before it is returned.
    pub fn network_capability(&self, purpose: &str) -> Result<NetworkCapability, SecurityError> {
        match self.mode {
            Mode::Offline => Err(self.violation(
                ViolationKind::OfflineNetwork,
                format!(
                    "Network access blocked in offline mode ({}). Set security.mode = \"egress\" to enable controlled network access.",
                    purpose
                ),
            )),
            Mode::Egress => Ok(NetworkCapability::issue(purpose)),
        }
    }

    /// Open a raw TCP connection through the capability gate.
    pub fn open_tcp_stream(
        &self,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<TcpStream, SecurityError> {
        let cap = self.network_capability("tcp connect")?;
        cap.connect_tcp(addr, timeout)
            .map_err(|e| SecurityError::TransientFetch {
                target: addr.to_string(),
                message: e.to_string(),
            })
    }

    /// Resolve a host name through the capability gate.
    pub fn resolve_host(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, SecurityError> {
        let cap = self.network_capability("dns lookup")?;
        cap.resolve(host, port)
            .map_err(|e| SecurityError::TransientFetch {
                target: host.to_string(),
                message: e.to_string(),
            })
    }

    /// Check a destination URL against the allowlist.
    ///
    /// Offline mode refuses the question itself rather than answering
    /// `false`.
    pub fn validate_destination(&self, url: &str) -> Result<bool, SecurityError> {
        if self.mode == Mode::Offline {
            return Err(self.violation(
                ViolationKind::OfflineNetwork,
                format!("Network request blocked in offline mode: {}", url),
            ));
        }

        let allowed = self.allowlist.is_url_allowed(url);
        if !allowed {
            debug!("Destination not allowlisted: {}", url);
        }
        Ok(allowed)
    }

    /// Reduce free text to a keyword string bounded by `max_query_length`.
    ///
    /// Identity when sanitization is disabled. Case is preserved; the
    /// stricter [`QuerySanitizer`](super::QuerySanitizer) handles
    /// forbidden patterns and lowercasing for outbound queries.
    pub fn sanitize_query(&self, query: &str) -> String {
        if !self.sanitize_enabled {
            return query.to_string();
        }

        let stripped = strip_quoted(query);
        let replaced = replace_special_chars(&stripped);
        let collapsed = collapse_whitespace(&replaced);
        truncate_on_word_boundary(&collapsed, self.max_query_length)
    }

    /// Record an outbound request. Never fails.
    pub fn log_egress(
        &self,
        method: &str,
        url: &str,
        status_code: u16,
        response_size: u64,
        execution_time_ms: f64,
    ) {
        self.record(&AuditEvent::egress(
            method,
            url,
            status_code,
            response_size,
            execution_time_ms,
        ));
    }

    /// Forward an event to the audit sink, if any. Never fails.
    pub fn record(&self, event: &AuditEvent) {
        if let Some(ref sink) = self.audit
            && let Err(e) = sink.record(event)
        {
            warn!("Failed to record {} audit event: {}", event.event.as_str(), e);
        }
    }

    /// Fail unless the context is in `expected` mode.
    pub fn require_mode(&self, expected: Mode) -> Result<(), SecurityError> {
        if self.mode != expected {
            return Err(self.violation(
                ViolationKind::ModeMismatch,
                format!(
                    "Operation requires mode={}. Current mode: {}",
                    expected, self.mode
                ),
            ));
        }
        Ok(())
    }

    /// Record a violation raised elsewhere (e.g. by the sanitizer).
    pub fn report_violation(&self, error: &SecurityError) {
        if let SecurityError::Violation { kind, reason } = error {
            warn!("Security violation ({}): {}", kind, reason);
            self.record(&AuditEvent::violation(*kind, reason));
        }
    }

    /// Build a violation, record it, and hand it back for returning.
    pub(crate) fn violation(&self, kind: ViolationKind, reason: String) -> SecurityError {
        let error = SecurityError::Violation { kind, reason };
        self.report_violation(&error);
        error
    }
}
