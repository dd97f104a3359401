//! # LocalRAG Security Module
//!
//! The egress control boundary. This file is the **front door** for
//! security auditing: every type that decides whether, what, and where
//! data may leave the machine is re-exported here.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                  localrag.rs (you are here)                      │
//! │                  Public API facade & documentation               │
//! ├────────────────┬───────────────┬──────────────┬─────────────────┤
//! │  context.rs    │ sanitizer.rs  │ allowlist.rs │ audit.rs        │
//! │  Mode gate,    │ Forbidden     │ Exact-or-    │ Sink trait,     │
//! │  capability    │ patterns,     │ subdomain    │ JSONL + hash    │
//! │  issuance      │ keyword query │ matching     │ chain           │
//! ├────────────────┴───────────────┴──────────────┴─────────────────┤
//! │  capability.rs: the only holder of TCP / DNS / HTTP primitives   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  self_test.rs: runtime verification of the controls above        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! 1. **Offline by default**: A context built from an empty config is
//!    `Offline`. Offline contexts never issue a [`NetworkCapability`], and
//!    every network primitive is a method of that capability, so no socket,
//!    DNS lookup or HTTP client can exist in offline mode.
//!
//! 2. **Keywords only**: Outbound queries pass [`QuerySanitizer`]. Paths,
//!    file names, hashes and SQL are rejected outright; quoted excerpts and
//!    punctuation are stripped; at most 12 lowercase tokens survive.
//!
//! 3. **Named destinations**: Requests go only to hosts that equal, or are
//!    subdomains of, an allowlisted domain. Redirects are held to the same
//!    rule.
//!
//! 4. **Recorded**: Every egress, cache hit, per-domain failure and
//!    violation is written to an [`AuditSink`]. Events carry sizes and
//!    timings, never response bodies.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use localrag::security::{JsonlAuditSink, SecurityContext, SecuritySelfTest};
//!
//! let sink = Arc::new(JsonlAuditSink::in_state_dir(&paths.state_dir));
//! let ctx = SecurityContext::from_config(&config.security, Some(sink))?;
//!
//! let report = SecuritySelfTest::new(&ctx).run_all();
//! assert!(report.all_passed());
//! ```
//!
//! ## Threat Model
//!
//! | Threat | Defense Layer |
//! |--------|--------------|
//! | Code path opens a socket while offline | Capability gate |
//! | Confidential path or file name in a query | Forbidden-pattern scan |
//! | Verbatim excerpt in a query | Quote stripping + token cap |
//! | Request to an unlisted host | Allowlist check per URL |
//! | Redirect to an unlisted host | Redirect policy re-checks the allowlist |
//! | Silent egress | Audit event per request |
//! | Audit log tampered | Hash chain |
//!
//! Content-based leak detection is out of scope: a query built only from
//! innocuous-looking keywords passes.

// ── Errors ──────────────────────────────────────────────────────────

pub use super::error::{SecurityError, SecurityResult, ViolationKind};

// ── Mode & Context ──────────────────────────────────────────────────

pub use super::capability::NetworkCapability;
pub use super::context::{DEFAULT_MAX_QUERY_LENGTH, SecurityContext, SecuritySettings};
pub use super::mode::Mode;

// ── Query Sanitization ──────────────────────────────────────────────

pub use super::sanitizer::{MAX_QUERY_TOKENS, MIN_QUERY_CHARS, QuerySanitizer, SanitizedQuery};

// ── Destination Allowlist ───────────────────────────────────────────

pub use super::allowlist::{DomainAllowlist, is_host_allowed};

// ── Audit Trail ─────────────────────────────────────────────────────

pub use super::audit::{
    AUDIT_FILENAME, AuditEvent, AuditEventKind, AuditRecord, AuditSink, JsonlAuditSink,
    MemoryAuditSink, audit_file_path, read_audit_log, verify_audit_chain,
};

// ── Self-Test ───────────────────────────────────────────────────────

pub use super::self_test::{SecuritySelfTest, SelfTestReport, SelfTestResult, SelfTestStatus};
