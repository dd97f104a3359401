//! Append-only egress audit trail.
//!
//! Events flow through the [`AuditSink`] trait. The production sink,
//! [`JsonlAuditSink`], writes one JSON object per line to
//! `<state_dir>/localrag.audit.jsonl`; each line carries the SHA-256 of the
//! previous raw line, forming a tamper-evident chain.
//!
//! # Format
//!
//! | Field | Description |
//! |-------|-------------|
//! | `timestamp` | RFC 3339 timestamp |
//! | `event` | `network_egress`, `web_retrieval_cached`, `security_violation`, `error`, `self_test`, `chain_recovery` |
//! | `method`, `url`, `status_code` | Request line and response status (egress only) |
//! | `response_size_bytes`, `execution_time_ms` | Size and duration (egress only) |
//! | `domain`, `query`, `violation`, `message`, ... | Event-specific context |
//! | `prev_entry_sha256` | SHA-256 of the previous JSONL line (file sink only) |
//!
//! [`AuditEvent`] has no field that can hold a response body.
//!
//! # Chain Integrity
//!
//! The first entry uses 64 zeros as `prev_entry_sha256`. A corrupted last
//! line is bridged by a `chain_recovery` entry before the next append.

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::error::ViolationKind;

pub const AUDIT_FILENAME: &str = "localrag.audit.jsonl";

/// How long a writer waits for another process to release the log.
const LOCK_TIMEOUT: Duration = Duration::from_secs(2);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// The hash used for the first entry in the chain (no predecessor).
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kinds of events recorded in the audit trail.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// An outbound request was made.
    NetworkEgress,
    /// A retrieval was served from cache; no request was made.
    WebRetrievalCached,
    /// The boundary refused an action.
    SecurityViolation,
    /// A destination failed during retrieval.
    Error,
    /// Outcome of one security self-test.
    SelfTest,
    /// Previous log line was corrupted; a new chain segment starts.
    ChainRecovery,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventKind::NetworkEgress => "network_egress",
            AuditEventKind::WebRetrievalCached => "web_retrieval_cached",
            AuditEventKind::SecurityViolation => "security_violation",
            AuditEventKind::Error => "error",
            AuditEventKind::SelfTest => "self_test",
            AuditEventKind::ChainRecovery => "chain_recovery",
        }
    }
}

/// One structured audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: AuditEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Sanitized query only. Raw queries are never recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<ViolationKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
    /// Correlates the events of one `retrieve` call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AuditEvent {
    pub fn new(event: AuditEventKind) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
            method: None,
            url: None,
            status_code: None,
            response_size_bytes: None,
            execution_time_ms: None,
            domain: None,
            query: None,
            violation: None,
            message: None,
            cache_key: None,
            test_name: None,
            request_id: None,
        }
    }

    /// An outbound request. Size and timing only, never the body.
    pub fn egress(
        method: &str,
        url: &str,
        status_code: u16,
        response_size_bytes: u64,
        execution_time_ms: f64,
    ) -> Self {
        Self {
            method: Some(method.to_string()),
            url: Some(url.to_string()),
            status_code: Some(status_code),
            response_size_bytes: Some(response_size_bytes),
            execution_time_ms: Some(execution_time_ms),
            ..Self::new(AuditEventKind::NetworkEgress)
        }
    }

    pub fn violation(kind: ViolationKind, reason: &str) -> Self {
        Self {
            violation: Some(kind),
            message: Some(reason.to_string()),
            ..Self::new(AuditEventKind::SecurityViolation)
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            message: Some(message.to_string()),
            ..Self::new(AuditEventKind::Error)
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn with_cache_key(mut self, key: &str) -> Self {
        self.cache_key = Some(key.to_string());
        self
    }

    pub fn with_test_name(mut self, name: &str) -> Self {
        self.test_name = Some(name.to_string());
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn with_request_id(mut self, id: &str) -> Self {
        self.request_id = Some(id.to_string());
        self
    }
}

/// Append-only recorder for audit events.
///
/// Implementations must not block indefinitely. Errors are reported to the
/// caller, which logs and drops them; a failing sink never fails retrieval.
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// A line of the JSONL audit file: the event plus its chain link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(flatten)]
    pub event: AuditEvent,
    /// SHA-256 of the previous JSONL line (hex-encoded).
    pub prev_entry_sha256: String,
}

/// Hash-chained JSONL file sink.
///
/// Writes are serialized in-process by a mutex and across processes by an
/// advisory lock on the log file.
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Sink at the default file name inside `state_dir`.
    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self::new(audit_file_path(state_dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Audit log lock poisoned"))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create audit log directory")?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open audit log")?;
        lock_with_deadline(&file)?;

        let result = append_chained(&mut file, event);
        let _ = FileExt::unlock(&file);
        result
    }
}

/// Take the advisory lock, giving up after [`LOCK_TIMEOUT`] instead of
/// waiting forever on another process.
fn lock_with_deadline(file: &fs::File) -> Result<()> {
    let deadline = Instant::now() + LOCK_TIMEOUT;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                if Instant::now() >= deadline {
                    anyhow::bail!(
                        "Audit log is locked by another process (waited {:?})",
                        LOCK_TIMEOUT
                    );
                }
                std::thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => return Err(e).context("Failed to lock audit log"),
        }
    }
}

/// Compute the chain link from the current contents and append `event`.
fn append_chained(file: &mut fs::File, event: &AuditEvent) -> Result<()> {
    let mut content = String::new();
    file.read_to_string(&mut content)
        .context("Failed to read audit log")?;

    // Read the last line to compute the chain hash, with corruption recovery
    let prev_hash = match content.lines().last() {
        Some(last_line) if !last_line.is_empty() => {
            if serde_json::from_str::<AuditRecord>(last_line).is_ok() {
                sha256_hex(last_line.as_bytes())
            } else {
                // Corrupted last line: write a ChainRecovery entry first.
                // A torn write leaves no trailing newline to append after.
                if !content.ends_with('\n') {
                    writeln!(file).context("Failed to write audit entry")?;
                }
                let recovery = AuditRecord {
                    event: AuditEvent::new(AuditEventKind::ChainRecovery).with_message(&format!(
                        "Previous entry corrupted ({} bytes), new chain segment",
                        last_line.len()
                    )),
                    prev_entry_sha256: sha256_hex(last_line.as_bytes()),
                };
                let recovery_json = serde_json::to_string(&recovery)
                    .context("Failed to serialize recovery entry")?;
                writeln!(file, "{}", recovery_json).context("Failed to write audit entry")?;
                sha256_hex(recovery_json.as_bytes())
            }
        }
        _ => GENESIS_HASH.to_string(),
    };

    let record = AuditRecord {
        event: event.clone(),
        prev_entry_sha256: prev_hash,
    };
    let json = serde_json::to_string(&record).context("Failed to serialize audit entry")?;
    writeln!(file, "{}", json).context("Failed to write audit entry")?;
    file.flush().context("Failed to flush audit log")?;
    Ok(())
}

/// In-memory sink, useful for tests and for embedding the boundary in a
/// host application that ships events elsewhere.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: AuditEventKind) -> usize {
        self.events().iter().filter(|e| e.event == kind).count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| anyhow::anyhow!("Audit buffer lock poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

/// Read and parse all entries from an audit log file.
///
/// Corrupted lines are skipped. A missing file yields an empty list.
pub fn read_audit_log(path: &Path) -> Result<Vec<AuditRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).context("Failed to read audit log")?;
    Ok(content
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<AuditRecord>(line).ok())
        .collect())
}

/// Verify the integrity of the audit log hash chain.
///
/// Returns the line indices where the chain is broken. Corrupted lines are
/// reported as broken. An empty result means the chain is intact.
pub fn verify_audit_chain(path: &Path) -> Result<Vec<usize>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path).context("Failed to read audit log")?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.is_empty()).collect();

    let mut broken = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let record = match serde_json::from_str::<AuditRecord>(line) {
            Ok(r) => r,
            Err(_) => {
                broken.push(i);
                continue;
            }
        };
        let expected = if i == 0 {
            GENESIS_HASH.to_string()
        } else {
            sha256_hex(lines[i - 1].as_bytes())
        };
        if record.prev_entry_sha256 != expected {
            broken.push(i);
        }
    }

    Ok(broken)
}

/// Get the full path to the audit log file.
pub fn audit_file_path(state_dir: &Path) -> PathBuf {
    state_dir.join(AUDIT_FILENAME)
}

/// Compute hex-encoded SHA-256.
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn egress_event(i: u16) -> AuditEvent {
        AuditEvent::egress("GET", &format!("https://arxiv.org/search/?query=q{}", i), 200, 512, 12.5)
    }

    #[test]
    fn audit_chain_integrity() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::in_state_dir(tmp.path());

        for i in 0..5 {
            sink.record(&egress_event(i)).unwrap();
        }

        let entries = read_audit_log(sink.path()).unwrap();
        assert_eq!(entries.len(), 5);

        let broken = verify_audit_chain(sink.path()).unwrap();
        assert!(broken.is_empty(), "Chain should be intact: {:?}", broken);
    }

    #[test]
    fn first_entry_uses_genesis_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::in_state_dir(tmp.path());
        sink.record(&AuditEvent::error("boom")).unwrap();

        let entries = read_audit_log(sink.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prev_entry_sha256, GENESIS_HASH);
        assert_eq!(entries[0].event.event, AuditEventKind::Error);
    }

    #[test]
    fn broken_chain_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::in_state_dir(tmp.path());
        for i in 0..3 {
            sink.record(&egress_event(i)).unwrap();
        }

        // Tamper with the middle line
        let content = fs::read_to_string(sink.path()).unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        let tampered = lines[1].replace("q1", "q9");
        lines[1] = &tampered;
        fs::write(sink.path(), lines.join("\n") + "\n").unwrap();

        let broken = verify_audit_chain(sink.path()).unwrap();
        assert_eq!(broken, vec![2]);
    }

    #[test]
    fn empty_log_no_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = audit_file_path(tmp.path());

        assert!(read_audit_log(&path).unwrap().is_empty());
        assert!(verify_audit_chain(&path).unwrap().is_empty());
    }

    #[test]
    fn chain_recovery_on_corrupted_line() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::in_state_dir(tmp.path());
        sink.record(&egress_event(0)).unwrap();

        let mut file = fs::OpenOptions::new().append(true).open(sink.path()).unwrap();
        writeln!(file, "this is not json").unwrap();
        drop(file);

        sink.record(&egress_event(1)).unwrap();

        let entries = read_audit_log(sink.path()).unwrap();
        // egress, chain_recovery, egress (garbage skipped)
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].event.event, AuditEventKind::ChainRecovery);
        assert!(entries[1].event.message.as_ref().unwrap().contains("corrupted"));

        // Only the garbage line itself breaks the chain
        let broken = verify_audit_chain(sink.path()).unwrap();
        assert_eq!(broken, vec![1]);
    }

    #[test]
    fn chain_recovery_after_torn_write() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::in_state_dir(tmp.path());
        sink.record(&AuditEvent::error("first")).unwrap();

        // Crash mid-write: partial line, no trailing newline
        let mut file = fs::OpenOptions::new().append(true).open(sink.path()).unwrap();
        write!(file, "{{\"timestamp\":\"2026").unwrap();
        drop(file);

        sink.record(&AuditEvent::error("second")).unwrap();

        let kinds: Vec<AuditEventKind> = read_audit_log(sink.path())
            .unwrap()
            .iter()
            .map(|e| e.event.event)
            .collect();
        assert_eq!(
            kinds,
            vec![AuditEventKind::Error, AuditEventKind::ChainRecovery, AuditEventKind::Error]
        );
        assert_eq!(verify_audit_chain(sink.path()).unwrap(), vec![1]);
    }

    #[test]
    fn lock_held_elsewhere_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = JsonlAuditSink::in_state_dir(tmp.path());
        sink.record(&AuditEvent::error("first")).unwrap();

        let holder = fs::OpenOptions::new().read(true).open(sink.path()).unwrap();
        holder.lock_exclusive().unwrap();

        let started = Instant::now();
        let err = sink.record(&AuditEvent::error("blocked")).unwrap_err();
        assert!(err.to_string().contains("locked by another process"));
        assert!(started.elapsed() < LOCK_TIMEOUT + Duration::from_secs(5));

        FileExt::unlock(&holder).unwrap();
        sink.record(&AuditEvent::error("after")).unwrap();
        assert_eq!(read_audit_log(sink.path()).unwrap().len(), 2);
    }

    #[test]
    fn egress_event_has_no_body_field() {
        let json = serde_json::to_value(egress_event(0)).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["event"], "network_egress");
        assert_eq!(obj["method"], "GET");
        assert_eq!(obj["status_code"], 200);
        assert_eq!(obj["response_size_bytes"], 512);
        for forbidden in ["body", "content", "response", "text"] {
            assert!(!obj.contains_key(forbidden), "unexpected field {}", forbidden);
        }
        // Unset optionals are omitted
        assert!(!obj.contains_key("violation"));
    }

    #[test]
    fn violation_event_serializes_kind() {
        let event = AuditEvent::violation(ViolationKind::DisallowedDestination, "evil.com");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"security_violation\""));
        assert!(json.contains("\"disallowed_destination\""));
    }

    #[test]
    fn concurrent_appends_keep_chain_intact() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = Arc::new(JsonlAuditSink::in_state_dir(tmp.path()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || sink.record(&egress_event(i)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(read_audit_log(sink.path()).unwrap().len(), 8);
        assert!(verify_audit_chain(sink.path()).unwrap().is_empty());
    }

    #[test]
    fn memory_sink_counts_by_kind() {
        let sink = MemoryAuditSink::new();
        sink.record(&egress_event(0)).unwrap();
        sink.record(&AuditEvent::error("x")).unwrap();
        sink.record(&egress_event(1)).unwrap();

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.count(AuditEventKind::NetworkEgress), 2);
        assert_eq!(sink.count(AuditEventKind::Error), 1);
    }
}
