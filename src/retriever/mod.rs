//! Controlled web retrieval.
//!
//! | Step | Component |
//! |------|-----------|
//! | Mode check | [`SecurityContext`](crate::security::SecurityContext) |
//! | Keyword query | [`QuerySanitizer`](crate::security::QuerySanitizer) |
//! | Destination check | allowlist, per search URL |
//! | Cache | [`ResponseCache`] |
//! | Fetch | [`Fetcher`] (GET only) |
//! | Audit | [`AuditSink`](crate::security::AuditSink) |
//!
//! Every allowlisted domain is queried independently; one failing domain
//! never hides the results of another.

mod cache;
mod fetch;
mod web;

pub use cache::{CacheEntry, DEFAULT_MAX_CACHED_CHARS, ResponseCache};
pub use fetch::{
    DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT, FetchResponse, FetchSettings, Fetcher, HttpFetcher,
};
pub use web::{ControlledRetriever, build_search_url};

use serde::{Deserialize, Serialize};

use crate::security::{SanitizedQuery, SecurityError};

/// `doc_type` of every web-derived record.
pub const WEB_DOC_TYPE: &str = "web";

/// Confidentiality label attached to retrieved documents.
///
/// Web content is always public, whatever the query was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidentiality {
    Public,
}

impl std::fmt::Display for Confidentiality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidentiality::Public => f.write_str("public"),
        }
    }
}

/// A retrieved document, as handed to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRecord {
    pub content: String,
    pub source_url: String,
    pub domain: String,
    pub doc_type: String,
    pub confidentiality: Confidentiality,
    pub fetched_at: String,
    pub content_sha256: String,
}

/// Result of querying one allowlisted domain.
#[derive(Debug)]
pub struct DomainOutcome {
    pub domain: String,
    pub result: Result<DocumentRecord, SecurityError>,
}

/// Everything one retrieval produced, including per-domain failures.
#[derive(Debug)]
pub struct RetrievalReport {
    pub query: SanitizedQuery,
    pub request_id: String,
    pub outcomes: Vec<DomainOutcome>,
}

impl RetrievalReport {
    /// Successful records, in allowlist order.
    pub fn records(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Failed domains with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &SecurityError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.domain.as_str(), e)))
    }

    pub fn into_records(self, limit: usize) -> Vec<DocumentRecord> {
        self.outcomes
            .into_iter()
            .filter_map(|o| o.result.ok())
            .take(limit)
            .collect()
    }
}
