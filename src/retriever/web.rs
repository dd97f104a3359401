use futures::future::join_all;
use reqwest::Url;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{
    DocumentRecord, DomainOutcome, Fetcher, HttpFetcher, ResponseCache, RetrievalReport,
};
use crate::config::Config;
use crate::security::{
    AuditEvent, AuditEventKind, Mode, QuerySanitizer, SanitizedQuery, SecurityContext,
    SecurityError, ViolationKind,
};

/// Search URL for `domain`. Known research sites get their own search
/// endpoints; anything else gets `https://{domain}/search?q=`.
pub fn build_search_url(domain: &str, query: &SanitizedQuery) -> Result<Url, SecurityError> {
    let q = query.as_str();
    let parsed = match domain {
        "arxiv.org" => Url::parse_with_params(
            "https://arxiv.org/search/",
            &[
                ("query", q),
                ("searchtype", "all"),
                ("abstracts", "show"),
                ("order", "-announced_date_first"),
                ("size", "25"),
            ],
        ),
        "scholar.google.com" => Url::parse_with_params(
            "https://scholar.google.com/scholar",
            &[("q", q), ("hl", "en")],
        ),
        "ieeexplore.ieee.org" => Url::parse_with_params(
            "https://ieeexplore.ieee.org/search/searchresult.jsp",
            &[("newsearch", "true"), ("queryText", q)],
        ),
        _ => Url::parse_with_params(&format!("https://{}/search", domain), &[("q", q)]),
    };
    parsed.map_err(|e| {
        SecurityError::InvalidConfiguration(format!("Cannot build search URL for {}: {}", domain, e))
    })
}

/// Sanitize, validate, cache, fetch, audit: the only route from a query to
/// the web.
pub struct ControlledRetriever {
    ctx: Arc<SecurityContext>,
    cache: ResponseCache,
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
}

impl ControlledRetriever {
    pub fn new(
        ctx: Arc<SecurityContext>,
        cache: ResponseCache,
        fetcher: Arc<dyn Fetcher>,
        timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            cache,
            fetcher,
            timeout,
        }
    }

    /// Wire up an HTTP fetcher and the configured cache.
    ///
    /// Fails with a violation for offline contexts, since no HTTP client
    /// can be built without a network capability.
    pub fn from_config(ctx: Arc<SecurityContext>, config: &Config) -> Result<Self, SecurityError> {
        let settings = config.fetch_settings();
        let fetcher = HttpFetcher::for_context(&ctx, &settings)?;
        let cache = ResponseCache::new(
            config.web_cache_dir(),
            config.security.egress.max_cached_chars,
        );
        Ok(Self::new(ctx, cache, Arc::new(fetcher), settings.timeout))
    }

    pub fn context(&self) -> &SecurityContext {
        &self.ctx
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Retrieve at most `limit` records for `query` across all allowlisted
    /// domains. Per-domain failures are audited and dropped.
    pub async fn retrieve(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>, SecurityError> {
        Ok(self.retrieve_report(query).await?.into_records(limit))
    }

    /// Like [`retrieve`](Self::retrieve), keeping the sanitized query and
    /// every per-domain outcome.
    pub async fn retrieve_report(&self, query: &str) -> Result<RetrievalReport, SecurityError> {
        if self.ctx.mode() != Mode::Egress {
            return Err(self.ctx.violation(
                ViolationKind::OfflineRetrieval,
                "Web retrieval blocked in offline mode. Set security.mode = \"egress\" to enable."
                    .to_string(),
            ));
        }

        let sanitized = QuerySanitizer::sanitize_with_limit(query, self.ctx.max_query_length())
            .inspect_err(|e| self.ctx.report_violation(e))?;

        let request_id = uuid::Uuid::new_v4().to_string();
        info!(
            "Web retrieval {} across {} domain(s): {}",
            request_id,
            self.ctx.allowlist().len(),
            sanitized
        );

        let domains: Vec<String> = self.ctx.allowlist().domains().map(String::from).collect();
        let q = &sanitized;
        let rid = request_id.as_str();
        let outcomes = join_all(domains.into_iter().map(|domain| async move {
            let result = self.retrieve_domain(&domain, q, rid).await;
            DomainOutcome { domain, result }
        }))
        .await;

        for outcome in &outcomes {
            if let Err(ref e) = outcome.result {
                warn!("Retrieval from {} failed: {}", outcome.domain, e);
                self.ctx.record(
                    &AuditEvent::error(&e.to_string())
                        .with_domain(&outcome.domain)
                        .with_query(sanitized.as_str())
                        .with_request_id(&request_id),
                );
            }
        }

        Ok(RetrievalReport {
            query: sanitized,
            request_id,
            outcomes,
        })
    }

    async fn retrieve_domain(
        &self,
        domain: &str,
        query: &SanitizedQuery,
        request_id: &str,
    ) -> Result<DocumentRecord, SecurityError> {
        let url = build_search_url(domain, query)?;
        if !self.ctx.validate_destination(url.as_str())? {
            return Err(self.ctx.violation(
                ViolationKind::DisallowedDestination,
                format!("URL not allowlisted: {}", url),
            ));
        }

        match self.cache.get(url.as_str()) {
            Ok(Some(entry)) => {
                debug!("Cache hit for {} ({})", url, entry.cache_key);
                self.ctx.record(
                    &AuditEvent::new(AuditEventKind::WebRetrievalCached)
                        .with_domain(domain)
                        .with_url(url.as_str())
                        .with_cache_key(&entry.cache_key)
                        .with_query(query.as_str())
                        .with_request_id(request_id),
                );
                return Ok(entry.to_record());
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable cache entry: {}", e),
        }

        let started = Instant::now();
        let response = match tokio::time::timeout(self.timeout, self.fetcher.get(&url)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(SecurityError::TransientFetch {
                    target: url.to_string(),
                    message: format!("timed out after {}s", self.timeout.as_secs_f64()),
                });
            }
        };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.ctx.record(
            &AuditEvent::egress(
                "GET",
                url.as_str(),
                response.status,
                response.body.len() as u64,
                elapsed_ms,
            )
            .with_domain(domain)
            .with_query(query.as_str())
            .with_request_id(request_id),
        );

        if !response.is_success() {
            return Err(SecurityError::TransientFetch {
                target: url.to_string(),
                message: format!("HTTP {}", response.status),
            });
        }

        let entry = self.cache.entry_for(url.as_str(), domain, &response.body);
        if let Err(e) = self.cache.store(&entry) {
            warn!("Failed to cache {}: {}", url, e);
        }
        Ok(entry.to_record())
    }
}
