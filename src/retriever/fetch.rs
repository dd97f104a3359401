//! HTTP fetching behind the capability gate.
//!
//! [`Fetcher`] exposes a single `get`; there is no way to issue any other
//! method through the retrieval path.

use async_trait::async_trait;
use reqwest::Url;
use reqwest::redirect::{Attempt, Policy};
use std::time::Duration;
use tracing::debug;

use crate::security::{DomainAllowlist, SecurityContext, SecurityError};

pub const DEFAULT_USER_AGENT: &str = "LocalRAG/0.1 (research assistant)";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Bytes read from a response before the rest is discarded.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_body_bytes: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &Url) -> Result<FetchResponse, SecurityError>;
}

/// `reqwest`-backed fetcher. Can only be built from an egress context.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Build a client through the context's network capability.
    ///
    /// Offline contexts refuse with a violation before any client exists.
    /// Redirects are followed only to allowlisted hosts.
    pub fn for_context(ctx: &SecurityContext, settings: &FetchSettings) -> Result<Self, SecurityError> {
        let cap = ctx.network_capability("http fetch")?;
        let allowlist = ctx.allowlist().clone();
        let builder = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .redirect(Policy::custom(move |attempt| allowlisted_redirect(attempt, &allowlist)));

        let client = cap
            .http_client(builder)
            .map_err(|e| SecurityError::InvalidConfiguration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_body_bytes: settings.max_body_bytes,
        })
    }
}

fn allowlisted_redirect(attempt: Attempt, allowlist: &DomainAllowlist) -> reqwest::redirect::Action {
    if attempt.previous().len() >= MAX_REDIRECTS {
        return attempt.error("too many redirects");
    }
    if allowlist.is_url_allowed(attempt.url().as_str()) {
        attempt.follow()
    } else {
        debug!("Refusing redirect to non-allowlisted {}", attempt.url());
        attempt.stop()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &Url) -> Result<FetchResponse, SecurityError> {
        debug!("GET {}", url);
        let transient = |e: reqwest::Error| SecurityError::TransientFetch {
            target: url.to_string(),
            message: e.to_string(),
        };

        let mut response = self.client.get(url.clone()).send().await.map_err(transient)?;
        let status = response.status().as_u16();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transient)? {
            if append_capped(&mut body, &chunk, self.max_body_bytes) {
                debug!("Body of {} truncated at {} bytes", url, self.max_body_bytes);
                break;
            }
        }
        Ok(FetchResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

/// Append as much of `chunk` as fits under `limit`. Returns true once full.
fn append_capped(buf: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    let room = limit.saturating_sub(buf.len());
    buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
    buf.len() >= limit
}
