//! Destination allowlist with exact-or-subdomain matching.
//!
//! A host is allowed when it equals a configured domain or ends with
//! `"." + domain`. There are no wildcards and no prefix matches, so
//! `arxiv.org` covers `export.arxiv.org` but never `notarxiv.org`.

use reqwest::Url;
use std::collections::BTreeSet;

use super::error::SecurityError;

/// Normalized set of allowlisted domains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAllowlist {
    domains: BTreeSet<String>,
}

impl DomainAllowlist {
    /// Build an allowlist, normalizing each entry (trim, lowercase, strip
    /// trailing dot).
    ///
    /// Empty entries and anything that looks like a pattern (`*`, `/`, `:`,
    /// whitespace) are rejected: the allowlist only ever names hosts.
    pub fn new<I, S>(domains: I) -> Result<Self, SecurityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for raw in domains {
            let domain = normalize_host(raw.as_ref());
            if domain.is_empty() {
                return Err(SecurityError::InvalidConfiguration(
                    "Empty entry in allowlist_domains".to_string(),
                ));
            }
            if domain
                .chars()
                .any(|c| matches!(c, '*' | '/' | ':' | '@') || c.is_whitespace())
            {
                return Err(SecurityError::InvalidConfiguration(format!(
                    "Allowlist entry {:?} must be a bare domain name",
                    raw.as_ref()
                )));
            }
            set.insert(domain);
        }
        Ok(Self { domains: set })
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    /// Domains in sorted order.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(String::as_str)
    }

    pub fn contains_domain(&self, domain: &str) -> bool {
        self.domains.contains(&normalize_host(domain))
    }

    /// Check a bare host name against the allowlist.
    pub fn is_host_allowed(&self, host: &str) -> bool {
        is_host_allowed(host, self.domains.iter().map(String::as_str))
    }

    /// Check a full URL. Unparseable URLs, non-HTTP schemes, and URLs
    /// without a host are never allowed.
    pub fn is_url_allowed(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return false,
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        match parsed.host_str() {
            Some(host) => self.is_host_allowed(host),
            None => false,
        }
    }
}

/// Pure predicate: does `host` equal, or sit under, one of `domains`?
///
/// `domains` are expected to be normalized already.
pub fn is_host_allowed<'a, I>(host: &str, domains: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let host = normalize_host(host);
    if host.is_empty() {
        return false;
    }
    domains.into_iter().any(|domain| {
        host == domain
            || (host.len() > domain.len()
                && host.ends_with(domain)
                && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
    })
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}
