//! Content-addressed response cache.
//!
//! One pretty-printed JSON file per request URL at `<dir>/<key>.json`, where
//! the key is the first 16 hex chars of SHA-256(url). Entries are written to
//! a unique temp file and renamed into place, so readers see either the old
//! entry, the new entry, or nothing.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{Confidentiality, DocumentRecord, WEB_DOC_TYPE};
use crate::security::{SecurityError, sha256_hex};

/// Default cap on cached content length, in characters.
pub const DEFAULT_MAX_CACHED_CHARS: usize = 2000;

const CACHE_KEY_LEN: usize = 16;

/// A cached response. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub url: String,
    /// Body truncated to the cache's `max_content_chars`.
    pub content: String,
    pub domain: String,
    pub fetched_at: String,
    /// SHA-256 of the full, untruncated body.
    pub content_sha256: String,
    pub cache_key: String,
    pub doc_type: String,
    pub confidentiality: Confidentiality,
}

impl CacheEntry {
    pub fn to_record(&self) -> DocumentRecord {
        DocumentRecord {
            content: self.content.clone(),
            source_url: self.url.clone(),
            domain: self.domain.clone(),
            doc_type: self.doc_type.clone(),
            confidentiality: self.confidentiality,
            fetched_at: self.fetched_at.clone(),
            content_sha256: self.content_sha256.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    max_content_chars: usize,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, max_content_chars: usize) -> Self {
        Self {
            dir: dir.into(),
            max_content_chars,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_content_chars(&self) -> usize {
        self.max_content_chars
    }

    /// First 16 hex chars of SHA-256(url).
    pub fn cache_key(url: &str) -> String {
        let mut hex = sha256_hex(url.as_bytes());
        hex.truncate(CACHE_KEY_LEN);
        hex
    }

    pub fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::cache_key(url)))
    }

    /// Look up the entry for `url`.
    ///
    /// A missing file is `Ok(None)`. An unreadable or unparseable file is
    /// `CacheIo`; callers treat that as a miss.
    pub fn get(&self, url: &str) -> Result<Option<CacheEntry>, SecurityError> {
        let key = Self::cache_key(url);
        let path = self.entry_path(url);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(cache_io(&key, e)),
        };
        let entry: CacheEntry = serde_json::from_str(&content).map_err(|e| cache_io(&key, e))?;
        if entry.url != url {
            // Truncated-hash collision
            debug!("Cache key {} holds a different URL, treating as miss", key);
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Build the entry for a freshly fetched body without writing it.
    pub fn entry_for(&self, url: &str, domain: &str, body: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            content: truncate_chars(body, self.max_content_chars),
            domain: domain.to_string(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
            content_sha256: sha256_hex(body.as_bytes()),
            cache_key: Self::cache_key(url),
            doc_type: WEB_DOC_TYPE.to_string(),
            confidentiality: Confidentiality::Public,
        }
    }

    /// Write `entry` atomically, replacing any previous entry for its URL.
    pub fn store(&self, entry: &CacheEntry) -> Result<(), SecurityError> {
        let key = &entry.cache_key;
        fs::create_dir_all(&self.dir).map_err(|e| cache_io(key, e))?;
        let json = serde_json::to_string_pretty(entry).map_err(|e| cache_io(key, e))?;

        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp, json) {
            let _ = fs::remove_file(&tmp);
            return Err(cache_io(key, e));
        }
        if let Err(e) = fs::rename(&tmp, self.entry_path(&entry.url)) {
            let _ = fs::remove_file(&tmp);
            return Err(cache_io(key, e));
        }

        debug!("Cached {} as {}", entry.url, key);
        Ok(())
    }

    /// Build and store in one step.
    pub fn put(&self, url: &str, domain: &str, body: &str) -> Result<CacheEntry, SecurityError> {
        let entry = self.entry_for(url, domain, body);
        self.store(&entry)?;
        Ok(entry)
    }

    /// Delete the entry for `url`. Returns whether one existed.
    pub fn remove(&self, url: &str) -> Result<bool, SecurityError> {
        match fs::remove_file(self.entry_path(url)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(cache_io(&Self::cache_key(url), e)),
        }
    }

    /// Number of entries on disk.
    pub fn len(&self) -> usize {
        fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the cache directory wholesale and recreate it empty.
    pub fn clear(&self) -> Result<(), SecurityError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(cache_io("*", e)),
        }
        fs::create_dir_all(&self.dir).map_err(|e| cache_io("*", e))
    }
}

fn cache_io(key: &str, err: impl std::fmt::Display) -> SecurityError {
    SecurityError::CacheIo {
        key: key.to_string(),
        message: err.to_string(),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
