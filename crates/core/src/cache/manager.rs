//! Cache policy over the in-memory store.
//!
//! Entries are never evicted; a key is only ever overwritten by a newer
//! fetch for the same key. Per-key updates go through a single `DashMap`
//! shard lock, so body, validators and expiry change together.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::HeaderMap;
use http::header::{HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};

use super::entry::CacheEntry;
use super::headers;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::upstream::UpstreamRequest;

/// Read/write contract the fetcher relies on.
pub trait ResponseCache: Send + Sync {
    /// Body for `key` if the entry is still fresh.
    fn get(&self, key: &str) -> Option<Bytes>;

    /// Body and expiry for `key` if the entry is still fresh.
    fn get_with_expiry(&self, key: &str) -> Option<(Bytes, DateTime<Utc>)>;

    /// Body for `key` regardless of expiry. Only meant for 304 recovery.
    fn get_stale_allowed(&self, key: &str) -> Option<Bytes>;

    /// Store or overwrite an entry from a successful response. Returns the computed expiry.
    fn set(&self, key: &str, body: Bytes, headers: &HeaderMap) -> DateTime<Utc>;

    /// Replace only the expiry of an existing entry. Returns the new expiry, or `None` if no entry exists.
    fn refresh_expiry(&self, key: &str, headers: &HeaderMap) -> Option<DateTime<Utc>>;

    /// Add `If-None-Match` / `If-Modified-Since` from the stored entry, fresh or not.
    fn apply_conditional_headers(&self, request: &mut UpstreamRequest, key: &str);

    /// Count a hit whose body the caller could not use as a miss instead.
    fn record_unusable_hit(&self, key: &str);
}

/// Counters for cache lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub revalidations: u64,
    pub entries: usize,
}

/// In-memory response cache keyed by request identity.
#[derive(Debug)]
pub struct CacheManager {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    revalidations: AtomicU64,
}

impl CacheManager {
    pub fn new(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            revalidations: AtomicU64::new(0),
        }
    }

    /// Manager using `config.default_ttl()` for responses without freshness headers.
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.default_ttl(), clock)
    }

    /// Copy of the stored entry, fresh or not.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn fresh(&self, key: &str) -> Option<(Bytes, DateTime<Utc>)> {
        let now = self.clock.now();
        let found = self
            .entries
            .get(key)
            .filter(|r| r.value().is_fresh(now))
            .map(|r| (r.value().body.clone(), r.value().expires_at));

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key, "cache miss");
        }
        found
    }
}

impl ResponseCache for CacheManager {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.fresh(key).map(|(body, _)| body)
    }

    fn get_with_expiry(&self, key: &str) -> Option<(Bytes, DateTime<Utc>)> {
        self.fresh(key)
    }

    fn get_stale_allowed(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|r| r.value().body.clone())
    }

    fn set(&self, key: &str, body: Bytes, response_headers: &HeaderMap) -> DateTime<Utc> {
        let now = self.clock.now();
        let expires_at = headers::compute_expires_at(response_headers, now, self.default_ttl);
        let entry = CacheEntry {
            key: key.to_string(),
            body,
            etag: headers::etag(response_headers),
            last_modified: headers::last_modified(response_headers),
            expires_at,
            stored_at: now,
        };

        tracing::debug!(key, bytes = entry.body.len(), %expires_at, "cache store");
        self.entries.insert(key.to_string(), entry);
        expires_at
    }

    fn refresh_expiry(&self, key: &str, response_headers: &HeaderMap) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        let mut entry = self.entries.get_mut(key)?;
        entry.expires_at = headers::compute_expires_at(response_headers, now, self.default_ttl);
        self.revalidations.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(key, expires_at = %entry.expires_at, "cache revalidated");
        Some(entry.expires_at)
    }

    fn record_unusable_hit(&self, key: &str) {
        let _ = self.hits.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, "cache hit reclassified as miss");
    }

    fn apply_conditional_headers(&self, request: &mut UpstreamRequest, key: &str) {
        let Some(entry) = self.entries.get(key) else {
            return;
        };

        if let Some(etag) = &entry.etag
            && let Ok(value) = HeaderValue::try_from(etag.as_str())
        {
            request.headers.insert(IF_NONE_MATCH, value);
        }

        if let Some(last_modified) = entry.last_modified
            && let Ok(value) = HeaderValue::try_from(headers::format_http_date(last_modified))
        {
            request.headers.insert(IF_MODIFIED_SINCE, value);
        }
    }
}
