//! Cached response entries.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A stored upstream response body with its validators and expiry.
///
/// `expires_at` is computed once when the entry is stored and only ever
/// replaced wholesale by a revalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub body: Bytes,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Fresh means strictly before `expires_at`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whether a conditional request can be built from this entry.
    pub fn can_revalidate(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn entry(now: DateTime<Utc>, ttl_secs: i64) -> CacheEntry {
        CacheEntry {
            key: "k".into(),
            body: Bytes::from_static(b"{}"),
            etag: None,
            last_modified: None,
            expires_at: now + TimeDelta::seconds(ttl_secs),
            stored_at: now,
        }
    }

    #[test]
    fn test_freshness_boundary() {
        let now = Utc::now();
        let e = entry(now, 60);
        assert!(e.is_fresh(now));
        assert!(e.is_fresh(now + TimeDelta::seconds(59)));
        assert!(!e.is_fresh(now + TimeDelta::seconds(60)));
    }

    #[test]
    fn test_can_revalidate() {
        let now = Utc::now();
        let mut e = entry(now, 60);
        assert!(!e.can_revalidate());
        e.etag = Some("\"v1\"".into());
        assert!(e.can_revalidate());
    }
}
