//! In-memory HTTP response cache with conditional-request support.
//!
//! This module provides:
//!
//! - Request-identity keys using SHA-256 hashing (credentials hashed separately)
//! - Freshness from `Cache-Control: max-age`, `Expires` or a default TTL
//! - `ETag` / `Last-Modified` validators for `If-None-Match` / `If-Modified-Since`
//! - Stale reads for recovering a body after a `304 Not Modified`

pub mod entry;
pub mod hash;
pub mod headers;
pub mod manager;

pub use entry::CacheEntry;
pub use hash::compute_cache_key;
pub use manager::{CacheManager, CacheStats, ResponseCache};
