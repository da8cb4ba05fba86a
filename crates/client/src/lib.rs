//! Client code for esigate.
//!
//! This crate provides the HTTP executor, the retry/backoff engine and the
//! cache-aware fetch flow built on the types in `esigate-core`.
//!
//! Wiring is explicit: construct one [`CacheManager`](esigate_core::CacheManager)
//! and one [`RateLimitTracker`](esigate_core::RateLimitTracker) per process
//! and share them between fetchers.

pub mod executor;
pub mod fetcher;
pub mod retry;

#[cfg(test)]
mod testing;

pub use executor::{HttpExecutor, ReqwestExecutor, TransportError, TransportErrorKind};
pub use fetcher::{CachedFetcher, Fetched, Provenance};
pub use retry::{BackoffPolicy, Outcome, RetryEngine, RetryingExecutor, classify_status, classify_transport};
