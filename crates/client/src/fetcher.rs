//! Cache-aware fetch flow.
//!
//! A fresh cache entry is served without touching the network. Otherwise the
//! request goes out with the stored validators attached; a `304 Not Modified`
//! refreshes the entry's expiry and serves the stored body, and a `2xx` body
//! replaces the entry.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use esigate_core::{AppConfig, Clock, Error, ResponseCache, UpstreamRequest};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::retry::RetryingExecutor;

/// Where a fetched body came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Fresh cache entry, no request sent.
    Hit,
    /// The upstream answered 304 and the stored body was served.
    Revalidated,
    /// Live body from the upstream.
    Miss,
}

/// Fetched data plus cache provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub provenance: Provenance,
    pub expires_at: DateTime<Utc>,
}

impl<T> Fetched<T> {
    /// Whole seconds until the data goes stale, 0 once it has.
    pub fn expires_in(&self, now: DateTime<Utc>) -> u64 {
        (self.expires_at - now).num_seconds().max(0) as u64
    }

    pub fn is_cached(&self) -> bool {
        self.provenance != Provenance::Miss
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched { data: f(self.data), provenance: self.provenance, expires_at: self.expires_at }
    }
}

/// Caller-facing client combining the response cache and the retry engine.
pub struct CachedFetcher {
    cache: Arc<dyn ResponseCache>,
    engine: Arc<dyn RetryingExecutor>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl CachedFetcher {
    pub fn new(
        cache: Arc<dyn ResponseCache>, engine: Arc<dyn RetryingExecutor>, clock: Arc<dyn Clock>, max_retries: u32,
    ) -> Self {
        Self { cache, engine, clock, max_retries }
    }

    /// Fetcher retrying up to `config.max_retries` times.
    pub fn from_config(
        config: &AppConfig, cache: Arc<dyn ResponseCache>, engine: Arc<dyn RetryingExecutor>, clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(cache, engine, clock, config.max_retries)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Fetch a raw body, from cache when fresh.
    pub async fn fetch(&self, ctx: &CancellationToken, request: &UpstreamRequest) -> Result<Fetched<Bytes>, Error> {
        if !request.is_cacheable() {
            return self.fetch_uncached(ctx, request).await;
        }

        let key = request.cache_key();
        if let Some((body, expires_at)) = self.cache.get_with_expiry(&key) {
            return Ok(Fetched { data: body, provenance: Provenance::Hit, expires_at });
        }
        self.fetch_live(ctx, request, &key, true).await
    }

    /// Fetch and deserialize a JSON body.
    ///
    /// A cached body that no longer deserializes into `T` is discarded in
    /// favour of a live fetch. A live body that does not deserialize is
    /// reported as [`Error::Decode`].
    pub async fn fetch_json<T: DeserializeOwned>(
        &self, ctx: &CancellationToken, request: &UpstreamRequest,
    ) -> Result<Fetched<T>, Error> {
        if !request.is_cacheable() {
            let fetched = self.fetch_uncached(ctx, request).await?;
            return decode_live(fetched);
        }

        let key = request.cache_key();
        if let Some((body, expires_at)) = self.cache.get_with_expiry(&key) {
            match serde_json::from_slice::<T>(&body) {
                Ok(data) => return Ok(Fetched { data, provenance: Provenance::Hit, expires_at }),
                Err(e) => {
                    log_cache_decode(&key, &e);
                    self.cache.record_unusable_hit(&key);
                }
            }
            return decode_live(self.fetch_live(ctx, request, &key, false).await?);
        }

        let fetched = self.fetch_live(ctx, request, &key, true).await?;
        if fetched.provenance == Provenance::Revalidated {
            match serde_json::from_slice::<T>(&fetched.data) {
                Ok(data) => return Ok(fetched.map(|_| data)),
                Err(e) => log_cache_decode(&key, &e),
            }
            return decode_live(self.fetch_live(ctx, request, &key, false).await?);
        }
        decode_live(fetched)
    }

    async fn fetch_uncached(&self, ctx: &CancellationToken, request: &UpstreamRequest) -> Result<Fetched<Bytes>, Error> {
        let response = self.engine.execute_with_retry(ctx, request, self.max_retries).await?;
        Ok(Fetched { data: response.body, provenance: Provenance::Miss, expires_at: self.clock.now() })
    }

    /// Go to the upstream, optionally with the stored validators, and reconcile the cache.
    async fn fetch_live(
        &self, ctx: &CancellationToken, request: &UpstreamRequest, key: &str, conditional: bool,
    ) -> Result<Fetched<Bytes>, Error> {
        let mut outbound = request.clone();
        if conditional {
            self.cache.apply_conditional_headers(&mut outbound, key);
        }

        let response = self.engine.execute_with_retry(ctx, &outbound, self.max_retries).await?;

        if response.is_not_modified() {
            if !conditional {
                return Err(Error::NonRetryable {
                    status: Some(response.status.as_u16()),
                    message: format!("304 Not Modified for unconditional request to {}", request.url),
                });
            }
            let (Some(body), Some(expires_at)) =
                (self.cache.get_stale_allowed(key), self.cache.refresh_expiry(key, &response.headers))
            else {
                return Err(Error::NonRetryable {
                    status: Some(response.status.as_u16()),
                    message: format!("304 Not Modified for {} with nothing cached", request.url),
                });
            };
            return Ok(Fetched { data: body, provenance: Provenance::Revalidated, expires_at });
        }

        let expires_at = self.cache.set(key, response.body.clone(), &response.headers);
        Ok(Fetched { data: response.body, provenance: Provenance::Miss, expires_at })
    }
}

fn decode_live<T: DeserializeOwned>(fetched: Fetched<Bytes>) -> Result<Fetched<T>, Error> {
    let data = serde_json::from_slice::<T>(&fetched.data).map_err(|e| Error::Decode(e.to_string()))?;
    Ok(fetched.map(|_| data))
}

fn log_cache_decode(key: &str, err: &serde_json::Error) {
    let err = Error::CacheDecode(err.to_string());
    tracing::warn!(key, "Discarding cached body: {}", err);
}
