//! HTTP executor: one request, one response, nothing else.
//!
//! The retry engine only talks to the [`HttpExecutor`] trait so tests can
//! replay scripted responses. [`ReqwestExecutor`] is the production
//! implementation; it performs no caching and no retries of its own.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use esigate_core::{AppConfig, Error, UpstreamRequest, UpstreamResponse};
use reqwest::Client;

/// Broad cause of a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request did not complete within the configured timeout.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// Anything else: body read failures, protocol errors, redirect loops.
    Other,
}

/// A request that produced no HTTP response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    source_error: Option<Arc<reqwest::Error>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source_error: None }
    }

    /// The underlying reqwest error, when there is one.
    pub fn reqwest_error(&self) -> Option<&reqwest::Error> {
        self.source_error.as_deref()
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else {
            TransportErrorKind::Other
        };
        Self { kind, message: err.to_string(), source_error: Some(Arc::new(err)) }
    }
}

/// Performs a single request/response exchange.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError>;
}

/// Production executor backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    http: Client,
}

impl ReqwestExecutor {
    /// Create a new executor with the given configuration.
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::InvalidRequest(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Wrap an already configured reqwest client.
    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, TransportError> {
        let start = Instant::now();

        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        tracing::debug!(
            "{} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status,
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(UpstreamResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::new(TransportErrorKind::Timeout, "deadline elapsed");
        assert_eq!(err.to_string(), "Timeout: deadline elapsed");
        assert!(err.reqwest_error().is_none());
    }

    #[tokio::test]
    async fn test_executor_new() {
        let executor = ReqwestExecutor::new(&AppConfig::default());
        assert!(executor.is_ok());
    }

    #[tokio::test]
    async fn test_connect_failure_is_classified() {
        let executor = ReqwestExecutor::new(&AppConfig { timeout_ms: 2_000, ..Default::default() }).unwrap();
        // port 9 (discard) on loopback is closed in any sane test environment
        let request = UpstreamRequest::get("http://127.0.0.1:9/").unwrap();

        let err = executor.execute(&request).await.unwrap_err();
        assert!(matches!(err.kind, TransportErrorKind::Connect | TransportErrorKind::Timeout));
        assert!(err.reqwest_error().is_some());
    }
}
