//! Request and response values exchanged with the HTTP executor.

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use url::Url;

use crate::Error;
use crate::cache::hash::compute_cache_key;

/// An outbound request to the upstream API.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl UpstreamRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url, headers: HeaderMap::new() }
    }

    /// Build a GET request from a URL string.
    pub fn get(url: &str) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| Error::InvalidRequest(format!("{url}: {e}")))?;
        Ok(Self::new(Method::GET, url))
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let header_name =
            HeaderName::try_from(name).map_err(|e| Error::InvalidRequest(format!("header name {name}: {e}")))?;
        let header_value =
            HeaderValue::try_from(value).map_err(|e| Error::InvalidRequest(format!("header {name}: {e}")))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Attach a bearer token. The value is marked sensitive.
    pub fn with_bearer(mut self, token: &str) -> Result<Self, Error> {
        let mut value = HeaderValue::try_from(format!("Bearer {token}"))
            .map_err(|e| Error::InvalidRequest(format!("authorization: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(header::AUTHORIZATION, value);
        Ok(self)
    }

    /// Whether responses to this request may be served from and stored in the cache.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// Cache key derived from method, URL and the `Authorization` credential.
    pub fn cache_key(&self) -> String {
        let credential = self.headers.get(header::AUTHORIZATION).map(|v| v.as_bytes());
        compute_cache_key(self.method.as_str(), self.url.as_str(), credential)
    }
}

/// A completed exchange as returned by the executor.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self { status, headers, body }
    }

    pub fn is_not_modified(&self) -> bool {
        self.status == StatusCode::NOT_MODIFIED
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_rejects_bad_url() {
        assert!(matches!(UpstreamRequest::get("not a url"), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_cache_key_includes_credential() {
        let anon = UpstreamRequest::get("https://esi.example.com/latest/status/").unwrap();
        let authed = anon.clone().with_bearer("token-a").unwrap();
        let other = anon.clone().with_bearer("token-b").unwrap();

        assert_ne!(anon.cache_key(), authed.cache_key());
        assert_ne!(authed.cache_key(), other.cache_key());
        assert!(!authed.cache_key().contains("token-a"));
    }

    #[test]
    fn test_cache_key_ignores_unrelated_headers() {
        let plain = UpstreamRequest::get("https://esi.example.com/latest/status/").unwrap();
        let tagged = plain.clone().with_header("x-request-id", "abc").unwrap();
        assert_eq!(plain.cache_key(), tagged.cache_key());
    }

    #[test]
    fn test_only_safe_methods_are_cacheable() {
        let url = Url::parse("https://esi.example.com/latest/ui/autopilot/waypoint/").unwrap();
        assert!(UpstreamRequest::new(Method::GET, url.clone()).is_cacheable());
        assert!(!UpstreamRequest::new(Method::POST, url).is_cacheable());
    }

    #[test]
    fn test_header_str() {
        let mut headers = HeaderMap::new();
        headers.insert("etag", HeaderValue::from_static("\"abc\""));
        let response = UpstreamResponse::new(StatusCode::OK, headers, Bytes::new());
        assert_eq!(response.header_str("etag"), Some("\"abc\""));
        assert_eq!(response.header_str("expires"), None);
        assert!(!response.is_not_modified());
    }
}
