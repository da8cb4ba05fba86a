//! Unified error types for esigate.
//!
//! Display strings carry a stable upper-case code so callers and log
//! pipelines can match on the class without parsing the message.

/// Unified error type shared by the cache, the retry engine and the fetcher.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid request construction (bad URL, bad header value).
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    /// Stored bytes could not be decoded into the caller's expected shape.
    ///
    /// Recovered locally by the fetcher; never surfaced from a fetch.
    #[error("CACHE_DECODE_FAILED: {0}")]
    CacheDecode(String),

    /// Upstream's hard rate-limit status (ESI "420 Error Limited").
    #[error("THROTTLED_SEVERE: status {status}")]
    ThrottleSevere { status: u16 },

    /// Generic "too many requests".
    #[error("THROTTLED: status {status}")]
    ThrottleStandard { status: u16 },

    /// 5xx, or a transport failure that is worth retrying (timeout, connect).
    #[error("SERVER_ERROR: {message}")]
    ServerError { status: Option<u16>, message: String },

    /// Any other 4xx, a malformed response or a transport failure that is not retryable.
    #[error("NON_RETRYABLE: {message}")]
    NonRetryable { status: Option<u16>, message: String },

    /// A live response body failed to deserialize.
    #[error("DECODE_FAILED: {0}")]
    Decode(String),

    /// Retries exhausted on a retryable class.
    #[error("MAX_RETRIES_EXCEEDED: gave up after {attempts} attempts: {last}")]
    MaxRetriesExceeded { attempts: u32, last: Box<Error> },

    /// The caller's cancellation token fired.
    #[error("CANCELLED")]
    Cancelled,
}

impl Error {
    /// Whether the retry engine would try again after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ThrottleSevere { .. } | Error::ThrottleStandard { .. } | Error::ServerError { .. })
    }

    /// Whether this error is the caller's own cancellation rather than an upstream fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// HTTP status behind the error, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ThrottleSevere { status } | Error::ThrottleStandard { status } => Some(*status),
            Error::ServerError { status, .. } | Error::NonRetryable { status, .. } => *status,
            Error::MaxRetriesExceeded { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Number of attempts made before giving up, for `MaxRetriesExceeded`.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Error::MaxRetriesExceeded { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ThrottleSevere { status: 420 };
        assert!(err.to_string().contains("THROTTLED_SEVERE"));
        assert!(err.to_string().contains("420"));

        assert_eq!(Error::Cancelled.to_string(), "CANCELLED");
    }

    #[test]
    fn test_max_retries_wraps_last_error() {
        let err = Error::MaxRetriesExceeded {
            attempts: 3,
            last: Box::new(Error::ServerError { status: Some(503), message: "status 503".into() }),
        };

        assert_eq!(err.attempts(), Some(3));
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(err.to_string().contains("SERVER_ERROR"));
    }

    #[test]
    fn test_classification_helpers() {
        assert!(Error::ThrottleStandard { status: 429 }.is_retryable());
        assert!(!Error::NonRetryable { status: Some(404), message: "not found".into() }.is_retryable());
        assert!(Error::Cancelled.is_cancelled());
        assert!(!Error::Decode("bad json".into()).is_cancelled());
        assert_eq!(Error::Cancelled.status(), None);
    }
}
