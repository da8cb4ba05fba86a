//! Outcome classification for a single attempt.

use esigate_core::{Error, UpstreamResponse};
use reqwest::StatusCode;

use crate::executor::{TransportError, TransportErrorKind};

/// ESI's "420 Error Limited", sent once the error budget is spent.
pub const STATUS_ERROR_LIMITED: u16 = 420;

/// What happened on one attempt, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx, or 304 for the caller to reconcile with its cache.
    Success,
    /// 420: the upstream is blocking us until the error window resets.
    ThrottleSevere,
    /// 429 Too Many Requests.
    ThrottleStandard,
    /// 5xx, or a timeout/connect failure.
    ServerError,
    /// Everything else.
    NonRetryable,
}

impl Outcome {
    pub fn is_retryable(self) -> bool {
        matches!(self, Outcome::ThrottleSevere | Outcome::ThrottleStandard | Outcome::ServerError)
    }
}

/// Classify an HTTP status.
pub fn classify_status(status: StatusCode) -> Outcome {
    match status.as_u16() {
        200..=299 | 304 => Outcome::Success,
        STATUS_ERROR_LIMITED => Outcome::ThrottleSevere,
        429 => Outcome::ThrottleStandard,
        500..=599 => Outcome::ServerError,
        _ => Outcome::NonRetryable,
    }
}

/// Classify a failed exchange. Only timeouts and connect failures are worth retrying.
pub fn classify_transport(err: &TransportError) -> Outcome {
    match err.kind {
        TransportErrorKind::Timeout | TransportErrorKind::Connect => Outcome::ServerError,
        TransportErrorKind::Other => Outcome::NonRetryable,
    }
}

/// Error describing a non-success response.
pub fn response_error(outcome: Outcome, response: &UpstreamResponse) -> Error {
    let status = response.status.as_u16();
    match outcome {
        Outcome::ThrottleSevere => Error::ThrottleSevere { status },
        Outcome::ThrottleStandard => Error::ThrottleStandard { status },
        Outcome::ServerError => Error::ServerError { status: Some(status), message: describe(response) },
        Outcome::Success | Outcome::NonRetryable => {
            Error::NonRetryable { status: Some(status), message: describe(response) }
        }
    }
}

/// Error describing a failed exchange.
pub fn transport_error(outcome: Outcome, err: &TransportError) -> Error {
    match outcome {
        Outcome::ServerError => Error::ServerError { status: None, message: err.to_string() },
        _ => Error::NonRetryable { status: None, message: err.to_string() },
    }
}

/// Status line plus the upstream's error message when the body carries one.
fn describe(response: &UpstreamResponse) -> String {
    #[derive(serde::Deserialize)]
    struct UpstreamErrorBody {
        error: String,
    }

    match serde_json::from_slice::<UpstreamErrorBody>(&response.body) {
        Ok(body) => format!("status {}: {}", response.status.as_u16(), body.error),
        Err(_) => format!("status {}", response.status.as_u16()),
    }
}
