//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, ClassBackoff};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn validate_backoff(field: &str, backoff: &ClassBackoff) -> Result<(), ConfigError> {
    if backoff.base_ms == 0 {
        return Err(invalid(field, "base_ms must be greater than 0"));
    }
    if backoff.cap_ms < backoff.base_ms {
        return Err(invalid(field, "cap_ms must not be smaller than base_ms"));
    }
    Ok(())
}

fn validate_header_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if http::HeaderName::try_from(name).is_err() {
        return Err(invalid(field, "must be a valid HTTP header name"));
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `default_ttl_secs` is 0 or exceeds one day
    /// - a backoff class has a zero base or a cap below its base
    /// - `jitter_ratio` is outside [0, 1]
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - a budget header name is empty or not a valid header name
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_secs == 0 {
            return Err(invalid("default_ttl_secs", "must be greater than 0"));
        }
        if self.default_ttl_secs > 86_400 {
            return Err(invalid("default_ttl_secs", "must not exceed one day (86400s)"));
        }

        validate_backoff("backoff.server_error", &self.backoff.server_error)?;
        validate_backoff("backoff.throttle_standard", &self.backoff.throttle_standard)?;
        validate_backoff("backoff.throttle_severe", &self.backoff.throttle_severe)?;

        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(invalid("jitter_ratio", "must be between 0.0 and 1.0"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        validate_header_name("rate_limit.remaining_header", &self.rate_limit.remaining_header)?;
        validate_header_name("rate_limit.reset_header", &self.rate_limit.reset_header)?;

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        let caps = &self.backoff;
        if caps.throttle_severe.cap_ms < caps.throttle_standard.cap_ms
            || caps.throttle_standard.cap_ms < caps.server_error.cap_ms
        {
            tracing::warn!(
                server_error_cap_ms = caps.server_error.cap_ms,
                throttle_standard_cap_ms = caps.throttle_standard.cap_ms,
                throttle_severe_cap_ms = caps.throttle_severe.cap_ms,
                "Backoff caps are not ordered severe >= standard >= server_error; \
                 throttled requests may retry sooner than server errors"
            );
        }

        Ok(())
    }
}
