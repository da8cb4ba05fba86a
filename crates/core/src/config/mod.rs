//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (ESIGATE_*, nested keys split on `__`)
//! 2. TOML config file (if ESIGATE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::ratelimit::{DEFAULT_REMAINING_HEADER, DEFAULT_RESET_HEADER};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (ESIGATE_*)
/// 2. TOML config file (if ESIGATE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache lifetime for responses without `Cache-Control: max-age` or `Expires`.
    ///
    /// Set via ESIGATE_DEFAULT_TTL_SECS environment variable.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Retry bound used when the caller does not supply one.
    ///
    /// Set via ESIGATE_MAX_RETRIES environment variable.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Per-class exponential backoff settings.
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Fraction of each backoff delay that may be shaved off at random.
    ///
    /// Set via ESIGATE_JITTER_RATIO environment variable.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Upstream error-budget headers and self-throttle floor.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// User-Agent string for upstream requests.
    ///
    /// Set via ESIGATE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via ESIGATE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Exponential backoff bounds for one retryable class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBackoff {
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl ClassBackoff {
    pub const fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self { base_ms, cap_ms }
    }

    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn cap(&self) -> Duration {
        Duration::from_millis(self.cap_ms)
    }
}

/// Backoff settings per retryable class.
///
/// e.g. ESIGATE_BACKOFF__THROTTLE_SEVERE__CAP_MS=600000
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// 5xx and retryable transport failures.
    #[serde(default = "default_server_error_backoff")]
    pub server_error: ClassBackoff,

    /// 429 Too Many Requests.
    #[serde(default = "default_throttle_standard_backoff")]
    pub throttle_standard: ClassBackoff,

    /// 420 Error Limited.
    #[serde(default = "default_throttle_severe_backoff")]
    pub throttle_severe: ClassBackoff,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            server_error: default_server_error_backoff(),
            throttle_standard: default_throttle_standard_backoff(),
            throttle_severe: default_throttle_severe_backoff(),
        }
    }
}

/// Upstream error-budget settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Header carrying the remaining error allowance.
    #[serde(default = "default_remaining_header")]
    pub remaining_header: String,

    /// Header carrying seconds until the allowance resets.
    #[serde(default = "default_reset_header")]
    pub reset_header: String,

    /// Wait for the reset before sending when the allowance is at or below this.
    #[serde(default = "default_min_remaining")]
    pub min_remaining: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            remaining_header: default_remaining_header(),
            reset_header: default_reset_header(),
            min_remaining: default_min_remaining(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_jitter_ratio() -> f64 {
    0.1
}

fn default_server_error_backoff() -> ClassBackoff {
    ClassBackoff::new(250, 5_000)
}

fn default_throttle_standard_backoff() -> ClassBackoff {
    ClassBackoff::new(1_000, 30_000)
}

fn default_throttle_severe_backoff() -> ClassBackoff {
    ClassBackoff::new(5_000, 300_000)
}

fn default_remaining_header() -> String {
    DEFAULT_REMAINING_HEADER.into()
}

fn default_reset_header() -> String {
    DEFAULT_RESET_HEADER.into()
}

fn default_min_remaining() -> u32 {
    5
}

fn default_user_agent() -> String {
    "esigate/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            max_retries: default_max_retries(),
            backoff: BackoffConfig::default(),
            jitter_ratio: default_jitter_ratio(),
            rate_limit: RateLimitConfig::default(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AppConfig {
    /// Default TTL as Duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `ESIGATE_`
    /// 2. TOML file from `ESIGATE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("ESIGATE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("ESIGATE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
