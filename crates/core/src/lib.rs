//! Core types and shared functionality for esigate.
//!
//! This crate provides:
//! - In-memory response cache with HTTP validators
//! - Shared upstream error-budget tracking
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod upstream;

pub use cache::{CacheEntry, CacheManager, CacheStats, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::Error;
pub use ratelimit::{RateLimitBudget, RateLimitTracker};
pub use upstream::{UpstreamRequest, UpstreamResponse};
