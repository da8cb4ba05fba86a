//! Shared upstream error-budget tracking.
//!
//! The upstream advertises how many more failing requests it will tolerate
//! (`X-ESI-Error-Limit-Remain`) and how many seconds until that allowance
//! resets (`X-ESI-Error-Limit-Reset`). Every completed exchange is fed to
//! [`RateLimitTracker::observe`]; the retry engine reads
//! [`RateLimitTracker::snapshot`] before and after each attempt.
//!
//! The budget is swapped in as one immutable value, so readers always see a
//! `remaining`/`reset_at` pair taken from the same response.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, TimeDelta, Utc};
use http::HeaderMap;

use crate::clock::Clock;
use crate::config::AppConfig;

/// Default header carrying the remaining error allowance.
pub const DEFAULT_REMAINING_HEADER: &str = "x-esi-error-limit-remain";

/// Default header carrying seconds until the allowance resets.
pub const DEFAULT_RESET_HEADER: &str = "x-esi-error-limit-reset";

/// Most recently observed upstream error budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitBudget {
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl RateLimitBudget {
    /// Time left until the window rolls over, if it has not already.
    pub fn until_reset(&self, now: DateTime<Utc>) -> Option<Duration> {
        (self.reset_at > now).then(|| (self.reset_at - now).to_std().unwrap_or_default())
    }

    /// How long to hold off before the next request when the budget is at or below `floor`.
    pub fn wait_before_request(&self, now: DateTime<Utc>, floor: u32) -> Option<Duration> {
        if self.remaining > floor {
            return None;
        }
        self.until_reset(now)
    }
}

/// Process-local tracker of the upstream error budget.
#[derive(Debug)]
pub struct RateLimitTracker {
    budget: ArcSwapOption<RateLimitBudget>,
    remaining_header: String,
    reset_header: String,
    clock: Arc<dyn Clock>,
}

impl RateLimitTracker {
    /// Tracker reading the ESI error-limit headers.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_headers(DEFAULT_REMAINING_HEADER, DEFAULT_RESET_HEADER, clock)
    }

    /// Tracker reading custom budget headers.
    pub fn with_headers(remaining_header: &str, reset_header: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            budget: ArcSwapOption::empty(),
            remaining_header: remaining_header.to_ascii_lowercase(),
            reset_header: reset_header.to_ascii_lowercase(),
            clock,
        }
    }

    /// Tracker reading the headers named in `config.rate_limit`.
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_headers(&config.rate_limit.remaining_header, &config.rate_limit.reset_header, clock)
    }

    /// Record the budget advertised by a response.
    ///
    /// Returns `false` and leaves the tracked budget untouched when either
    /// header is missing or malformed.
    pub fn observe(&self, headers: &HeaderMap) -> bool {
        let remaining = header_number::<u32>(headers, &self.remaining_header);
        let reset_secs = header_number::<i64>(headers, &self.reset_header);

        let (Some(remaining), Some(reset_secs)) = (remaining, reset_secs) else {
            return false;
        };

        let now = self.clock.now();
        let reset_at = TimeDelta::try_seconds(reset_secs.max(0))
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now);

        self.budget.store(Some(Arc::new(RateLimitBudget { remaining, reset_at, last_updated: now })));
        tracing::debug!(remaining, reset_in_secs = reset_secs, "error budget observed");
        true
    }

    /// Consistent copy of the current budget, `None` until the first observation.
    pub fn snapshot(&self) -> Option<RateLimitBudget> {
        self.budget.load().as_deref().copied()
    }

    /// Forget the tracked budget.
    pub fn reset(&self) {
        self.budget.store(None);
    }
}

fn header_number<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}
