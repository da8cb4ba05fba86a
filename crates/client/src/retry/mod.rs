//! Retry engine wrapping the HTTP executor.
//!
//! Each attempt is classified into an [`Outcome`]. Retryable outcomes wait
//! out a per-class exponential backoff and try again until `max_retries`
//! retries have been spent, so a call makes at most `max_retries + 1`
//! attempts. Every response, failed or not, updates the shared
//! [`RateLimitTracker`]. When the upstream says we are nearly out of errors,
//! the first attempt waits for the window to reset instead of spending the
//! rest; on retries the time to reset is folded into the backoff, so a single
//! wait between attempts never exceeds the class cap.
//!
//! Cancellation is checked before every attempt and raced against both the
//! in-flight request and any wait.

pub mod backoff;
pub mod classify;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use esigate_core::cache::headers::parse_http_date;
use esigate_core::{AppConfig, Clock, Error, RateLimitTracker, UpstreamRequest, UpstreamResponse};
use reqwest::header::RETRY_AFTER;
use tokio_util::sync::CancellationToken;

use crate::executor::HttpExecutor;

pub use backoff::BackoffPolicy;
pub use classify::{Outcome, classify_status, classify_transport};

/// Executes a request, retrying transient failures.
#[async_trait]
pub trait RetryingExecutor: Send + Sync {
    /// Run `request` until it succeeds, fails permanently, runs out of
    /// retries or `ctx` is cancelled.
    async fn execute_with_retry(
        &self, ctx: &CancellationToken, request: &UpstreamRequest, max_retries: u32,
    ) -> Result<UpstreamResponse, Error>;
}

/// One failed attempt and what it means for the next one.
#[derive(Debug)]
struct RetryAttempt {
    attempt: u32,
    outcome: Outcome,
    error: Error,
    /// Minimum wait the upstream asked for, if any.
    hint: Option<Duration>,
}

/// Retry engine over an [`HttpExecutor`].
pub struct RetryEngine {
    executor: Arc<dyn HttpExecutor>,
    tracker: Arc<RateLimitTracker>,
    clock: Arc<dyn Clock>,
    policy: BackoffPolicy,
    min_remaining: u32,
}

impl RetryEngine {
    pub fn new(
        executor: Arc<dyn HttpExecutor>, tracker: Arc<RateLimitTracker>, clock: Arc<dyn Clock>,
        policy: BackoffPolicy, min_remaining: u32,
    ) -> Self {
        Self { executor, tracker, clock, policy, min_remaining }
    }

    /// Engine using the backoff and budget settings from `config`.
    pub fn from_config(
        executor: Arc<dyn HttpExecutor>, tracker: Arc<RateLimitTracker>, clock: Arc<dyn Clock>, config: &AppConfig,
    ) -> Self {
        Self::new(executor, tracker, clock, BackoffPolicy::from_config(config), config.rate_limit.min_remaining)
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    /// Sleep on the engine clock unless `ctx` fires first.
    async fn sleep(&self, ctx: &CancellationToken, delay: Duration) -> Result<(), Error> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled),
            _ = self.clock.sleep(delay) => Ok(()),
        }
    }

    /// Hold off while the tracked budget is at or below the floor and the window has not reset.
    async fn wait_for_budget(&self, ctx: &CancellationToken) -> Result<(), Error> {
        let Some(budget) = self.tracker.snapshot() else {
            return Ok(());
        };
        let Some(wait) = budget.wait_before_request(self.clock.now(), self.min_remaining) else {
            return Ok(());
        };

        let wait = wait.min(self.policy.cap(Outcome::ThrottleSevere));
        tracing::warn!(
            "Error budget low ({} remaining, floor {}), waiting {}ms for reset",
            budget.remaining,
            self.min_remaining,
            wait.as_millis()
        );
        self.sleep(ctx, wait).await
    }

    /// Upstream-provided lower bound on the next delay.
    fn hint(&self, outcome: Outcome, response: &UpstreamResponse) -> Option<Duration> {
        match outcome {
            Outcome::ThrottleSevere => self.tracker.snapshot().and_then(|b| b.until_reset(self.clock.now())),
            Outcome::ThrottleStandard => self.retry_after(response),
            _ => None,
        }
    }

    /// Raise `hint` to the time until reset while the budget is at or below the floor.
    fn with_budget_wait(&self, hint: Option<Duration>) -> Option<Duration> {
        let budget_wait = self
            .tracker
            .snapshot()
            .and_then(|b| b.wait_before_request(self.clock.now(), self.min_remaining));
        match (hint, budget_wait) {
            (Some(hint), Some(wait)) => Some(hint.max(wait)),
            (hint, wait) => hint.or(wait),
        }
    }

    /// `Retry-After` as delta-seconds or an HTTP date.
    fn retry_after(&self, response: &UpstreamResponse) -> Option<Duration> {
        let value = response.header_str(RETRY_AFTER.as_str())?.trim();
        if let Ok(secs) = value.parse::<u64>() {
            return Some(Duration::from_secs(secs));
        }
        let at = parse_http_date(value)?;
        (at - self.clock.now()).to_std().ok()
    }

    /// Run one attempt. `Ok` ends the call, `Err` carries a retryable failure.
    async fn attempt(
        &self, ctx: &CancellationToken, request: &UpstreamRequest, attempt: u32,
    ) -> Result<Result<UpstreamResponse, Error>, RetryAttempt> {
        let result = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Ok(Err(Error::Cancelled)),
            result = self.executor.execute(request) => result,
        };

        match result {
            Ok(response) => {
                self.tracker.observe(&response.headers);
                let outcome = classify_status(response.status);
                match outcome {
                    Outcome::Success => Ok(Ok(response)),
                    Outcome::NonRetryable => Ok(Err(classify::response_error(outcome, &response))),
                    _ => Err(RetryAttempt {
                        attempt,
                        outcome,
                        error: classify::response_error(outcome, &response),
                        hint: self.hint(outcome, &response),
                    }),
                }
            }
            Err(err) => {
                let outcome = classify_transport(&err);
                let error = classify::transport_error(outcome, &err);
                if !outcome.is_retryable() {
                    return Ok(Err(error));
                }
                Err(RetryAttempt { attempt, outcome, error, hint: None })
            }
        }
    }
}

#[async_trait]
impl RetryingExecutor for RetryEngine {
    async fn execute_with_retry(
        &self, ctx: &CancellationToken, request: &UpstreamRequest, max_retries: u32,
    ) -> Result<UpstreamResponse, Error> {
        let mut attempt: u32 = 0;

        loop {
            if ctx.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if attempt == 0 {
                self.wait_for_budget(ctx).await?;
            }

            let failed = match self.attempt(ctx, request, attempt).await {
                Ok(done) => return done,
                Err(failed) => failed,
            };

            if failed.attempt >= max_retries {
                tracing::warn!(
                    "{} {} failed after {} attempts: {}",
                    request.method,
                    request.url,
                    failed.attempt + 1,
                    failed.error
                );
                return Err(Error::MaxRetriesExceeded { attempts: failed.attempt + 1, last: Box::new(failed.error) });
            }

            let hint = self.with_budget_wait(failed.hint);
            let delay = self.policy.delay(failed.outcome, failed.attempt, hint);
            let delay_ms = delay.as_millis() as u64;
            if failed.outcome == Outcome::ServerError {
                tracing::debug!(attempt = failed.attempt, delay_ms, error = %failed.error, "retrying {}", request.url);
            } else {
                tracing::warn!(attempt = failed.attempt, delay_ms, error = %failed.error, "throttled on {}", request.url);
            }
            self.sleep(ctx, delay).await?;
            attempt += 1;
        }
    }
}
