//! Per-class exponential backoff with jitter.

use std::time::Duration;

use esigate_core::AppConfig;
use esigate_core::config::{BackoffConfig, ClassBackoff};
use rand::Rng;

use super::classify::Outcome;

/// Backoff settings for each retryable outcome plus the jitter ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub classes: BackoffConfig,
    pub jitter_ratio: f64,
}

impl BackoffPolicy {
    pub fn new(classes: BackoffConfig, jitter_ratio: f64) -> Self {
        Self { classes, jitter_ratio: jitter_ratio.clamp(0.0, 1.0) }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.backoff, config.jitter_ratio)
    }

    /// Bounds for a retryable outcome, `None` for the others.
    pub fn class(&self, outcome: Outcome) -> Option<ClassBackoff> {
        match outcome {
            Outcome::ServerError => Some(self.classes.server_error),
            Outcome::ThrottleStandard => Some(self.classes.throttle_standard),
            Outcome::ThrottleSevere => Some(self.classes.throttle_severe),
            Outcome::Success | Outcome::NonRetryable => None,
        }
    }

    /// Longest wait ever taken for `outcome`.
    pub fn cap(&self, outcome: Outcome) -> Duration {
        self.class(outcome).map(|class| class.cap()).unwrap_or_default()
    }

    /// Delay before retrying after failed attempt number `attempt` (zero-based).
    ///
    /// The jittered exponential delay is raised to `hint` when the upstream
    /// told us how long to wait, and the result never exceeds the class cap.
    pub fn delay(&self, outcome: Outcome, attempt: u32, hint: Option<Duration>) -> Duration {
        let Some(class) = self.class(outcome) else {
            return Duration::ZERO;
        };

        let backoff = jitter(exponential(class, attempt), self.jitter_ratio);
        let delay = match hint {
            Some(hint) => backoff.max(hint),
            None => backoff,
        };
        delay.min(class.cap())
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// `min(base * 2^attempt, cap)` without overflow.
pub fn exponential(class: ClassBackoff, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let delay_ms = class.base_ms.saturating_mul(factor);
    Duration::from_millis(delay_ms.min(class.cap_ms))
}

/// Shave up to `ratio` of the delay off at random, so the result stays below the cap.
fn jitter(delay: Duration, ratio: f64) -> Duration {
    let jitter_range = (delay.as_millis() as f64 * ratio) as u64;
    if jitter_range == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_range);
    delay.saturating_sub(Duration::from_millis(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffPolicy {
        BackoffPolicy::new(BackoffConfig::default(), 0.0)
    }

    #[test]
    fn test_exponential_growth() {
        let class = ClassBackoff::new(100, 2_000);
        assert_eq!(exponential(class, 0), Duration::from_millis(100));
        assert_eq!(exponential(class, 1), Duration::from_millis(200));
        assert_eq!(exponential(class, 2), Duration::from_millis(400));
        assert_eq!(exponential(class, 10), Duration::from_millis(2_000));
        assert_eq!(exponential(class, u32::MAX), Duration::from_millis(2_000));
    }

    #[test]
    fn test_delay_per_class() {
        let policy = no_jitter();
        assert_eq!(policy.delay(Outcome::ServerError, 0, None), Duration::from_millis(250));
        assert_eq!(policy.delay(Outcome::ThrottleStandard, 0, None), Duration::from_secs(1));
        assert_eq!(policy.delay(Outcome::ThrottleSevere, 0, None), Duration::from_secs(5));
        assert_eq!(policy.delay(Outcome::NonRetryable, 0, None), Duration::ZERO);
        assert_eq!(policy.delay(Outcome::Success, 3, None), Duration::ZERO);
    }

    #[test]
    fn test_hint_raises_delay_up_to_cap() {
        let policy = no_jitter();
        assert_eq!(policy.delay(Outcome::ThrottleSevere, 0, Some(Duration::from_secs(40))), Duration::from_secs(40));
        assert_eq!(policy.delay(Outcome::ThrottleSevere, 0, Some(Duration::from_secs(1))), Duration::from_secs(5));
        assert_eq!(policy.delay(Outcome::ThrottleStandard, 0, Some(Duration::from_secs(3_600))), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = BackoffPolicy::new(BackoffConfig::default(), 0.5);
        for attempt in 0..12 {
            let exp = exponential(policy.classes.throttle_standard, attempt);
            for _ in 0..50 {
                let delay = policy.delay(Outcome::ThrottleStandard, attempt, None);
                assert!(delay <= exp);
                assert!(delay >= exp / 2);
                assert!(delay <= policy.cap(Outcome::ThrottleStandard));
            }
        }
    }

    #[test]
    fn test_jitter_ratio_is_clamped() {
        let policy = BackoffPolicy::new(BackoffConfig::default(), 7.0);
        assert_eq!(policy.jitter_ratio, 1.0);
    }

    #[test]
    fn test_severe_cap_exceeds_others_by_default() {
        let policy = BackoffPolicy::default();
        assert!(policy.cap(Outcome::ThrottleSevere) >= policy.cap(Outcome::ThrottleStandard));
        assert!(policy.cap(Outcome::ThrottleStandard) >= policy.cap(Outcome::ServerError));
        assert_eq!(policy.cap(Outcome::NonRetryable), Duration::ZERO);
    }
}
