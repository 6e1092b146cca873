//! Reconnection Policy
//!
//! Exponential backoff with jitter for the control-channel reconnect
//! loop. Successive delays are non-decreasing up to a configured cap;
//! the client resets the policy to its floor after a sustained period
//! of active connection.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay floor before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Jitter factor as a fraction (0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of reconnection attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0, // Unlimited
        }
    }
}

impl ReconnectConfig {
    /// Create configuration from `ChannelSettings`.
    #[must_use]
    pub const fn from_channel_settings(
        settings: &crate::infrastructure::config::ChannelSettings,
    ) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: 0.1, // Default jitter
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Reconnection policy implementing exponential backoff with jitter.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy at its floor.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Get the next delay, applying exponential backoff with jitter.
    ///
    /// Returns `None` once max attempts are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        self.attempt_count += 1;
        let delay = self.apply_jitter(self.current_delay);
        self.grow();
        Some(delay)
    }

    /// Reset the policy to its floor after a sustained active period.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// Advance the base delay for the following attempt, capped at
    /// `max_delay`.
    fn grow(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(adjusted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(initial_ms: u64, max_ms: u64, max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        })
    }

    #[test]
    fn delays_are_non_decreasing_and_exponential() {
        let mut policy = no_jitter(100, 10_000, 0);
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(100));
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(200));
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(400));
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(800));
    }

    #[test]
    fn delays_cap_at_max() {
        let mut policy = no_jitter(1000, 2000, 0);
        let _ = policy.next_delay();
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(2000));
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(2000));
    }

    #[test]
    fn max_attempts_exhaust() {
        let mut policy = no_jitter(100, 1000, 3);
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert!(!policy.should_retry());
    }

    #[test]
    fn reset_returns_to_floor() {
        let mut policy = no_jitter(100, 10_000, 0);
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_secs(10),
                multiplier: 2.0,
                jitter_factor: 0.1,
                max_attempts: 0,
            });
            let millis = policy.next_delay().unwrap().as_millis();
            assert!((900..=1100).contains(&millis), "delay {millis}ms out of bounds");
        }
    }

    #[test]
    fn unlimited_attempts_never_exhaust() {
        let mut policy = no_jitter(1, 10, 0);
        for _ in 0..1000 {
            assert!(policy.should_retry());
            assert!(policy.next_delay().is_some());
        }
    }
}
