//! Exponential backoff with bounded jitter

use crate::config::ServiceSettings;
use rand::Rng;
use serde::Serialize;
use std::time::Duration;

/// Backoff parameters for one service
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BackoffConfig {
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound for any delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Symmetric jitter ratio (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Undithered delay for a 0-based attempt: `min(base * multiplier^n, max)`
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        if secs.is_finite() && secs < max {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        }
    }

    /// Delay for `attempt`, jittered and clamped to `[previous, max]` so the
    /// sequence never shrinks
    pub fn delay_for_attempt(&self, attempt: u32, previous: Duration) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let jittered = if self.jitter > 0.0 {
            let range = nominal.as_secs_f64() * self.jitter;
            let offset = rand::thread_rng().gen_range(-range..=range);
            Duration::try_from_secs_f64((nominal.as_secs_f64() + offset).max(0.0))
                .unwrap_or(self.max_delay)
        } else {
            nominal
        };
        jittered.clamp(previous.min(self.max_delay), self.max_delay)
    }
}

impl From<&ServiceSettings> for BackoffConfig {
    fn from(settings: &ServiceSettings) -> Self {
        Self::new(settings.base_delay, settings.max_delay).with_jitter(settings.jitter)
    }
}
