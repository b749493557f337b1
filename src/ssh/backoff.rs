//! Readiness polling delays

use std::fmt;
use std::time::Duration;

/// Delay between readiness polls
pub trait PollBackoff: Send + Sync + fmt::Debug {
    /// Delay before poll number `attempt` + 1 (`attempt` starts at 0)
    fn delay(&self, attempt: usize) -> Duration;
}

/// Same delay every time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    pub interval: Duration,
}

impl FixedBackoff {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
        }
    }
}

impl PollBackoff for FixedBackoff {
    fn delay(&self, _attempt: usize) -> Duration {
        self.interval
    }
}

/// Exponential backoff, capped
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_secs(2),
        }
    }
}

impl PollBackoff for ExponentialBackoff {
    /// Negative results clamp to zero; overflow and NaN give `max`
    fn delay(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() {
            return self.max;
        }
        Duration::from_secs_f64(secs.clamp(0.0, self.max.as_secs_f64()))
    }
}
