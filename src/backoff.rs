//! Exponential backoff policy
//!
//! One policy type serves both the health check cadence and the live-channel
//! reconnect delay:
//!
//! ```text
//! delay(n) = clamp(base * 2^floor(n / step), base, max)
//! ```
//!
//! With `step = failure_threshold` it yields the health interval after `n`
//! consecutive failures; with `step = 1` it yields the delay before reconnect
//! attempt `n` (zero-based).

use std::time::Duration;

/// Largest exponent applied before clamping; 2^20 already exceeds any sane ceiling
const MAX_EXPONENT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
    step: u32,
}

impl BackoffPolicy {
    /// Create a policy; `step` of 0 is treated as 1 and `max` is raised to `base` if lower
    pub fn new(base: Duration, max: Duration, step: u32) -> Self {
        Self {
            base,
            max: max.max(base),
            step: step.max(1),
        }
    }

    /// Policy that doubles on every attempt
    pub fn doubling(base: Duration, max: Duration) -> Self {
        Self::new(base, max, 1)
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Delay after `n` counted events (failures or previous attempts)
    pub fn delay(&self, n: u32) -> Duration {
        let exponent = (n / self.step).min(MAX_EXPONENT);
        let multiplier = 1u32 << exponent;
        self.base
            .checked_mul(multiplier)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// True once further events no longer lengthen the delay
    pub fn is_saturated(&self, n: u32) -> bool {
        self.delay(n) >= self.max
    }
}
