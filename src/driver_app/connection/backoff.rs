//! # Reconnection Backoff
//!
//! Exponential backoff with additive jitter for re-opening the tracking
//! channel after transient failures.
//!
//! Attempt `n` (0-indexed) waits `min(base * 2^n, cap)` plus a uniformly
//! random jitter in `[0, jitter)`. After `max_attempts` scheduled retries the
//! policy refuses further attempts.
//!
//! ```rust
//! use courier_track::driver_app::connection::backoff::ReconnectPolicy;
//! use std::time::Duration;
//!
//! let policy = ReconnectPolicy::default();
//! assert_eq!(policy.base_delay(0), Duration::from_millis(1000));
//! assert_eq!(policy.base_delay(6), Duration::from_millis(30000));
//! ```

use crate::shared::config::TrackingSettings;
use std::time::Duration;

/// Reconnection policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound of the exponential part
    pub cap: Duration,
    /// Exclusive upper bound of the random jitter
    pub jitter: Duration,
    /// Retries allowed before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_settings(&TrackingSettings::default())
    }
}

impl ReconnectPolicy {
    pub fn from_settings(settings: &TrackingSettings) -> Self {
        Self {
            base: Duration::from_millis(settings.backoff_base_ms),
            cap: Duration::from_millis(settings.backoff_cap_ms),
            jitter: Duration::from_millis(settings.backoff_jitter_ms),
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Exponential part of the delay for `attempt`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let base_ms = self.base.as_millis() as u64;
        let cap_ms = self.cap.as_millis() as u64;
        Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
    }

    /// Delay for `attempt` with an explicit jitter value (clamped below `jitter`)
    pub fn delay_with_jitter(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let bound = self.jitter.as_millis() as u64;
        let jitter_ms = if bound == 0 { 0 } else { jitter_ms.min(bound - 1) };
        self.base_delay(attempt) + Duration::from_millis(jitter_ms)
    }

    /// Delay for `attempt` with random jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let bound = self.jitter.as_millis() as u64;
        let jitter_ms = if bound == 0 { 0 } else { rand::random_range(0..bound) };
        self.delay_with_jitter(attempt, jitter_ms)
    }

    /// Whether another retry may be scheduled after `attempts` retries
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
