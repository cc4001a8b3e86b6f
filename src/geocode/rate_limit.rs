//! Pacing for calls to a single remote endpoint

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as Gcra};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Enforces a minimum delay between consecutive calls.
///
/// Share one instance (behind an `Arc`) between every caller of an endpoint.
/// The gate keeps a single "next allowed time" in an atomic cell, so two
/// concurrent callers can never both pass for the same slot.
pub struct RateLimiter {
    delay: Duration,
    gate: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    /// Limiter allowing at most `calls` per minute. Non-positive values disable pacing.
    pub fn per_minute(calls: f64) -> Self {
        if !calls.is_finite() || calls <= 0.0 {
            return Self::unlimited();
        }
        Self::with_delay(Duration::from_secs_f64(60.0 / calls))
    }

    pub fn with_delay(delay: Duration) -> Self {
        let gate = Quota::with_period(delay)
            .map(|quota| Gcra::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self { delay, gate }
    }

    pub fn unlimited() -> Self {
        Self {
            delay: Duration::ZERO,
            gate: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait until this caller may proceed, then claim the slot
    pub async fn await_turn(&self) {
        if let Some(gate) = &self.gate {
            gate.until_ready().await;
            debug!("Rate limiter released caller (delay {:?})", self.delay);
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("delay", &self.delay)
            .field("enabled", &self.gate.is_some())
            .finish()
    }
}
