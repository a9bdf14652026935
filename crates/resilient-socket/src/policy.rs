//! Reconnection backoff.
//!
//! The first delay after a healthy connection is jittered uniformly in
//! `[min, 2 * min)`. Each further consecutive failure multiplies the previous
//! delay by the grow factor, capped at `max`.

use std::time::Duration;

/// Default lower bound for the first reconnection delay.
pub const DEFAULT_MIN_RECONNECTION_DELAY: Duration = Duration::from_millis(1500);

/// Default upper bound for any reconnection delay.
pub const DEFAULT_MAX_RECONNECTION_DELAY: Duration = Duration::from_millis(10_000);

/// Default multiplicative growth between consecutive delays.
pub const DEFAULT_RECONNECTION_DELAY_GROW_FACTOR: f64 = 1.3;

/// Reconnection policy defining how to back off between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    min_delay: Duration,
    max_delay: Duration,
    grow_factor: f64,
}

impl ReconnectPolicy {
    /// Create an exponential policy.
    ///
    /// # Arguments
    /// * `min_delay` - Lower bound of the first (jittered) delay
    /// * `max_delay` - Maximum delay cap
    /// * `grow_factor` - Multiplier applied on each consecutive failure
    pub fn new(min_delay: Duration, max_delay: Duration, grow_factor: f64) -> Self {
        Self {
            min_delay,
            max_delay,
            grow_factor,
        }
    }

    /// Lower bound of the first delay.
    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Upper bound of every delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Multiplier applied between consecutive delays.
    pub fn grow_factor(&self) -> f64 {
        self.grow_factor
    }

    /// First delay for a given random sample in `[0, 1)`.
    ///
    /// The result lies in `[min_delay, 2 * min_delay)`, capped at `max_delay`.
    /// Since `max_delay >= min_delay`, the cap never pushes it below the minimum.
    pub fn initial_delay(&self, sample: f64) -> Duration {
        let min_nanos = u64::try_from(self.min_delay.as_nanos()).unwrap_or(u64::MAX);
        let jitter = (min_nanos as f64 * sample.clamp(0.0, 1.0)).floor() as u64;
        let delay = self.min_delay + Duration::from_nanos(jitter.min(min_nanos.saturating_sub(1)));
        delay.min(self.max_delay.max(self.min_delay))
    }

    /// Delay following `previous`.
    pub fn grow(&self, previous: Duration) -> Duration {
        scale(previous, self.grow_factor).min(self.max_delay)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !self.grow_factor.is_finite() || self.grow_factor < 1.0 {
            return Err(format!(
                "reconnection delay grow factor must be a finite value >= 1.0, got {}",
                self.grow_factor
            ));
        }
        if self.max_delay < self.min_delay {
            return Err(format!(
                "max reconnection delay ({:?}) is below min reconnection delay ({:?})",
                self.max_delay, self.min_delay
            ));
        }
        Ok(())
    }
}

// Nanosecond arithmetic keeps whole-millisecond inputs exact.
fn scale(delay: Duration, factor: f64) -> Duration {
    let nanos = (delay.as_nanos() as f64 * factor).round();
    if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos as u64)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MIN_RECONNECTION_DELAY,
            DEFAULT_MAX_RECONNECTION_DELAY,
            DEFAULT_RECONNECTION_DELAY_GROW_FACTOR,
        )
    }
}

/// Running backoff state for one connection.
///
/// `current` is `None` until the first failure after construction or after a
/// successful open.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    current: Option<Duration>,
}

impl Backoff {
    /// Creates an uninitialized backoff for `policy`.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            current: None,
        }
    }

    /// Advances to the next delay and returns it.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(rand::random::<f64>())
    }

    /// Like [`next_delay`](Self::next_delay), with an explicit jitter sample in `[0, 1)`.
    ///
    /// The sample is only consulted when the backoff is uninitialized.
    pub fn next_delay_with(&mut self, sample: f64) -> Duration {
        let delay = match self.current {
            None => self.policy.initial_delay(sample),
            Some(previous) => self.policy.grow(previous),
        };
        self.current = Some(delay);
        delay
    }

    /// Returns the most recently computed delay.
    pub fn current(&self) -> Option<Duration> {
        self.current
    }

    /// Forgets the delay chain; the next failure starts from a fresh jittered delay.
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Returns the policy driving this backoff.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }
}
