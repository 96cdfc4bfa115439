//! Per-channel connection state and reconnect timing.

use std::time::Duration;

/// Consecutive socket failures tolerated before the client reloads.
pub const DEFAULT_RELOAD_CEILING: u32 = 5;

/// Delay before the next poll after a successful round-trip.
pub const POLL_HEALTHY_DELAY: Duration = Duration::from_millis(100);

/// Delay after the first failure (and between healthy socket reconnects).
pub const SHORT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Delay once failures have accumulated.
pub const SUSTAINED_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Panel text shown on the first failure.
pub const PROBLEM_TEXT: &str =
    "There seems to be a problem with the live update feed. Trying to reconnect...";
/// Panel text shown while retrying.
pub const RECONNECTING_TEXT: &str = "Trying to reconnect to the live update feed...";
/// Panel text shown when data flows again.
pub const RECONNECTED_TEXT: &str = "Reconnected to the live update feed";

/// Reconnect timings for one kind of channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay when no failure is outstanding.
    pub healthy_delay: Duration,
    /// Delay after exactly one failure.
    pub first_retry_delay: Duration,
    /// Delay after two or more failures.
    pub sustained_retry_delay: Duration,
    /// Failures tolerated before reload; `None` retries forever.
    pub reload_ceiling: Option<u32>,
}

impl RetryPolicy {
    /// WebSocket timings: 50 ms while failures ≤ 1, then 1 s, reload past 5.
    pub fn socket() -> Self {
        Self {
            healthy_delay: SHORT_RETRY_DELAY,
            first_retry_delay: SHORT_RETRY_DELAY,
            sustained_retry_delay: SUSTAINED_RETRY_DELAY,
            reload_ceiling: Some(DEFAULT_RELOAD_CEILING),
        }
    }

    /// Long-poll timings: 100 ms healthy, 50 ms after the first failure,
    /// then 1 s. No ceiling.
    pub fn poll() -> Self {
        Self {
            healthy_delay: POLL_HEALTHY_DELAY,
            first_retry_delay: SHORT_RETRY_DELAY,
            sustained_retry_delay: SUSTAINED_RETRY_DELAY,
            reload_ceiling: None,
        }
    }

    /// Replace the reload ceiling.
    #[must_use]
    pub fn with_ceiling(mut self, ceiling: Option<u32>) -> Self {
        self.reload_ceiling = ceiling;
        self
    }

    /// Delay before the next attempt given the current failure count.
    pub fn delay_for(&self, failures: u32) -> Duration {
        match failures {
            0 => self.healthy_delay,
            1 => self.first_retry_delay,
            _ => self.sustained_retry_delay,
        }
    }

    /// Whether `failures` is past the reload ceiling.
    pub fn exceeds_ceiling(&self, failures: u32) -> bool {
        self.reload_ceiling.is_some_and(|ceiling| failures > ceiling)
    }
}

/// Failure counter and current backoff of one channel.
///
/// Owned by the channel task, so it needs no locking. Dropped with the
/// channel on teardown or reload.
#[derive(Clone, Debug)]
pub struct ConnectionState {
    policy: RetryPolicy,
    failures: u32,
}

impl ConnectionState {
    /// Fresh state with no failures.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Count one failure. Returns the new consecutive count.
    pub fn record_failure(&mut self) -> u32 {
        self.failures = self.failures.saturating_add(1);
        self.failures
    }

    /// Reset after data arrived. Returns whether the channel had been failing.
    pub fn record_success(&mut self) -> bool {
        let was_failing = self.failures > 0;
        self.failures = 0;
        was_failing
    }

    /// Consecutive failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Delay before the next attempt.
    pub fn next_delay(&self) -> Duration {
        self.policy.delay_for(self.failures)
    }

    /// Whether the channel should give up and reload.
    pub fn should_reload(&self) -> bool {
        self.policy.exceeds_ceiling(self.failures)
    }

    /// The timings in effect.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
