// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retry state for the append loop.
//!
//! Represented as explicit state (attempt count, capped exponential
//! delay, full jitter) instead of recursive control flow, so the policy
//! is unit-testable without a clock.

use std::time::Duration;

use rand::Rng;

use crate::constants;

/// Bounds for one retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first try.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// One retry loop's progress through its policy.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Backoff {
            policy,
            failures: 0,
        }
    }

    /// Attempts made so far, counting the failures recorded through
    /// [`next_delay`](Self::next_delay).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.failures
    }

    /// Records a failed attempt. Returns the jittered delay to sleep
    /// before the next one, or `None` once the budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.policy.max_attempts {
            return None;
        }
        let exp = self
            .policy
            .base_delay
            .saturating_mul(1 << (self.failures - 1).min(16))
            .min(self.policy.max_delay);
        // Full jitter: anywhere in [0, exp]
        let jittered = rand::thread_rng().gen_range(0..=exp.as_millis() as u64);
        Some(Duration::from_millis(jittered))
    }
}
