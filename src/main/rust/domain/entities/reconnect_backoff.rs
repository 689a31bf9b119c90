use std::time::Duration;

use rand::Rng;

use crate::domain::value_objects::BackoffPolicy;

/// Running backoff state for one session
///
/// Produces delays within `[initial_delay, max_delay]` that never decrease
/// until [`reset`](Self::reset) is called.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    policy: BackoffPolicy,
    attempt: u32,
    last_delay: Option<Duration>,
}

impl ReconnectBackoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_delay: None,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Failures since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        self.attempt = self.attempt.saturating_add(1);

        let base = self.policy.base_delay(self.attempt);
        let mut delay = self.policy.apply_jitter(base, rng);
        if let Some(last) = self.last_delay {
            delay = delay.max(last);
        }

        self.last_delay = Some(delay);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last_delay = None;
    }
}
