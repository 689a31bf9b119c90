use std::time::Duration;

use rand::Rng;

use crate::domain::errors::{DomainError, Result};

/// Backoff configuration for reconnection attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl BackoffPolicy {
    /// `jitter` is the largest fraction of the base delay added on top of it.
    /// It may not exceed `multiplier - 1.0`, so a jittered delay never
    /// overtakes the next un-jittered one.
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: f64,
    ) -> Result<Self> {
        if multiplier <= 1.0 {
            return Err(DomainError::InvalidBackoffMultiplier);
        }

        if initial_delay.is_zero() || max_delay < initial_delay {
            return Err(DomainError::InvalidBackoffDelays);
        }

        if !(0.0..=multiplier - 1.0).contains(&jitter) {
            return Err(DomainError::InvalidBackoffJitter(jitter));
        }

        Ok(Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter,
        })
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Un-jittered delay before retry number `attempt` (1-based)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Add random upward jitter to a base delay, clamped to the cap
    pub fn apply_jitter<R: Rng + ?Sized>(&self, base: Duration, rng: &mut R) -> Duration {
        if self.jitter == 0.0 {
            return base.min(self.max_delay);
        }

        let factor = 1.0 + rng.gen_range(0.0..=self.jitter);
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.initial_delay(), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(30));
        assert_eq!(policy.multiplier(), 2.0);
        assert_eq!(policy.jitter(), 0.1);
    }

    #[test]
    fn test_base_delay_sequence() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base_delay(1), Duration::from_secs(1));
        assert_eq!(policy.base_delay(2), Duration::from_secs(2));
        assert_eq!(policy.base_delay(3), Duration::from_secs(4));
        assert_eq!(policy.base_delay(6), Duration::from_secs(30));
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);

        for attempt in 1..=20 {
            let base = policy.base_delay(attempt);
            let delay = policy.apply_jitter(base, &mut rng);
            assert!(delay >= base.min(policy.max_delay()));
            assert!(delay <= policy.max_delay());
            assert!(delay.as_secs_f64() <= base.as_secs_f64() * 1.1 + 1e-9);
        }
    }

    #[test]
    fn test_huge_cap_does_not_overflow() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::MAX, 2.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let base = policy.base_delay(u32::MAX);
        assert!(base > Duration::from_secs(u64::MAX / 2));
        assert!(policy.apply_jitter(base, &mut rng) >= base);
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy =
            BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 2.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            policy.apply_jitter(Duration::from_secs(4), &mut rng),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_rejects_invalid_multiplier() {
        let result = BackoffPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
            1.0, // Invalid: must be > 1.0
            0.0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_inverted_delays() {
        let result =
            BackoffPolicy::new(Duration::from_secs(10), Duration::from_secs(5), 2.0, 0.1);
        assert!(matches!(result, Err(DomainError::InvalidBackoffDelays)));

        let result = BackoffPolicy::new(Duration::ZERO, Duration::from_secs(5), 2.0, 0.1);
        assert!(matches!(result, Err(DomainError::InvalidBackoffDelays)));
    }

    #[test]
    fn test_rejects_jitter_above_growth() {
        let result = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 1.5, 0.6);
        assert!(matches!(result, Err(DomainError::InvalidBackoffJitter(_))));

        let result = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 1.5, 0.5);
        assert!(result.is_ok());
    }
}
