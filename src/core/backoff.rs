use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::duration_ms;
use super::errors::{WhitelistError, WhitelistResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffPolicy {
    Constant,
    Linear,
    Exponential { factor: f32 },
}

/// Delay schedule applied to repositories whose discovery keeps failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    #[serde(rename = "initial_delay_ms", with = "duration_ms")]
    pub initial_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    pub policy: BackoffPolicy,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(6 * 60 * 60),
            policy: BackoffPolicy::Exponential { factor: 2.0 },
        }
    }
}

impl BackoffConfig {
    /// Rejects schedules where a further failure could shorten the wait.
    /// `Constant` only holds at the cap, so it needs `initial_delay == max_delay`.
    pub fn validate(&self) -> WhitelistResult<()> {
        if self.max_delay < self.initial_delay {
            return Err(WhitelistError::Config(
                "backoff.max_delay_ms must not be below backoff.initial_delay_ms".into(),
            ));
        }
        match self.policy {
            BackoffPolicy::Constant if self.initial_delay != self.max_delay => {
                Err(WhitelistError::Config(
                    "constant backoff needs backoff.initial_delay_ms equal to backoff.max_delay_ms"
                        .into(),
                ))
            }
            BackoffPolicy::Linear | BackoffPolicy::Exponential { .. }
                if self.initial_delay.is_zero() =>
            {
                Err(WhitelistError::Config(
                    "backoff.initial_delay_ms must be positive".into(),
                ))
            }
            BackoffPolicy::Exponential { factor } if !factor.is_finite() || factor <= 1.0 => {
                Err(WhitelistError::Config(format!(
                    "backoff factor must be greater than 1, got {}",
                    factor
                )))
            }
            _ => Ok(()),
        }
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return std::cmp::min(self.initial_delay, self.max_delay);
        }

        let steps = failures - 1;
        let delay = match self.policy {
            BackoffPolicy::Constant => self.initial_delay,
            BackoffPolicy::Linear => self.initial_delay.saturating_mul(failures),
            BackoffPolicy::Exponential { factor } => {
                let multiplier = f64::from(factor).powi(steps.min(i32::MAX as u32) as i32);
                let millis = self.initial_delay.as_millis() as f64 * multiplier;
                if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
                    self.max_delay
                } else {
                    Duration::from_millis(millis as u64)
                }
            }
        };

        std::cmp::min(delay, self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(policy: BackoffPolicy) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            policy,
        }
    }

    #[test]
    fn test_exponential_backoff_grows_until_cap() {
        let backoff = config(BackoffPolicy::Exponential { factor: 2.0 });

        assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(400));
        assert_eq!(backoff.delay_for(4), Duration::from_millis(800));
        assert_eq!(backoff.delay_for(5), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(500), Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_is_monotonic() {
        let constant = BackoffConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            policy: BackoffPolicy::Constant,
        };
        for backoff in [
            constant,
            config(BackoffPolicy::Linear),
            config(BackoffPolicy::Exponential { factor: 1.5 }),
        ] {
            assert!(backoff.validate().is_ok(), "{:?}", backoff);
            let mut previous = Duration::ZERO;
            for failures in 1..64 {
                let delay = backoff.delay_for(failures);
                assert!(
                    delay > previous || delay == backoff.max_delay,
                    "{:?} did not grow at {}",
                    backoff.policy,
                    failures
                );
                assert!(delay <= backoff.max_delay);
                previous = delay;
            }
        }
    }

    #[test]
    fn test_rejects_factor_that_does_not_grow() {
        let shrinking = config(BackoffPolicy::Exponential { factor: 0.5 });
        assert!(matches!(shrinking.validate(), Err(WhitelistError::Config(_))));
        assert!(shrinking.delay_for(3) < shrinking.delay_for(1));

        let flat = config(BackoffPolicy::Exponential { factor: 1.0 });
        assert!(matches!(flat.validate(), Err(WhitelistError::Config(_))));

        let nan = config(BackoffPolicy::Exponential { factor: f32::NAN });
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_rejects_constant_below_cap_and_zero_initial_delay() {
        assert!(config(BackoffPolicy::Constant).validate().is_err());

        let zero = BackoffConfig {
            initial_delay: Duration::ZERO,
            ..config(BackoffPolicy::Linear)
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_linear_backoff() {
        let backoff = config(BackoffPolicy::Linear);
        assert_eq!(backoff.delay_for(3), Duration::from_millis(300));
        assert_eq!(backoff.delay_for(20), Duration::from_secs(1));
    }
}
