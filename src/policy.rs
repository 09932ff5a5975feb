use std::time::Duration;

use crate::ConfigError;

/// Configures how many times a call is attempted and how long to wait between
/// attempts.
///
/// Built once at startup and read-only afterwards. [`RetryPolicy::new`]
/// rejects inconsistent bounds, so every value in circulation is valid.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay_ms: u64,
    max_delay_ms: u64,
    backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Creates a validated policy.
    pub fn new(
        max_attempts: u32,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        backoff_factor: f64,
    ) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::InvalidPolicy(
                "max attempts must be at least 1".to_owned(),
            ));
        }
        if max_delay_ms < initial_delay_ms {
            return Err(ConfigError::InvalidPolicy(format!(
                "max delay {max_delay_ms}ms is below initial delay {initial_delay_ms}ms"
            )));
        }
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(ConfigError::InvalidPolicy(format!(
                "backoff factor must be a finite number >= 1, got {backoff_factor}"
            )));
        }
        Ok(Self {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
            backoff_factor,
        })
    }

    /// Total attempts allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the first retry in milliseconds.
    pub fn initial_delay_ms(&self) -> u64 {
        self.initial_delay_ms
    }

    /// Ceiling on any computed backoff delay in milliseconds.
    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Multiplier applied per retry.
    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Backoff delay after the 1-based `attempt` failed transiently.
    ///
    /// `min(initial × factor^(attempt − 1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay_ms as f64 * self.backoff_factor.powi(exp);
        let delay_ms = if raw.is_finite() && raw < self.max_delay_ms as f64 {
            raw.round() as u64
        } else {
            self.max_delay_ms
        };
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
