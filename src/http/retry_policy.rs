//! Bounded exponential-backoff retry policy for transient request failures.

use std::time::Duration;

use log::info;

use crate::http::RequestFailure;

/// Retry schedule: `max_attempts` total tries, backoff doubling from
/// `initial_backoff` and never exceeding `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let multiplier = 1u32 << exponent;
        self.initial_backoff
            .checked_mul(multiplier)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    pub fn should_retry(&self, failure: &RequestFailure, attempt: u32) -> bool {
        failure.is_retryable() && attempt < self.max_attempts.max(1)
    }

    /// Runs `operation`, sleeping the calling thread between attempts.
    pub fn run<T, F>(&self, label: &str, operation: F) -> Result<T, RequestFailure>
    where
        F: FnMut() -> Result<T, RequestFailure>,
    {
        self.run_with_sleep(label, operation, std::thread::sleep)
    }

    pub fn run_with_sleep<T, F, S>(
        &self,
        label: &str,
        mut operation: F,
        mut sleep: S,
    ) -> Result<T, RequestFailure>
    where
        F: FnMut() -> Result<T, RequestFailure>,
        S: FnMut(Duration),
    {
        let mut attempt = 1u32;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(failure) if self.should_retry(&failure, attempt) => {
                    let backoff = self.backoff_delay(attempt);
                    info!(
                        "{} attempt {} failed ({}), retrying in {:?}",
                        label, attempt, failure, backoff
                    );
                    sleep(backoff);
                    attempt = attempt.saturating_add(1);
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}
