//! Exponential backoff with full jitter around provider calls.

use std::time::Duration;

use rand::Rng;

use crate::error::{LlmError, LlmResult};

/// Retry parameters for transient provider errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the initial call.
    pub max_retries: u32,
    /// Base delay; attempt `n` waits up to `base * 2^n`.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Timeout applied to each individual attempt.
    pub per_call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            per_call_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy from the execution configuration.
    pub fn from_config(config: &config::ExecutionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: config.backoff_base,
            max: config.backoff_max,
            per_call_timeout: config.per_call_timeout,
        }
    }

    /// Run `call` with per-attempt timeout, retrying transient errors
    /// until the budget runs out. Permanent errors surface immediately.
    pub async fn run<T, F, Fut>(&self, mut call: F) -> LlmResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LlmResult<T>>,
    {
        let mut attempt = 0;

        loop {
            let result = match tokio::time::timeout(self.per_call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.per_call_timeout)),
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_transient() || attempt >= self.max_retries {
                return Err(error);
            }

            let delay = self.delay_for(attempt, &error);
            attempt += 1;

            log::debug!(
                "Transient provider error (attempt {attempt}/{}), retrying in {delay:?}: {error}",
                self.max_retries
            );

            tokio::time::sleep(delay).await;
        }
    }

    /// Full jitter: a uniform draw from zero up to the exponential cap,
    /// floored by any provider-supplied retry-after.
    fn delay_for(&self, attempt: u32, error: &LlmError) -> Duration {
        let cap = self
            .base
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max);

        let jittered = cap.mul_f64(rand::rng().random::<f64>());

        if let LlmError::RateLimitExceeded {
            retry_after: Some(retry_after),
            ..
        } = error
        {
            return jittered.max(*retry_after).min(self.max);
        }

        jittered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn transient_errors_retry_until_success() {
        let policy = RetryPolicy::default();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result = policy
            .run(|| {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(LlmError::ConnectionError("reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_do_not_retry() {
        let policy = RetryPolicy::default();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: LlmResult<()> = policy
            .run(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(LlmError::AuthenticationFailed("bad key".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(LlmError::AuthenticationFailed(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_is_bounded() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        };
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: LlmResult<()> = policy
            .run(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(LlmError::ConnectionError("reset".into()))
                }
            })
            .await;

        assert!(result.is_err());
        // Initial call plus three retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }
}
