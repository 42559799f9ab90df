//! Retry with exponential backoff and full jitter, gated by the shared
//! circuit breaker.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::config::FinderConfig;
use crate::error::{FinderError, FinderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
    pub min: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            min: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sleep before retry number `retry` (1-based).
    ///
    /// A server-provided `Retry-After` is honoured (capped, ±10% jitter);
    /// otherwise a uniform draw from `[0, min(cap, base * 2^(retry-1))]`.
    pub fn backoff(&self, retry: u32, error: &FinderError) -> Duration {
        let mut rng = rand::thread_rng();
        if let FinderError::Unavailable {
            retry_after: Some(retry_after),
            ..
        } = error
        {
            let base_ms = (*retry_after).min(self.cap).as_millis() as u64;
            let jitter_factor: f64 = rng.gen_range(0.9_f64..=1.1_f64);
            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
            return Duration::from_millis(jittered_ms).max(self.min);
        }

        let exponent = retry.saturating_sub(1).min(16);
        let ceiling = self.base.saturating_mul(1 << exponent).min(self.cap);
        let jittered_ms = rng.gen_range(0..=ceiling.as_millis() as u64);
        Duration::from_millis(jittered_ms).max(self.min)
    }
}

/// Runs single-shot upstream calls until they succeed, fail permanently or
/// exhaust the retry budget.
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    fetch_timeout: Duration,
}

impl Retrier {
    pub fn new(policy: RetryPolicy, breaker: CircuitBreaker, fetch_timeout: Duration) -> Self {
        Self {
            policy,
            breaker,
            fetch_timeout,
        }
    }

    pub fn from_config(config: &FinderConfig) -> Self {
        Self::new(
            RetryPolicy::default().with_max_retries(config.max_retries),
            CircuitBreaker::new(config.breaker_threshold, config.breaker_cooldown()),
            config.request_timeout(),
        )
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Call `op` until it yields a non-transient outcome.
    ///
    /// Each attempt passes the breaker first and is cut off after the
    /// per-fetch timeout, which counts as a transient failure.
    pub async fn run<T, F, Fut>(&self, resource: &str, mut op: F) -> FinderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FinderResult<T>>,
    {
        let mut retries = 0;

        loop {
            let permit = self.breaker.acquire().await;
            debug!(resource, attempt = retries + 1, probe = permit.is_probe(), "request");

            let result = match tokio::time::timeout(self.fetch_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(FinderError::Unavailable {
                    message: format!(
                        "{resource} timed out after {}ms",
                        self.fetch_timeout.as_millis()
                    ),
                    retry_after: None,
                }),
            };

            match result {
                Ok(value) => {
                    permit.record_success();
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    permit.record_transient_failure();
                    if retries >= self.policy.max_retries {
                        return Err(FinderError::RetriesExhausted {
                            resource: resource.to_string(),
                            attempts: retries + 1,
                            last_error: e.to_string(),
                        });
                    }
                    retries += 1;

                    let backoff = self.policy.backoff(retries, &e);
                    warn!(
                        resource,
                        error = %e,
                        retry = retries,
                        max_retries = self.policy.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying request"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    // The upstream answered; only transient failures trip the breaker.
                    permit.record_success();
                    return Err(e);
                }
            }
        }
    }
}
