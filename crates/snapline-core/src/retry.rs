//! Bounded retry with exponential backoff, gated by the circuit breaker.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::endpoint::EndpointKey;
use crate::error::FetchError;

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Uses a fixed delay between retries.
    Fixed {
        /// Delay between retries.
        delay: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `min(max, base * (factor ^ retry))`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(500),
            factor: 2.0,
            max: Duration::from_secs(8),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Calculate the delay before the given retry (0-based).
    pub fn delay(self, retry: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(retry.min(i32::MAX as u32) as i32);
                let seconds = base.as_secs_f64() * scale;
                let capped_seconds = seconds.min(max.as_secs_f64());

                let mut delay = Duration::from_secs_f64(capped_seconds.max(0.0));

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms =
                        delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Attempt budget and backoff for one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    pub fn exponential(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base: initial_delay,
                factor: multiplier,
                max: max_delay,
                jitter: false,
            },
        }
    }

    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed { delay },
        }
    }

    /// Single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_jitter(mut self, enabled: bool) -> Self {
        if let Backoff::Exponential { ref mut jitter, .. } = self.backoff {
            *jitter = enabled;
        }
        self
    }

    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff.delay(retry)
    }
}

#[derive(Debug, Default)]
struct AttemptCounters {
    attempts: AtomicU64,
    failures: AtomicU64,
    short_circuited: AtomicU64,
}

/// Per-endpoint attempt counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttemptStats {
    pub attempts: u64,
    pub failures: u64,
    pub short_circuited: u64,
}

/// Runs upstream calls under a retry policy and reports every attempt to
/// the breaker registry.
#[derive(Debug)]
pub struct RetryExecutor {
    breakers: Arc<CircuitBreakerRegistry>,
    default_policy: RetryPolicy,
    overrides: HashMap<EndpointKey, RetryPolicy>,
    counters: DashMap<EndpointKey, Arc<AttemptCounters>>,
}

impl RetryExecutor {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>, default_policy: RetryPolicy) -> Self {
        Self {
            breakers,
            default_policy,
            overrides: HashMap::new(),
            counters: DashMap::new(),
        }
    }

    pub fn with_override(mut self, endpoint: EndpointKey, policy: RetryPolicy) -> Self {
        self.overrides.insert(endpoint, policy);
        self
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn policy_for(&self, endpoint: &EndpointKey) -> &RetryPolicy {
        self.overrides.get(endpoint).unwrap_or(&self.default_policy)
    }

    pub fn stats(&self, endpoint: &EndpointKey) -> AttemptStats {
        self.counters
            .get(endpoint)
            .map(|counters| AttemptStats {
                attempts: counters.attempts.load(Ordering::Relaxed),
                failures: counters.failures.load(Ordering::Relaxed),
                short_circuited: counters.short_circuited.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    fn counters(&self, endpoint: &EndpointKey) -> Arc<AttemptCounters> {
        if let Some(existing) = self.counters.get(endpoint) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.counters.entry(endpoint.clone()).or_default().value())
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// Every attempt asks the breaker first. A denial returns a
    /// `CircuitOpen` error immediately: no attempt is consumed and nothing
    /// sleeps. If the breaker opens while retries remain, the last upstream
    /// error is returned instead of sleeping into a denial.
    pub async fn execute<T, F, Fut>(&self, endpoint: &EndpointKey, mut call: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let policy = self.policy_for(endpoint).clone();
        let max_attempts = policy.max_attempts.max(1);
        let counters = self.counters(endpoint);
        let mut attempt = 0_u32;

        loop {
            if !self.breakers.allow(endpoint) {
                counters.short_circuited.fetch_add(1, Ordering::Relaxed);
                debug!(endpoint = %endpoint, attempt, "circuit open; skipping upstream call");
                return Err(FetchError::circuit_open(endpoint));
            }

            attempt += 1;
            counters.attempts.fetch_add(1, Ordering::Relaxed);
            let started = Instant::now();

            let error = match call().await {
                Ok(value) => {
                    self.breakers.record_success(endpoint);
                    debug!(
                        endpoint = %endpoint,
                        attempt,
                        elapsed_ms = elapsed_ms(started),
                        "upstream attempt succeeded"
                    );
                    return Ok(value);
                }
                Err(error) => error,
            };

            counters.failures.fetch_add(1, Ordering::Relaxed);
            self.breakers.record_failure(endpoint);

            if !error.retryable() {
                warn!(
                    endpoint = %endpoint,
                    attempt,
                    code = error.code(),
                    error = %error,
                    "upstream attempt failed; not retryable"
                );
                return Err(error);
            }

            if attempt >= max_attempts {
                warn!(
                    endpoint = %endpoint,
                    attempt,
                    max_attempts,
                    code = error.code(),
                    error = %error,
                    "upstream retry budget exhausted"
                );
                return Err(error);
            }

            if !self.breakers.would_allow(endpoint) {
                warn!(
                    endpoint = %endpoint,
                    attempt,
                    error = %error,
                    "circuit opened during retries; giving up"
                );
                return Err(error);
            }

            let delay = policy.delay_for_retry(attempt - 1);
            warn!(
                endpoint = %endpoint,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis().min(u128::from(u64::MAX)) as u64,
                code = error.code(),
                error = %error,
                "upstream attempt failed; backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
