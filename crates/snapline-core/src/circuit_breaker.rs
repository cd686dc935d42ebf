use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::endpoint::EndpointKey;

/// Runtime circuit state for one upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
    /// Probes admitted while half-open before outcomes come back.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 2,
            half_open_max_calls: 2,
        }
    }
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    half_open_calls: u32,
    opened_at: Option<Instant>,
}

impl Default for CircuitInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            half_open_calls: 0,
            opened_at: None,
        }
    }
}

impl CircuitInner {
    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.consecutive_successes = 0;
        self.half_open_calls = 0;
    }

    fn reset_to(&mut self, state: CircuitState) {
        self.state = state;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.half_open_calls = 0;
        self.opened_at = None;
    }

    fn reset_elapsed(&self, timeout: Duration) -> bool {
        self.opened_at
            .map(|opened_at| opened_at.elapsed() >= timeout)
            .unwrap_or(true)
    }
}

/// A state change observed while recording an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub endpoint: EndpointKey,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Milliseconds since the breaker last opened, while open.
    pub open_for_ms: Option<u64>,
}

/// Thread-safe three-state circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CircuitInner::default()),
        }
    }

    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Admit or deny one call. An open breaker whose reset timeout elapsed
    /// moves to half-open here and admits the first probe.
    pub fn allow_request(&self) -> bool {
        self.acquire().0
    }

    fn acquire(&self) -> (bool, Option<Transition>) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => (true, None),
            CircuitState::Open => {
                if inner.reset_elapsed(self.config.reset_timeout) {
                    inner.reset_to(CircuitState::HalfOpen);
                    // While half-open, `opened_at` marks the start of the probe window.
                    inner.opened_at = Some(Instant::now());
                    inner.half_open_calls = 1;
                    (
                        true,
                        Some(Transition {
                            from: CircuitState::Open,
                            to: CircuitState::HalfOpen,
                        }),
                    )
                } else {
                    (false, None)
                }
            }
            CircuitState::HalfOpen => {
                let max_calls = self.config.half_open_max_calls.max(1);
                if inner.half_open_calls >= max_calls && inner.reset_elapsed(self.config.reset_timeout) {
                    // Probes whose outcome never came back (cancelled callers).
                    inner.half_open_calls = 0;
                    inner.opened_at = Some(Instant::now());
                }
                if inner.half_open_calls < max_calls {
                    inner.half_open_calls += 1;
                    (true, None)
                } else {
                    (false, None)
                }
            }
        }
    }

    /// Whether `allow_request` would currently admit a call, without
    /// consuming a half-open probe.
    pub fn would_allow(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => inner.reset_elapsed(self.config.reset_timeout),
            CircuitState::HalfOpen => {
                inner.half_open_calls < self.config.half_open_max_calls.max(1)
                    || inner.reset_elapsed(self.config.reset_timeout)
            }
        }
    }

    pub fn record_success(&self) -> Option<Transition> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes = inner.consecutive_successes.saturating_add(1);
                inner.half_open_calls = inner.half_open_calls.saturating_sub(1);
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.reset_to(CircuitState::Closed);
                    Some(Transition {
                        from: CircuitState::HalfOpen,
                        to: CircuitState::Closed,
                    })
                } else {
                    None
                }
            }
            // Late outcome of a call admitted before the breaker opened.
            CircuitState::Open => None,
        }
    }

    pub fn record_failure(&self) -> Option<Transition> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.open();
                    Some(Transition {
                        from: CircuitState::Closed,
                        to: CircuitState::Open,
                    })
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
                inner.open();
                Some(Transition {
                    from: CircuitState::HalfOpen,
                    to: CircuitState::Open,
                })
            }
            // Late outcome; the open breaker already counted its streak.
            CircuitState::Open => None,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.inner.lock().consecutive_successes
    }

    pub fn snapshot(&self, endpoint: EndpointKey) -> BreakerSnapshot {
        let inner = self.inner.lock();
        BreakerSnapshot {
            endpoint,
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            open_for_ms: match inner.state {
                CircuitState::Open => inner
                    .opened_at
                    .map(|at| at.elapsed().as_millis().min(u128::from(u64::MAX)) as u64),
                _ => None,
            },
        }
    }
}

/// One breaker per endpoint key, created on first use.
///
/// Breakers live in a sharded map and each has its own lock, so traffic on
/// one endpoint never waits on another.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    defaults: CircuitBreakerConfig,
    overrides: HashMap<EndpointKey, CircuitBreakerConfig>,
    breakers: DashMap<EndpointKey, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            breakers: DashMap::new(),
        }
    }

    pub fn with_override(mut self, endpoint: EndpointKey, config: CircuitBreakerConfig) -> Self {
        self.overrides.insert(endpoint, config);
        self
    }

    pub fn config_for(&self, endpoint: &EndpointKey) -> CircuitBreakerConfig {
        self.overrides
            .get(endpoint)
            .copied()
            .unwrap_or(self.defaults)
    }

    pub fn breaker(&self, endpoint: &EndpointKey) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(endpoint) {
            return Arc::clone(existing.value());
        }
        let config = self.config_for(endpoint);
        Arc::clone(
            self.breakers
                .entry(endpoint.clone())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(config)))
                .value(),
        )
    }

    pub fn allow(&self, endpoint: &EndpointKey) -> bool {
        let (allowed, transition) = self.breaker(endpoint).acquire();
        log_transition(endpoint, transition);
        allowed
    }

    pub fn would_allow(&self, endpoint: &EndpointKey) -> bool {
        self.breakers
            .get(endpoint)
            .map(|breaker| breaker.would_allow())
            .unwrap_or(true)
    }

    pub fn record_success(&self, endpoint: &EndpointKey) {
        let transition = self.breaker(endpoint).record_success();
        log_transition(endpoint, transition);
    }

    pub fn record_failure(&self, endpoint: &EndpointKey) {
        let transition = self.breaker(endpoint).record_failure();
        log_transition(endpoint, transition);
    }

    /// Current state; endpoints never called report closed.
    pub fn state(&self, endpoint: &EndpointKey) -> CircuitState {
        self.breakers
            .get(endpoint)
            .map(|breaker| breaker.state())
            .unwrap_or(CircuitState::Closed)
    }

    pub fn consecutive_failures(&self, endpoint: &EndpointKey) -> u32 {
        self.breakers
            .get(endpoint)
            .map(|breaker| breaker.consecutive_failures())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot(entry.key().clone()))
            .collect::<Vec<_>>();
        snapshots.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        snapshots
    }
}

fn log_transition(endpoint: &EndpointKey, transition: Option<Transition>) {
    let Some(Transition { from, to }) = transition else {
        return;
    };
    match to {
        CircuitState::Open => warn!(
            endpoint = %endpoint,
            from = from.as_str(),
            "circuit opened; failing fast"
        ),
        CircuitState::HalfOpen | CircuitState::Closed => info!(
            endpoint = %endpoint,
            from = from.as_str(),
            to = to.as_str(),
            "circuit state changed"
        ),
    }
}
