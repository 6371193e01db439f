//! Circuit breaker pattern for guarding calls into external detector
//! dependencies (an embedding endpoint, a remote vector index, the shared
//! cache store).
//!
//! Only the dependency being called trips its own breaker; an open breaker
//! never blocks calls to a different named dependency. Only errors that
//! indicate the dependency itself is unhealthy should count as failures;
//! see [`CircuitBreaker::call_if`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// States of a single circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests allowed through.
    Closed,
    /// Failing fast, requests immediately rejected.
    Open,
    /// Probing whether the dependency has recovered.
    HalfOpen,
}

/// Tuning knobs for a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }
}

/// Circuit breaker for a single named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    last_state_change: Mutex<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(CircuitState::Closed),
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            last_state_change: Mutex::new(Instant::now()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a request may proceed right now. Transitions Open -> HalfOpen
    /// when the reset timeout has elapsed.
    pub fn allow_request(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let last_change = *self.last_state_change.lock().unwrap();
                if last_change.elapsed() >= self.config.reset_timeout {
                    *state = CircuitState::HalfOpen;
                    *self.last_state_change.lock().unwrap() = Instant::now();
                    self.success_count.store(0, Ordering::SeqCst);
                    tracing::warn!(breaker = %self.name, "circuit half-open, probing");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        match *state {
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.config.success_threshold as u64 {
                    *state = CircuitState::Closed;
                    *self.last_state_change.lock().unwrap() = Instant::now();
                    self.failure_count.store(0, Ordering::SeqCst);
                    self.success_count.store(0, Ordering::SeqCst);
                    tracing::warn!(breaker = %self.name, "circuit closed after recovery");
                }
            }
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *self.last_state_change.lock().unwrap() = Instant::now();
                self.failure_count.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(breaker = %self.name, "probe failed, circuit re-opened");
            }
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold as u64 {
                    *state = CircuitState::Open;
                    *self.last_state_change.lock().unwrap() = Instant::now();
                    tracing::warn!(breaker = %self.name, failures, "circuit opened");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn current_state(&self) -> CircuitState {
        *self.state.lock().unwrap()
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.last_state_change.lock().unwrap().elapsed()
    }

    /// Runs `f` if the circuit allows it, recording the outcome. Returns
    /// [`CircuitBreakerError::Open`] without invoking `f` when the circuit
    /// is open. Every `Err` from `f` is treated as trip-worthy; use
    /// [`call_if`](Self::call_if) when only some errors indicate the
    /// dependency itself is unhealthy.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.call_if(f, |_| true).await
    }

    /// Like [`call`](Self::call), but only records a failure when
    /// `expected_error` returns true for the error `f` produced. Errors that
    /// don't match (e.g. a local parsing bug on an otherwise healthy
    /// dependency) still propagate to the caller, they just don't count
    /// against the breaker.
    pub async fn call_if<F, Fut, T, E>(
        &self,
        f: F,
        expected_error: impl FnOnce(&E) -> bool,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.allow_request() {
            return Err(CircuitBreakerError::Open(self.name.clone()));
        }
        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if expected_error(&err) {
                    self.record_failure();
                }
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }
}

/// Error surfaced by [`CircuitBreaker::call`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit '{0}' is open")]
    Open(String),
    #[error(transparent)]
    Inner(E),
}

/// Registry of circuit breakers, one per named external dependency.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    pub fn get_or_create(&self, dependency: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(dependency.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(dependency, self.default_config)))
            .clone()
    }

    pub fn get_state(&self, dependency: &str) -> Option<CircuitState> {
        self.breakers.get(dependency).map(|b| b.current_state())
    }

    pub fn is_healthy(&self, dependency: &str) -> bool {
        self.get_state(dependency)
            .map(|s| s != CircuitState::Open)
            .unwrap_or(true)
    }

    pub fn reset_all(&self) {
        self.breakers.clear();
    }

    pub fn get_all_states(&self) -> Vec<(String, CircuitState, u64)> {
        self.breakers
            .iter()
            .map(|entry| {
                let (name, breaker) = entry.pair();
                (name.clone(), breaker.current_state(), breaker.failure_count())
            })
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
