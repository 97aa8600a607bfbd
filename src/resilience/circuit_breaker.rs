//! Circuit breaker for provider protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: provider assumed down, requests go to the fallback when one exists
//! - Half-Open: testing if provider recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: reset_timeout elapsed and a request arrives
//! Half-Open → Closed: consecutive successes >= success_threshold
//! Half-Open → Open: any failure
//! ```
//!
//! # Design Decisions
//! - Per-dependency circuit breaker (not global), named `{provider}:{operation}`
//! - Fail open: with no fallback an open breaker logs and lets the call through
//! - State mutation serialized per breaker through a short-lived mutex
//! - Uses `tokio::time::Instant` so tests can drive time with a paused clock

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::GatewayResult;
use crate::observability::metrics;

/// Number of state changes kept for diagnostics.
const HISTORY_LEN: usize = 10;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge value exported for the state.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

/// Thresholds for one breaker.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
        }
    }
}

/// One recorded transition.
#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
}

struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
    history: VecDeque<StateChange>,
}

#[derive(Default)]
struct BreakerStats {
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    rejected_calls: AtomicU64,
    fallback_calls: AtomicU64,
}

/// Point-in-time view of a breaker, served by the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub reset_timeout_ms: u64,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
    pub fallback_calls: u64,
    pub recent_changes: Vec<StateChange>,
}

/// Failure tracker for one named dependency.
pub struct CircuitBreaker {
    name: String,
    settings: BreakerSettings,
    state: Mutex<BreakerState>,
    stats: BreakerStats,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                last_failure: None,
                history: VecDeque::with_capacity(HISTORY_LEN),
            }),
            stats: BreakerStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        match to {
            CircuitState::Closed => {
                inner.failures = 0;
                inner.successes = 0;
            }
            CircuitState::HalfOpen => inner.successes = 0,
            CircuitState::Open => {}
        }
        if inner.history.len() == HISTORY_LEN {
            inner.history.pop_front();
        }
        inner.history.push_back(StateChange {
            from,
            to,
            at: Utc::now(),
        });
        metrics::record_circuit_state(&self.name, to.as_gauge());
        tracing::info!(breaker = %self.name, ?from, ?to, "Circuit breaker state change");
    }

    /// Whether a request may go to the protected dependency.
    ///
    /// In Open this performs the Open → Half-Open transition once the reset
    /// timeout has elapsed.
    pub fn can_request(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed() >= self.settings.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                }
                elapsed
            }
        }
    }

    pub fn record_success(&self) {
        self.stats.successful_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.settings.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => inner.failures = 0,
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        self.stats.failed_calls.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            CircuitState::Closed if inner.failures >= self.settings.failure_threshold => {
                self.transition(&mut inner, CircuitState::Open)
            }
            _ => {}
        }
    }

    /// Run `f` through the breaker with no fallback.
    ///
    /// When the breaker refuses, `f` still runs (fail open).
    pub async fn execute<T, F, Fut>(&self, f: F) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.run(f, None::<fn() -> std::future::Ready<GatewayResult<T>>>)
            .await
    }

    /// Run `f` through the breaker, using `fallback` while the breaker is open
    /// and as a second chance when `f` fails and leaves the breaker open.
    pub async fn execute_with_fallback<T, F, Fut, G, GFut>(&self, f: F, fallback: G) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = GatewayResult<T>>,
    {
        self.run(f, Some(fallback)).await
    }

    async fn run<T, F, Fut, G, GFut>(&self, f: F, fallback: Option<G>) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = GatewayResult<T>>,
    {
        self.stats.total_calls.fetch_add(1, Ordering::Relaxed);

        if !self.can_request() {
            self.stats.rejected_calls.fetch_add(1, Ordering::Relaxed);
            match fallback {
                Some(fallback) => {
                    tracing::warn!(breaker = %self.name, "Circuit open, using fallback");
                    self.stats.fallback_calls.fetch_add(1, Ordering::Relaxed);
                    return fallback().await;
                }
                None => {
                    tracing::warn!(breaker = %self.name, "Circuit open without fallback, failing open");
                }
            }
            return match f().await {
                Ok(value) => {
                    self.record_success();
                    Ok(value)
                }
                Err(error) => {
                    self.record_failure();
                    Err(error)
                }
            };
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(error) => {
                self.record_failure();
                match fallback {
                    Some(fallback) if self.state() == CircuitState::Open => {
                        tracing::warn!(
                            breaker = %self.name,
                            error = %error,
                            "Call failed and circuit opened, trying fallback"
                        );
                        self.stats.fallback_calls.fetch_add(1, Ordering::Relaxed);
                        fallback().await
                    }
                    _ => Err(error),
                }
            }
        }
    }

    /// Force the breaker back to Closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.transition(&mut inner, CircuitState::Closed);
        inner.failures = 0;
        inner.successes = 0;
        inner.last_failure = None;
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failures,
            success_count: inner.successes,
            failure_threshold: self.settings.failure_threshold,
            success_threshold: self.settings.success_threshold,
            reset_timeout_ms: self.settings.reset_timeout.as_millis() as u64,
            total_calls: self.stats.total_calls.load(Ordering::Relaxed),
            successful_calls: self.stats.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.stats.failed_calls.load(Ordering::Relaxed),
            rejected_calls: self.stats.rejected_calls.load(Ordering::Relaxed),
            fallback_calls: self.stats.fallback_calls.load(Ordering::Relaxed),
            recent_changes: inner.history.iter().cloned().collect(),
        }
    }
}

/// Name → breaker registry. Breakers are created lazily and live for the
/// lifetime of the registry.
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    defaults: BreakerSettings,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: BreakerSettings) -> Self {
        Self {
            breakers: DashMap::new(),
            defaults,
        }
    }

    /// Get or lazily create the breaker for `name` with default thresholds.
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.defaults.clone())
    }

    /// Get or create the breaker for `name`. `settings` only apply on first creation.
    pub fn get_or_create_with(&self, name: &str, settings: BreakerSettings) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, settings)))
            .clone()
    }

    /// Existing breaker, without creating one.
    pub fn find(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|b| b.clone())
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut all: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}
