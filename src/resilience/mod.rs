//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Provider call:
//!     → circuit_breaker.rs (per provider + operation, fail-open)
//!     → retries.rs (classify failure, retry with backoff)
//!     → backoff.rs (jittered exponential delay)
//! ```
//!
//! # Design Decisions
//! - Per-dependency breakers so one failing provider cannot cascade into another
//! - Breakers fail open: availability of the business flow outranks enforcement
//! - Retries never wrap or swallow the terminal error
//! - Registries are constructed by the composition root and injected

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use circuit_breaker::{
    BreakerSnapshot, BreakerSettings, CircuitBreaker, CircuitBreakerRegistry, CircuitState,
};
pub use retries::{with_retry, RetryPolicy};
