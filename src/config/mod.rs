//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to the composition root (`Gateway::from_config`)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::GatewayConfig;
pub use schema::{
    AdminConfig, CircuitBreakerConfig, DispatchConfig, IdempotencyConfig, ListenerConfig,
    NicEwayConfig, ObservabilityConfig, ProvidersConfig, RateLimitConfig, RetryConfig,
    TimeoutConfig, VahanConfig, WhitebooksConfig,
};
