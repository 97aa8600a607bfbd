//! Compliance API gateway library.
//!
//! Fronts the Indian compliance providers (VAHAN, NIC eWay Bill, Whitebooks
//! eWay Bill and eInvoice) with retries, circuit breakers, shared credential
//! sessions and idempotent request handling.

pub mod config;
pub mod error;
pub mod http;

// Provider access
pub mod credentials;
pub mod dispatch;
pub mod providers;
pub mod usage;

// Cross-cutting concerns
pub mod admin;
pub mod health;
pub mod idempotency;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::Gateway;
pub use lifecycle::Shutdown;
