//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming gateway request:
//!     → access_control.rs (dispatcher identity headers → TenantContext)
//!     → rate_limit.rs (global per-IP, per-group per-dispatcher)
//!     → idempotency, then handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: missing identity is rejected before any provider work
//! - Limits are per process (single node)

pub mod access_control;
pub mod rate_limit;

pub use access_control::{dispatcher_identity_middleware, TenantContext};
pub use rate_limit::{rate_limit_middleware, ApiGroup, RateLimiterState};
