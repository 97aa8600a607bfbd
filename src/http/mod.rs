//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID set and propagated)
//!     → security (identity, rate limits) → idempotency
//!     → handlers.rs (required fields → dispatcher)
//!     → response.rs (success / error JSON)
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::{ErrorBody, SuccessBody};
pub use server::{AppState, Gateway};
