//! Operator API on its own listener.
//!
//! ```text
//! GET  /admin/status
//! GET  /admin/circuit-breakers
//! POST /admin/circuit-breakers/{name}/reset
//! GET  /admin/idempotency
//! GET  /admin/usage?tenant&year&month
//! ```

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/circuit-breakers", get(get_circuit_breakers))
        .route("/admin/circuit-breakers/{name}/reset", post(reset_circuit_breaker))
        .route("/admin/idempotency", get(get_idempotency))
        .route("/admin/usage", get(get_usage))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
