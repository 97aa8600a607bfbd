use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::dispatch::SessionStatus;
use crate::health::open_circuits;
use crate::http::server::AppState;
use crate::idempotency::IdempotencyStats;
use crate::resilience::{BreakerSnapshot, CircuitState};
use crate::usage::UsageRecord;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub open_circuits: Vec<String>,
    pub sessions: Vec<SessionStatus>,
    pub idempotency_entries: usize,
}

#[derive(Serialize)]
pub struct ResetResult {
    pub name: String,
    pub state: CircuitState,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub tenant: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        open_circuits: open_circuits(&state.breakers),
        sessions: state.dispatcher.session_status(),
        idempotency_entries: state.idempotency.len(),
    })
}

pub async fn get_circuit_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.breakers.snapshots())
}

pub async fn reset_circuit_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ResetResult>, (StatusCode, Json<serde_json::Value>)> {
    match state.breakers.find(&name) {
        Some(breaker) => {
            breaker.reset();
            tracing::info!(breaker = %name, "Circuit breaker reset by operator");
            Ok(Json(ResetResult {
                state: breaker.state(),
                name,
            }))
        }
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("unknown circuit breaker '{}'", name) })),
        )),
    }
}

pub async fn get_idempotency(State(state): State<AppState>) -> Json<IdempotencyStats> {
    Json(state.idempotency.stats())
}

pub async fn get_usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Json<Vec<UsageRecord>> {
    Json(state.usage.query(query.tenant.as_deref(), query.year, query.month))
}
