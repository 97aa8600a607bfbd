//! Gateway liveness reporting.
//!
//! # Design Decisions
//! - Liveness only: an open breaker does not make the gateway unhealthy, it is
//!   listed in `open_circuits` so operators can see degraded providers
//! - No provider probes; breakers already carry the passive signal

use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::{CircuitBreakerRegistry, CircuitState};

pub const SERVICE_NAME: &str = "compliance-gateway";

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub open_circuits: Vec<String>,
}

/// Names of breakers currently open.
pub fn open_circuits(breakers: &CircuitBreakerRegistry) -> Vec<String> {
    breakers
        .snapshots()
        .into_iter()
        .filter(|b| b.state == CircuitState::Open)
        .map(|b| b.name)
        .collect()
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "UP",
        service: SERVICE_NAME,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime_secs: state.started_at.elapsed().as_secs(),
        open_circuits: open_circuits(&state.breakers),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::BreakerSettings;

    #[tokio::test]
    async fn test_open_circuits_lists_only_open() {
        let registry = CircuitBreakerRegistry::new(BreakerSettings {
            failure_threshold: 1,
            ..BreakerSettings::default()
        });
        registry.get("vahan:validate_dl");
        registry.get("nic:eway_generate").record_failure();

        assert_eq!(open_circuits(&registry), vec!["nic:eway_generate".to_string()]);
    }
}
