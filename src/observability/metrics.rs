//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by route, status
//! - `gateway_request_duration_seconds` (histogram): inbound latency by route
//! - `gateway_retries_total` (counter): retry attempts by operation
//! - `gateway_circuit_state` (gauge): 0=closed, 1=open, 2=half-open, by breaker
//! - `gateway_idempotency_total` (counter): hit, in_progress, miss, bypassed
//! - `gateway_rate_limited_total` (counter): rejected requests by group
//! - `gateway_auth_refresh_total` (counter): credential refreshes by provider, outcome
//! - `gateway_provider_calls_total` (counter): provider calls by operation, outcome

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &str, status: u16, duration_secs: f64) {
    counter!("gateway_requests_total", "route" => route.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string()).record(duration_secs);
}

pub fn record_retry(operation: &str) {
    counter!("gateway_retries_total", "operation" => operation.to_string()).increment(1);
}

pub fn record_circuit_state(breaker: &str, value: f64) {
    gauge!("gateway_circuit_state", "breaker" => breaker.to_string()).set(value);
}

pub fn record_idempotency(outcome: &'static str) {
    counter!("gateway_idempotency_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(group: &'static str) {
    counter!("gateway_rate_limited_total", "group" => group).increment(1);
}

pub fn record_auth_refresh(provider: &'static str, outcome: &'static str) {
    counter!("gateway_auth_refresh_total", "provider" => provider, "outcome" => outcome).increment(1);
}

pub fn record_provider_call(operation: &str, outcome: &'static str) {
    counter!(
        "gateway_provider_calls_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
