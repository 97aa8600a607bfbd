//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts ≥ 1, thresholds ≥ 1, delays ordered)
//! - Check that provider URLs and bind addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, PLACEHOLDER_ADMIN_KEY};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    let breaker = &config.circuit_breaker;
    if breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if breaker.success_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.success_threshold", "must be at least 1"));
    }

    let idem = &config.idempotency;
    if idem.ttl_secs == 0 {
        errors.push(ValidationError::new("idempotency.ttl_secs", "must be greater than 0"));
    }
    if idem.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("idempotency.sweep_interval_secs", "must be greater than 0"));
    }
    if idem.max_entries == 0 {
        errors.push(ValidationError::new("idempotency.max_entries", "must be greater than 0"));
    }

    if config.observability.metrics_enabled {
        check_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_ADMIN_KEY {
            errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
        }
    }

    let providers = &config.providers;
    check_url(&mut errors, "providers.vahan.auth_url", &providers.vahan.auth_url);
    check_url(&mut errors, "providers.vahan.api_url", &providers.vahan.api_url);
    check_url(&mut errors, "providers.nic_eway.url", &providers.nic_eway.url);
    check_url(&mut errors, "providers.whitebooks_eway.url", &providers.whitebooks_eway.url);
    check_url(&mut errors, "providers.whitebooks_einvoice.url", &providers.whitebooks_einvoice.url);

    for (field, secs) in [
        ("providers.vahan.timeout_secs", providers.vahan.timeout_secs),
        ("providers.nic_eway.timeout_secs", providers.nic_eway.timeout_secs),
        ("providers.whitebooks_eway.timeout_secs", providers.whitebooks_eway.timeout_secs),
        ("providers.whitebooks_einvoice.timeout_secs", providers.whitebooks_einvoice.timeout_secs),
    ] {
        if secs == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address '{}'", value)));
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if let Err(e) = Url::parse(value) {
        errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e)));
    }
}
