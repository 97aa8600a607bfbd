//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the compliance gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Circuit breaker defaults.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Idempotency cache settings.
    pub idempotency: IdempotencyConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Provider selection settings.
    pub dispatch: DispatchConfig,

    /// Upstream provider credentials and endpoints.
    pub providers: ProvidersConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for an inbound request, retries included, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 120 }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries. When disabled every call gets a single attempt.
    pub enabled: bool,

    /// Total attempts (1 initial + retries).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

/// Circuit breaker defaults, applied to every breaker created lazily.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Enable circuit breakers around provider calls.
    pub enabled: bool,

    /// Consecutive failures before opening.
    pub failure_threshold: u32,

    /// Successes in half-open before closing.
    pub success_threshold: u32,

    /// Time to wait in open before allowing a probe, in milliseconds.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 30_000,
        }
    }
}

/// Idempotency cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Enable the idempotency middleware on gateway routes.
    pub enabled: bool,

    /// Derive a key from canonical request fields when the header is absent.
    pub auto_generate: bool,

    /// Lifetime of a completed entry in seconds.
    pub ttl_secs: u64,

    /// Interval between expiry sweeps in seconds.
    pub sweep_interval_secs: u64,

    /// Maximum number of tracked keys. New keys bypass the cache beyond this.
    pub max_entries: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_generate: false,
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
            max_entries: 10_000,
        }
    }
}

/// Rate limiting configuration. Limits are requests per minute.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Global limit per client IP.
    pub global_per_minute: u32,

    /// VAHAN limit per client IP and per dispatcher.
    pub vahan_per_minute: u32,

    /// eWay Bill limit per client IP and per dispatcher.
    pub eway_per_minute: u32,

    /// eInvoice limit per client IP and per dispatcher.
    pub einvoice_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_per_minute: 500,
            vahan_per_minute: 100,
            eway_per_minute: 200,
            einvoice_per_minute: 150,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder admin key rejected by validation when admin is enabled.
pub const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_ADMIN_KEY.to_string(),
            bind_address: "127.0.0.1:5001".to_string(),
        }
    }
}

/// Provider selection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    /// Issue eWay Bills through Whitebooks when the NIC breaker is open.
    pub cross_provider_fallback: bool,
}

/// All upstream providers.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub vahan: VahanConfig,
    pub nic_eway: NicEwayConfig,
    pub whitebooks_eway: WhitebooksConfig,
    pub whitebooks_einvoice: WhitebooksConfig,
}

/// VAHAN (vehicle registration / driving licence) provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VahanConfig {
    /// OAuth base URL (`{auth_url}/oauth/token`).
    pub auth_url: String,

    /// API base URL for RC and DL lookups.
    pub api_url: String,

    pub api_key: String,
    pub secret_key: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Token lifetime used when the provider does not send `expires_in`.
    pub token_ttl_secs: u64,
}

impl Default for VahanConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://uat.risewithprotean.io/v1".to_string(),
            api_url: "https://uat.risewithprotean.io/api/v1".to_string(),
            api_key: String::new(),
            secret_key: String::new(),
            timeout_secs: 30,
            token_ttl_secs: 6 * 60 * 60,
        }
    }
}

/// NIC eWay Bill provider (encrypted channel).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NicEwayConfig {
    /// Base URL, concatenated directly with operation names.
    pub url: String,

    pub username: String,
    pub password: String,

    /// ASP application key.
    pub asp_id: String,

    pub gstin: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Session lifetime used when the provider does not send an expiry.
    pub token_ttl_secs: u64,
}

impl Default for NicEwayConfig {
    fn default() -> Self {
        Self {
            url: "https://test.proteangsp.co.in/gus/ewb/ewaybillapi/".to_string(),
            username: String::new(),
            password: String::new(),
            asp_id: String::new(),
            gstin: String::new(),
            timeout_secs: 30,
            token_ttl_secs: 6 * 60 * 60,
        }
    }
}

/// Whitebooks provider (eWay Bill or eInvoice product).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WhitebooksConfig {
    /// Host base URL (paths are product specific).
    pub url: String,

    pub email: String,
    pub username: String,
    pub password: String,
    pub ip_address: String,
    pub client_id: String,
    pub client_secret: String,
    pub gstin: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Token lifetime used when the provider does not send `TokenExpiry`.
    pub token_ttl_secs: u64,
}

impl Default for WhitebooksConfig {
    fn default() -> Self {
        Self {
            url: "https://apisandbox.whitebooks.in".to_string(),
            email: String::new(),
            username: String::new(),
            password: String::new(),
            ip_address: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            gstin: String::new(),
            timeout_secs: 30,
            token_ttl_secs: 6 * 60 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [retries]
            max_attempts = 5

            [providers.whitebooks_eway]
            email = "ops@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.retries.max_attempts, 5);
        assert_eq!(config.retries.base_delay_ms, 1000);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.idempotency.ttl_secs, 86_400);
        assert_eq!(config.providers.whitebooks_eway.email, "ops@example.com");
        assert_eq!(config.providers.whitebooks_eway.timeout_secs, 30);
        assert!(!config.dispatch.cross_provider_fallback);
    }
}
