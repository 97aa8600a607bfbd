//! Retry logic.
//!
//! # Responsibilities
//! - Classify a failure as transient or permanent
//! - Execute an operation up to `max_attempts` times with jittered backoff
//! - Surface the final error unchanged when attempts are exhausted
//!
//! # Design Decisions
//! - Client errors (4xx other than 429) are never retried
//! - Business errors inside a 200 response are permanent
//! - The policy is plain data so tests can shrink delays to zero

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Statuses treated as transient by default.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Network error codes treated as transient by default.
pub const DEFAULT_RETRYABLE_CODES: [&str; 7] = [
    "ECONNRESET",
    "ECONNREFUSED",
    "ETIMEDOUT",
    "ENOTFOUND",
    "EAI_AGAIN",
    "EPIPE",
    "EHOSTUNREACH",
];

/// Retry policy for one class of operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub retryable_status_codes: HashSet<u16>,
    pub retryable_error_codes: HashSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            retryable_status_codes: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
            retryable_error_codes: DEFAULT_RETRYABLE_CODES
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: if config.enabled { config.max_attempts.max(1) } else { 1 },
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            ..Self::default()
        }
    }

    /// Policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether a failed attempt should be retried.
    pub fn should_retry(&self, error: &GatewayError) -> bool {
        if let Some(code) = error.network_code() {
            return self.retryable_error_codes.contains(code);
        }
        match error.upstream_status() {
            Some(status) if (400..500).contains(&status) && status != 429 => false,
            Some(status) => self.retryable_status_codes.contains(&status),
            None => false,
        }
    }
}

/// Run `f` under `policy`, retrying transient failures.
///
/// `operation` labels the log lines and the retry counter.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut f: F) -> GatewayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt >= policy.max_attempts || !policy.should_retry(&error) {
                    if attempt > 1 {
                        tracing::error!(
                            operation,
                            attempts = attempt,
                            error = %error,
                            "Operation failed after retries"
                        );
                    }
                    return Err(error);
                }

                let delay = calculate_backoff(attempt, policy.base_delay, policy.max_delay);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    code = %error.code(),
                    "Retrying after transient failure"
                );
                metrics::record_retry(operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
