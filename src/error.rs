//! Gateway error taxonomy.
//!
//! # Classification
//! ```text
//! Network               → transient, retryable by code
//! UpstreamUnavailable   → transient, retryable by status (408/429/5xx)
//! ClientRequest         → fatal, never retried (4xx other than 429)
//! Authentication        → fatal for the current call
//! ProviderProtocol      → provider said 200 but embedded a business error
//! DuplicateInFlight     → idempotency conflict
//! ```
//!
//! # Design Decisions
//! - `Clone` so a single shared credential refresh can hand the same error to every waiter
//! - Carries strings and status codes only, never transport error objects
//! - Circuit-open is not an error variant: the breaker fails open

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the gateway core.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Connection-level failure (reset, refused, timeout, DNS).
    #[error("network error ({code}): {message}")]
    Network { code: String, message: String },

    /// Upstream answered with a transient status (408, 429, 5xx).
    #[error("upstream unavailable (HTTP {status}): {message}")]
    UpstreamUnavailable { status: u16, message: String },

    /// Upstream rejected the request (4xx other than 429).
    #[error("upstream rejected request (HTTP {status}): {message}")]
    ClientRequest {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    /// Credential handshake with a provider failed.
    #[error("authentication with {provider} failed: {message}")]
    Authentication { provider: String, message: String },

    /// A request with the same idempotency key is still being processed.
    #[error("A request with this idempotency key is currently being processed")]
    DuplicateInFlight,

    /// Provider returned a success wrapper with an embedded business error.
    #[error("{provider} returned error {code}: {message}")]
    ProviderProtocol {
        provider: String,
        code: String,
        message: String,
        details: Option<Value>,
    },

    /// Caller request is missing required fields.
    #[error("{0}")]
    InvalidRequest(String),

    /// Sealing or opening an encrypted envelope failed.
    #[error("envelope error: {0}")]
    Envelope(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Build the error for a non-success upstream HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>, details: Option<Value>) -> Self {
        let message = message.into();
        match status {
            408 | 429 | 500..=599 => GatewayError::UpstreamUnavailable { status, message },
            _ => GatewayError::ClientRequest {
                status,
                message,
                details,
            },
        }
    }

    /// HTTP status carried by the error, if it came from an upstream response.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            GatewayError::UpstreamUnavailable { status, .. }
            | GatewayError::ClientRequest { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Network error code (`ECONNRESET`, `ETIMEDOUT`, ...), if any.
    pub fn network_code(&self) -> Option<&str> {
        match self {
            GatewayError::Network { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Short code used in logs and the caller-facing `errorCodes` field.
    pub fn code(&self) -> String {
        match self {
            GatewayError::Network { code, .. } => code.clone(),
            GatewayError::UpstreamUnavailable { status, .. }
            | GatewayError::ClientRequest { status, .. } => status.to_string(),
            GatewayError::Authentication { .. } => "AUTHENTICATION_FAILED".to_string(),
            GatewayError::DuplicateInFlight => "REQUEST_IN_PROGRESS".to_string(),
            GatewayError::ProviderProtocol { code, .. } => code.clone(),
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST".to_string(),
            GatewayError::Envelope(_) => "ENVELOPE_ERROR".to_string(),
            GatewayError::Internal(_) => "UNKNOWN".to_string(),
        }
    }
}
