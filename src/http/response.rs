//! Caller-facing response shapes.
//!
//! ```text
//! success: {success: true, message, provider, data}
//! failure: {success: false, status, error_message, errorCodes, errorDetails, provider}
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::dispatch::DispatchOutcome;
use crate::error::GatewayError;

#[derive(Debug, Serialize)]
pub struct SuccessBody {
    pub success: bool,
    pub message: String,
    pub provider: &'static str,
    pub data: Value,
}

impl SuccessBody {
    pub fn new(message: impl Into<String>, outcome: DispatchOutcome) -> Self {
        Self {
            success: true,
            message: message.into(),
            provider: outcome.provider,
            data: outcome.data,
        }
    }
}

impl IntoResponse for SuccessBody {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub status: u16,
    pub error_message: String,
    #[serde(rename = "errorCodes")]
    pub error_codes: String,
    #[serde(rename = "errorDetails", skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl ErrorBody {
    /// Error body for rejections raised by gateway middleware.
    pub fn rejection(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
        let body = Self {
            success: false,
            status: status.as_u16(),
            error_message: message.into(),
            error_codes: code.to_string(),
            error_details: None,
            provider: None,
        };
        (status, Json(body)).into_response()
    }
}

/// HTTP status for each error class.
pub fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::Authentication { .. } => StatusCode::UNAUTHORIZED,
        GatewayError::DuplicateInFlight => StatusCode::CONFLICT,
        GatewayError::ProviderProtocol { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::ClientRequest { status, .. } | GatewayError::UpstreamUnavailable { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        GatewayError::Network { .. } | GatewayError::Envelope(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<&GatewayError> for ErrorBody {
    fn from(error: &GatewayError) -> Self {
        let details = match error {
            GatewayError::ClientRequest { details, .. } | GatewayError::ProviderProtocol { details, .. } => {
                details.clone()
            }
            _ => None,
        };
        let message = match error {
            GatewayError::ProviderProtocol { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let provider = match error {
            GatewayError::Authentication { provider, .. } | GatewayError::ProviderProtocol { provider, .. } => {
                Some(provider.clone())
            }
            _ => None,
        };
        Self {
            success: false,
            status: status_for(error).as_u16(),
            error_message: message,
            error_codes: error.code(),
            error_details: details,
            provider,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}
