//! Provider response decoding.
//!
//! Providers signal business errors inside HTTP 200 bodies in different ways:
//! ```text
//! NIC          {status: 0, error: "<base64 JSON with errorCodes>"}
//! Whitebooks   {status_cd: "0", status_desc, error: {error_cd, message}}
//! Extend       {status_cd: 1} or {status: 1}
//! ```
//! Each quirk is a field in `ResponseShape`; `decode` is the only decoder.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::providers::transport::HttpReply;

/// Tagged result of one provider call.
#[derive(Debug, Clone)]
pub enum ProviderResponse {
    Success(Value),
    BusinessError {
        code: String,
        message: String,
        details: Option<Value>,
    },
    Transport(GatewayError),
}

impl ProviderResponse {
    pub fn into_result(self, provider: &str) -> GatewayResult<Value> {
        match self {
            ProviderResponse::Success(body) => Ok(body),
            ProviderResponse::BusinessError { code, message, details } => {
                Err(GatewayError::ProviderProtocol {
                    provider: provider.to_string(),
                    code,
                    message,
                    details,
                })
            }
            ProviderResponse::Transport(error) => Err(error),
        }
    }
}

/// How a provider's body reports success and errors.
#[derive(Debug, Clone, Copy)]
pub struct ResponseShape {
    /// Success when any of these fields holds a success value. Empty means no status field.
    pub status_fields: &'static [&'static str],
    pub success_values: &'static [i64],
    /// Field holding the error container (object, string or base64 blob).
    pub error_field: &'static str,
    /// The error container may be base64-encoded JSON.
    pub encoded_error: bool,
    /// Code fields, in precedence order.
    pub code_fields: &'static [&'static str],
    /// Message fields inside the container, in precedence order.
    pub message_fields: &'static [&'static str],
    /// Top-level message used when the container has none.
    pub fallback_message_field: Option<&'static str>,
}

impl ResponseShape {
    pub const NIC: ResponseShape = ResponseShape {
        status_fields: &["status"],
        success_values: &[1],
        error_field: "error",
        encoded_error: true,
        code_fields: &["errorCodes", "errorCode"],
        message_fields: &["message", "errorMessage"],
        fallback_message_field: Some("info"),
    };

    pub const WHITEBOOKS: ResponseShape = ResponseShape {
        status_fields: &["status_cd"],
        success_values: &[1],
        error_field: "error",
        encoded_error: false,
        code_fields: &["errorCodes", "error_cd", "code"],
        message_fields: &["message", "error_desc"],
        fallback_message_field: Some("status_desc"),
    };

    /// Validity extension answers with either status field.
    pub const WHITEBOOKS_EXTEND: ResponseShape = ResponseShape {
        status_fields: &["status_cd", "status"],
        ..ResponseShape::WHITEBOOKS
    };

    /// VAHAN has no status wrapper; a decoded 2xx body is the result.
    pub const VAHAN: ResponseShape = ResponseShape {
        status_fields: &[],
        success_values: &[],
        error_field: "error",
        encoded_error: false,
        code_fields: &["code", "errorCode"],
        message_fields: &["message"],
        fallback_message_field: Some("message"),
    };

    fn is_success(&self, body: &Value) -> bool {
        if self.status_fields.is_empty() {
            return true;
        }
        self.status_fields.iter().any(|field| {
            body.get(*field)
                .and_then(as_i64)
                .is_some_and(|v| self.success_values.contains(&v))
        })
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) if !items.is_empty() => Some(
            items
                .iter()
                .filter_map(as_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        _ => None,
    }
}

fn first_text(container: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| container.get(*f).and_then(as_text))
}

/// Decode one provider reply.
pub fn decode(shape: &ResponseShape, reply: GatewayResult<HttpReply>) -> ProviderResponse {
    let body = match reply {
        Ok(reply) => reply.body,
        Err(error) => return ProviderResponse::Transport(error),
    };

    if shape.is_success(&body) {
        return ProviderResponse::Success(body);
    }

    let raw = body.get(shape.error_field).cloned().unwrap_or(Value::Null);
    let (container, decoded_text) = match &raw {
        Value::String(s) if shape.encoded_error => match decode_blob(s) {
            Some((parsed, text)) => (parsed, Some(text)),
            None => (Value::Null, Some(s.clone())),
        },
        Value::String(s) => (Value::Null, Some(s.clone())),
        other => (other.clone(), None),
    };

    let code = first_text(&container, shape.code_fields)
        .or_else(|| first_text(&body, shape.code_fields))
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let message = first_text(&container, shape.message_fields)
        .or(decoded_text)
        .or_else(|| {
            shape
                .fallback_message_field
                .and_then(|f| body.get(f))
                .and_then(as_text)
        })
        .unwrap_or_else(|| "Unknown error".to_string());

    ProviderResponse::BusinessError {
        code,
        message,
        details: if raw.is_null() { Some(body) } else { Some(raw) },
    }
}

fn decode_blob(encoded: &str) -> Option<(Value, String)> {
    let bytes = STANDARD.decode(encoded.trim().as_bytes()).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let parsed = serde_json::from_str(&text).unwrap_or(Value::Null);
    Some((parsed, text))
}
