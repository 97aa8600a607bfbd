//! HTTP transport shared by provider clients.
//!
//! # Responsibilities
//! - Own one `reqwest::Client` per provider with its configured timeout
//! - Map transport failures onto network error codes
//! - Turn non-2xx statuses into classified `GatewayError`s

use std::error::Error as _;
use std::io;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};

/// Decoded upstream reply with a 2xx status.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Value,
}

/// reqwest wrapper for one provider.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    provider: &'static str,
}

impl Transport {
    pub fn new(provider: &'static str, timeout: Duration) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("compliance-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Internal(format!("failed to build {} client: {}", provider, e)))?;
        Ok(Self { client, provider })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    /// Send a request and decode the JSON body.
    ///
    /// Empty bodies decode to `null`, non-JSON bodies to a string.
    pub async fn send(&self, request: RequestBuilder) -> GatewayResult<HttpReply> {
        let response = request.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify_reqwest_error)?;
        let body = parse_body(&text);

        if !(200..300).contains(&status) {
            let message = error_message(&body)
                .unwrap_or_else(|| format!("{} responded with HTTP {}", self.provider, status));
            tracing::warn!(provider = self.provider, status, message = %message, "Provider returned error status");
            return Err(GatewayError::from_status(status, message, Some(body)));
        }

        Ok(HttpReply { status, body })
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn error_message(body: &Value) -> Option<String> {
    for field in ["message", "error_description", "status_desc", "error"] {
        match body.get(field) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Object(obj)) => {
                if let Some(Value::String(s)) = obj.get("message") {
                    return Some(s.clone());
                }
            }
            _ => {}
        }
    }
    match body {
        Value::String(s) if !s.is_empty() => Some(s.chars().take(200).collect()),
        _ => None,
    }
}

/// Map a reqwest failure onto a network error code.
pub fn classify_reqwest_error(error: reqwest::Error) -> GatewayError {
    let code = network_code(&error);
    GatewayError::Network {
        code: code.to_string(),
        message: error.to_string(),
    }
}

/// Code for errors outside the recognized network failures. Never retried.
pub const UNKNOWN_CODE: &str = "EUNKNOWN";

fn network_code(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        return "ETIMEDOUT";
    }

    let mut dropped = false;
    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io_error) = inner.downcast_ref::<io::Error>() {
            match io_error.kind() {
                io::ErrorKind::ConnectionRefused => return "ECONNREFUSED",
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => return "ECONNRESET",
                io::ErrorKind::BrokenPipe => return "EPIPE",
                io::ErrorKind::TimedOut => return "ETIMEDOUT",
                io::ErrorKind::UnexpectedEof => dropped = true,
                _ => {}
            }
        }
        let text = inner.to_string().to_ascii_lowercase();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return "ENOTFOUND";
        }
        if text.contains("connection closed before message completed") {
            dropped = true;
        }
        source = inner.source();
    }

    if error.is_connect() {
        "ECONNREFUSED"
    } else if dropped {
        "ECONNRESET"
    } else {
        UNKNOWN_CODE
    }
}
