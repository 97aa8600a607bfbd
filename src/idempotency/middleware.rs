//! Idempotency middleware for gateway routes.
//!
//! Only POST requests participate. The handler runs at most once per live key;
//! duplicates are answered from the store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GatewayError;
use crate::idempotency::keys::derive_key;
use crate::idempotency::store::{BeginOutcome, CachedResponse, ExistingEntry, IdempotencyStore};
use crate::observability::{logging::redact_key, metrics};
use crate::security::TenantContext;

/// Client header carrying the idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

/// Response header set on replayed responses.
pub const CACHED_HEADER: &str = "x-idempotency-cached";

/// State for the idempotency middleware.
pub struct IdempotencyLayerState {
    pub store: Arc<IdempotencyStore>,
    pub auto_generate: bool,
    /// Upper bound for request bodies buffered to derive a key.
    pub max_body_size: usize,
}

/// Abandons the pending key unless the response was stored.
struct PendingGuard {
    store: Arc<IdempotencyStore>,
    scope: String,
    key: String,
    armed: bool,
}

impl PendingGuard {
    fn complete(mut self, response: CachedResponse) {
        self.store.complete(&self.scope, &self.key, response);
        self.armed = false;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.armed {
            self.store.abandon(&self.scope, &self.key);
            tracing::debug!(key = %redact_key(&self.key), "Idempotency key abandoned");
        }
    }
}

pub async fn idempotency_middleware(
    State(state): State<Arc<IdempotencyLayerState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let route = request.uri().path().to_string();
    let scope = match request.extensions().get::<TenantContext>() {
        Some(tenant) => format!("{}#{}", route, tenant.mine_id),
        None => route.clone(),
    };
    let header_key = request
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    let (request, key) = match header_key {
        Some(key) => (request, Some(key)),
        None if state.auto_generate => {
            let (parts, body) = request.into_parts();
            let bytes = match to_bytes(body, state.max_body_size).await {
                Ok(bytes) => bytes,
                Err(_) => {
                    return GatewayError::InvalidRequest("request body could not be read".into())
                        .into_response()
                }
            };
            let key = serde_json::from_slice(&bytes)
                .ok()
                .and_then(|json| derive_key(&route, &json));
            (Request::from_parts(parts, Body::from(bytes)), key)
        }
        None => (request, None),
    };

    let Some(key) = key else {
        return next.run(request).await;
    };

    match state.store.begin_pending(&scope, &key) {
        BeginOutcome::Bypassed => {
            tracing::warn!(key = %redact_key(&key), "Idempotency store full, bypassing cache");
            metrics::record_idempotency("bypassed");
            next.run(request).await
        }
        BeginOutcome::Existing(ExistingEntry::InProgress) => {
            tracing::warn!(key = %redact_key(&key), route = %route, "Duplicate request while original in flight");
            metrics::record_idempotency("in_progress");
            GatewayError::DuplicateInFlight.into_response()
        }
        BeginOutcome::Existing(ExistingEntry::Completed(cached)) => {
            tracing::info!(key = %redact_key(&key), route = %route, "Replaying cached response");
            metrics::record_idempotency("hit");
            replay(cached)
        }
        BeginOutcome::Started => {
            metrics::record_idempotency("miss");
            let guard = PendingGuard {
                store: state.store.clone(),
                scope,
                key,
                armed: true,
            };

            let response = next.run(request).await;
            if !response.status().is_success() {
                return response;
            }

            // Replies are cached whatever their size.
            let (parts, body) = response.into_parts();
            let bytes = match to_bytes(body, usize::MAX).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    return GatewayError::Internal(format!("response body could not be buffered: {}", e))
                        .into_response()
                }
            };
            guard.complete(CachedResponse {
                status: parts.status.as_u16(),
                content_type: parts
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                body: bytes.clone(),
            });
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

fn replay(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    if let Some(value) = cached
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(CACHED_HEADER, HeaderValue::from_static("true"));
    response
}
