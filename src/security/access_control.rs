//! Dispatcher identity middleware.
//!
//! Gateway callers identify themselves with `X-Dispatcher-ID`, `X-Mine-ID` and
//! `X-Org-ID`. The mine id is the usage tenant.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::response::ErrorBody;
use crate::http::RequestIdExt;

pub const DISPATCHER_HEADER: &str = "x-dispatcher-id";
pub const MINE_HEADER: &str = "x-mine-id";
pub const ORG_HEADER: &str = "x-org-id";

/// Identity attached to authenticated gateway requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantContext {
    pub dispatcher_id: String,
    pub mine_id: String,
    pub org_id: String,
}

impl TenantContext {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Some(Self {
            dispatcher_id: read(DISPATCHER_HEADER)?,
            mine_id: read(MINE_HEADER)?,
            org_id: read(ORG_HEADER)?,
        })
    }
}

pub async fn dispatcher_identity_middleware(mut request: Request, next: Next) -> Response {
    match TenantContext::from_headers(request.headers()) {
        Some(ctx) => {
            tracing::debug!(
                request_id = %request.request_id(),
                dispatcher = %ctx.dispatcher_id,
                mine = %ctx.mine_id,
                "Dispatcher identified"
            );
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        None => {
            tracing::warn!(
                request_id = %request.request_id(),
                path = %request.uri().path(),
                "Rejected request without dispatcher identity"
            );
            ErrorBody::rejection(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Dispatcher authentication required: X-Dispatcher-ID, X-Mine-ID and X-Org-ID headers must be provided",
            )
        }
    }
}
