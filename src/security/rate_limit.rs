//! Rate limiting middleware with per-group limits.
//!
//! Every request spends a token from the global bucket of its client IP.
//! Gateway requests also spend from their API group's bucket for the client
//! IP and, when the request names one, for the dispatcher id. The IP bucket
//! caps clients that rotate dispatcher ids.
//!
//! Limits are per minute and buckets refill linearly, so a bucket idle for a
//! whole window is full and indistinguishable from a new one. Such buckets are
//! dropped at most once per window.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::http::response::ErrorBody;
use crate::observability::metrics;
use crate::security::access_control::DISPATCHER_HEADER;

const WINDOW: Duration = Duration::from_secs(60);

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_per_sec: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Rate-limited API families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiGroup {
    Global,
    Vahan,
    Eway,
    Einvoice,
}

impl ApiGroup {
    /// Group of a gateway path, `None` for paths outside the gateway API.
    pub fn for_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix("/api/gateway/")?;
        match rest.split('/').next() {
            Some("vahan") => Some(ApiGroup::Vahan),
            Some("eway") => Some(ApiGroup::Eway),
            Some("einvoice") => Some(ApiGroup::Einvoice),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ApiGroup::Global => "global",
            ApiGroup::Vahan => "vahan",
            ApiGroup::Eway => "eway",
            ApiGroup::Einvoice => "einvoice",
        }
    }
}

struct Buckets {
    map: HashMap<(ApiGroup, String), TokenBucket>,
    last_sweep: Instant,
}

impl Buckets {
    fn sweep_idle(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map
            .retain(|_, bucket| now.duration_since(bucket.last_update) < WINDOW);
        self.last_sweep = now;
        before - self.map.len()
    }
}

/// State for the rate limiter.
pub struct RateLimiterState {
    buckets: Mutex<Buckets>,
    config: RateLimitConfig,
}

impl RateLimiterState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(Buckets {
                map: HashMap::new(),
                last_sweep: Instant::now(),
            }),
            config,
        }
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner).map.len()
    }

    fn per_minute(&self, group: ApiGroup) -> u32 {
        match group {
            ApiGroup::Global => self.config.global_per_minute,
            ApiGroup::Vahan => self.config.vahan_per_minute,
            ApiGroup::Eway => self.config.eway_per_minute,
            ApiGroup::Einvoice => self.config.einvoice_per_minute,
        }
    }

    /// Spend one token for `client` in `group`.
    pub fn check(&self, group: ApiGroup, client: &str) -> bool {
        let capacity = f64::from(self.per_minute(group));
        let refill = capacity / 60.0;

        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if now.duration_since(buckets.last_sweep) >= WINDOW {
            let dropped = buckets.sweep_idle(now);
            tracing::debug!(dropped, "Idle rate limit buckets dropped");
        }
        buckets
            .map
            .entry((group, client.to_string()))
            .or_insert_with(|| TokenBucket::new(capacity))
            .try_acquire(capacity, refill)
    }
}

fn too_many(group: ApiGroup) -> Response {
    metrics::record_rate_limited(group.as_str());
    ErrorBody::rejection(
        StatusCode::TOO_MANY_REQUESTS,
        "RATE_LIMITED",
        format!("Too many {} requests, please try again later", group.as_str()),
    )
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.enabled {
        return next.run(request).await;
    }

    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.check(ApiGroup::Global, &ip) {
        tracing::warn!(client = %ip, "Global rate limit exceeded");
        return too_many(ApiGroup::Global);
    }

    if let Some(group) = ApiGroup::for_path(request.uri().path()) {
        if !state.check(group, &format!("ip:{}", ip)) {
            tracing::warn!(client = %ip, group = group.as_str(), "Rate limit exceeded");
            return too_many(group);
        }
        let dispatcher = request
            .headers()
            .get(DISPATCHER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if let Some(dispatcher) = dispatcher {
            if !state.check(group, &format!("dispatcher:{}", dispatcher)) {
                tracing::warn!(client = %ip, dispatcher, group = group.as_str(), "Rate limit exceeded");
                return too_many(group);
            }
        }
    }

    next.run(request).await
}
