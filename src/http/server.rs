//! HTTP server setup and the gateway composition root.
//!
//! # Responsibilities
//! - Build every process-wide registry once (`Gateway::from_config`)
//! - Create the public Axum router with gateway handlers
//! - Wire up middleware (identity, rate limits, idempotency, tracing, limits, request ID)
//! - Serve the public and admin routers until shutdown
//! - Run the idempotency sweeper alongside the servers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{MatchedPath, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::time::Instant;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin::setup_admin_router;
use crate::config::GatewayConfig;
use crate::dispatch::{DispatchSettings, Dispatcher, ProviderClients};
use crate::error::GatewayResult;
use crate::health::health_handler;
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::idempotency::{idempotency_middleware, IdempotencyLayerState, IdempotencyStore, IdempotencySweeper};
use crate::lifecycle::shutdown::wait_for;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::providers::{EnvelopeCodec, PlainEnvelope};
use crate::resilience::{BreakerSettings, CircuitBreakerRegistry, RetryPolicy};
use crate::security::{dispatcher_identity_middleware, rate_limit_middleware, RateLimiterState};
use crate::usage::InMemoryUsageRecorder;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub idempotency: Arc<IdempotencyStore>,
    pub usage: Arc<InMemoryUsageRecorder>,
    pub admin_key: Arc<str>,
    pub started_at: Instant,
}

/// The assembled gateway.
pub struct Gateway {
    config: GatewayConfig,
    state: AppState,
    rate_limiter: Arc<RateLimiterState>,
}

impl Gateway {
    /// Build the gateway with the sandbox envelope codec.
    pub fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        let codec: Arc<dyn EnvelopeCodec> = Arc::new(PlainEnvelope::new("sandbox"));
        let clients = ProviderClients::from_config(&config.providers, codec)?;
        Ok(Self::with_clients(config, clients))
    }

    pub fn with_clients(config: GatewayConfig, clients: ProviderClients) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerSettings::from(
            &config.circuit_breaker,
        )));
        let idempotency = Arc::new(IdempotencyStore::new(
            Duration::from_secs(config.idempotency.ttl_secs),
            config.idempotency.max_entries,
        ));
        let usage = Arc::new(InMemoryUsageRecorder::new());

        let dispatcher = Arc::new(Dispatcher::new(
            clients,
            breakers.clone(),
            RetryPolicy::from_config(&config.retries),
            usage.clone(),
            DispatchSettings {
                breakers_enabled: config.circuit_breaker.enabled,
                cross_provider_fallback: config.dispatch.cross_provider_fallback,
            },
        ));

        let state = AppState {
            dispatcher,
            breakers,
            idempotency,
            usage,
            admin_key: Arc::from(config.admin.api_key.as_str()),
            started_at: Instant::now(),
        };
        let rate_limiter = Arc::new(RateLimiterState::new(config.rate_limit.clone()));

        Self {
            config,
            state,
            rate_limiter,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the public router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        let mut gateway = Router::new()
            .route("/api/gateway/vahan/validate-vehicle", post(handlers::validate_vehicle))
            .route("/api/gateway/vahan/validate-dl", post(handlers::validate_dl))
            .route("/api/gateway/eway/generate", post(handlers::generate_eway))
            .route("/api/gateway/eway/cancel", post(handlers::cancel_eway))
            .route("/api/gateway/eway/extend", post(handlers::extend_eway))
            .route("/api/gateway/einvoice/generate", post(handlers::generate_einvoice))
            .route("/api/gateway/einvoice/cancel", post(handlers::cancel_einvoice))
            .route("/api/gateway/einvoice/irn/{irn}", get(handlers::get_einvoice_by_irn))
            .route("/api/gateway/einvoice/details", get(handlers::get_einvoice_details));

        if self.config.idempotency.enabled {
            let idempotency = Arc::new(IdempotencyLayerState {
                store: self.state.idempotency.clone(),
                auto_generate: self.config.idempotency.auto_generate,
                max_body_size: self.config.listener.max_body_size,
            });
            gateway = gateway.layer(middleware::from_fn_with_state(idempotency, idempotency_middleware));
        }
        let gateway = gateway.layer(middleware::from_fn(dispatcher_identity_middleware));

        Router::new()
            .route("/health", get(health_handler))
            .merge(gateway)
            .route_layer(middleware::from_fn(track_requests))
            .with_state(self.state.clone())
            .layer(middleware::from_fn_with_state(
                self.rate_limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(RequestBodyLimitLayer::new(self.config.listener.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    pub fn admin_router(&self) -> Router {
        setup_admin_router(self.state.clone())
    }

    /// Bind the configured listeners and serve until SIGINT/SIGTERM.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(&self.config.listener.bind_address).await?;
        let admin = if self.config.admin.enabled {
            Some(TcpListener::bind(&self.config.admin.bind_address).await?)
        } else {
            None
        };

        let shutdown = Arc::new(Shutdown::new());
        tokio::spawn(crate::lifecycle::trigger_on_signal(shutdown.clone()));
        self.serve(listener, admin, shutdown).await
    }

    /// Serve on the given listeners until `shutdown` is triggered.
    pub async fn serve(
        self,
        listener: TcpListener,
        admin_listener: Option<TcpListener>,
        shutdown: Arc<Shutdown>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway server starting");

        let sweeper = IdempotencySweeper::new(
            self.state.idempotency.clone(),
            Duration::from_secs(self.config.idempotency.sweep_interval_secs),
        );
        let sweeper = tokio::spawn(sweeper.run(shutdown.subscribe()));

        let admin = match admin_listener {
            Some(admin_listener) => {
                let admin_addr = admin_listener.local_addr()?;
                tracing::info!(address = %admin_addr, "Admin API starting");
                let app = self.admin_router();
                let signal = wait_for(shutdown.subscribe());
                Some(tokio::spawn(async move {
                    axum::serve(admin_listener, app).with_graceful_shutdown(signal).await
                }))
            }
            None => None,
        };

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for(shutdown.subscribe()))
            .await?;
        tracing::info!("Gateway server stopped");

        if let Some(admin) = admin {
            match admin.await {
                Ok(result) => result?,
                Err(e) => tracing::error!(error = %e, "Admin server task failed"),
            }
            tracing::info!("Admin API stopped");
        }
        if let Err(e) = sweeper.await {
            tracing::error!(error = %e, "Idempotency sweeper task failed");
        }
        Ok(())
    }
}

/// Request count and latency per matched route.
async fn track_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;
    metrics::record_request(&route, response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}
