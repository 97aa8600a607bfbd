//! Compliance API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!   Dispatcher request
//!   ──────────────────▶ http server ──▶ identity ──▶ rate limit ──▶ idempotency
//!                                                                       │
//!                                                                       ▼
//!                                                                   handlers
//!                                                                       │
//!                                                                       ▼
//!                        ┌──────────────────── dispatch ────────────────────┐
//!                        │ circuit breaker ▶ retry executor ▶ provider call │
//!                        │          session manager (single-flight auth)    │
//!                        └───────────┬───────────────┬──────────────┬──────┘
//!                                    ▼               ▼              ▼
//!                                  VAHAN          NIC eWay      Whitebooks
//! ```

use std::path::PathBuf;

use clap::Parser;

use compliance_gateway::config::loader::load_config;
use compliance_gateway::observability::{logging, metrics};
use compliance_gateway::{Gateway, GatewayConfig};

#[derive(Parser)]
#[command(name = "compliance-gateway")]
#[command(about = "Resilient gateway for VAHAN, eWay Bill and eInvoice providers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability.log_level);
    tracing::info!("compliance-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        max_attempts = config.retries.max_attempts,
        breakers = config.circuit_breaker.enabled,
        idempotency = config.idempotency.enabled,
        admin = config.admin.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let gateway = Gateway::from_config(config)?;
    gateway.run().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
