//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all subsystems as a span field
//! - Metric helpers are free functions so every module records the same names
//! - Without an installed recorder metric calls are no-ops (tests, CLI)

pub mod logging;
pub mod metrics;
