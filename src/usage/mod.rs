//! Usage accounting.
//!
//! # Responsibilities
//! - Count provider calls per tenant, operation and calendar month
//! - Never interfere with the primary call path
//!
//! # Design Decisions
//! - `UsageRecorder` is a trait so persistent stores can replace the in-memory one
//! - Recorder errors are returned to the dispatcher, which logs and drops them
//! - Calendar months are UTC

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

/// Billable operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    VahanVehicle,
    VahanDl,
    EwayGenerate,
    EwayCancel,
    EwayExtend,
    EinvoiceGenerate,
    EinvoiceCancel,
    EinvoiceGetIrn,
    EinvoiceGetDetails,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::VahanVehicle => "vahan_vehicle",
            OperationType::VahanDl => "vahan_dl",
            OperationType::EwayGenerate => "eway_generate",
            OperationType::EwayCancel => "eway_cancel",
            OperationType::EwayExtend => "eway_extend",
            OperationType::EinvoiceGenerate => "einvoice_generate",
            OperationType::EinvoiceCancel => "einvoice_cancel",
            OperationType::EinvoiceGetIrn => "einvoice_get_irn",
            OperationType::EinvoiceGetDetails => "einvoice_get_details",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("usage store unavailable: {0}")]
    Unavailable(String),
}

/// Fire-and-forget usage sink.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record(&self, tenant: &str, operation: OperationType, success: bool) -> Result<(), UsageError>;
}

#[derive(Default)]
struct Counters {
    count: AtomicU64,
    success: AtomicU64,
    failure: AtomicU64,
}

/// One row of the usage report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub tenant: String,
    pub operation: OperationType,
    pub year: i32,
    pub month: u32,
    pub count: u64,
    pub success: u64,
    pub failure: u64,
}

type UsageKey = (String, OperationType, i32, u32);

/// Process-local counters per (tenant, operation, year, month).
#[derive(Default)]
pub struct InMemoryUsageRecorder {
    counters: DashMap<UsageKey, Counters>,
}

impl InMemoryUsageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, key: UsageKey, success: bool) {
        let counters = self.counters.entry(key).or_default();
        counters.count.fetch_add(1, Ordering::Relaxed);
        if success {
            counters.success.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Rows matching the filters, sorted by tenant, period and operation.
    pub fn query(&self, tenant: Option<&str>, year: Option<i32>, month: Option<u32>) -> Vec<UsageRecord> {
        let mut rows: Vec<UsageRecord> = self
            .counters
            .iter()
            .filter(|entry| {
                let (t, _, y, m) = entry.key();
                tenant.map_or(true, |want| want == t)
                    && year.map_or(true, |want| want == *y)
                    && month.map_or(true, |want| want == *m)
            })
            .map(|entry| {
                let (t, op, y, m) = entry.key();
                UsageRecord {
                    tenant: t.clone(),
                    operation: *op,
                    year: *y,
                    month: *m,
                    count: entry.count.load(Ordering::Relaxed),
                    success: entry.success.load(Ordering::Relaxed),
                    failure: entry.failure.load(Ordering::Relaxed),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            (&a.tenant, a.year, a.month, a.operation.as_str())
                .cmp(&(&b.tenant, b.year, b.month, b.operation.as_str()))
        });
        rows
    }
}

#[async_trait]
impl UsageRecorder for InMemoryUsageRecorder {
    async fn record(&self, tenant: &str, operation: OperationType, success: bool) -> Result<(), UsageError> {
        let now = Utc::now();
        self.bump((tenant.to_string(), operation, now.year(), now.month()), success);
        Ok(())
    }
}
