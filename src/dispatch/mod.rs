//! Provider dispatch.
//!
//! # Data Flow
//! ```text
//! Handler
//!     → Dispatcher::operation(tenant, input)
//!         → normalize.rs                    (provider payload shape)
//!         → CircuitBreaker `{provider}:{operation}`
//!             → with_retry(RetryPolicy)
//!                 → provider client         (auth + one attempt)
//!         → UsageRecorder::record           (errors logged, never raised)
//! ```
//!
//! # Design Decisions
//! - eWay generation goes to NIC when the caller sets `isMasterEway`, Whitebooks otherwise
//! - With `cross_provider_fallback`, an open NIC breaker issues through Whitebooks
//! - The dispatcher never reads raw provider JSON; clients return decoded results

pub mod normalize;

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::ProvidersConfig;
use crate::error::GatewayResult;
use crate::observability::metrics;
use crate::providers::{
    nic, vahan, whitebooks, EnvelopeCodec, NicEwayClient, ResponseShape, VahanClient, WhitebooksClient,
    WhitebooksProduct,
};
use crate::resilience::{with_retry, CircuitBreakerRegistry, RetryPolicy};
use crate::usage::{OperationType, UsageRecorder};

mod paths {
    pub const EWAY_GENERATE: &str = "/ewayapi/genewaybill";
    pub const EWAY_CANCEL: &str = "/ewayapi/canewb";
    pub const EWAY_EXTEND: &str = "/ewayapi/extendvalidity";
    pub const EINVOICE_GENERATE: &str = "/irnapi/genirn";
    pub const EINVOICE_CANCEL: &str = "/irnapi/cancelirn";
    pub const EINVOICE_GET_IRN: &str = "/irnapi/getirn";
    pub const EINVOICE_GET_DETAILS: &str = "/irnapi/getdetails";
}

/// Breaker names, `{provider}:{operation}`.
pub mod breakers {
    pub const VAHAN_VEHICLE: &str = "vahan:validate_vehicle";
    pub const VAHAN_DL: &str = "vahan:validate_dl";
    pub const NIC_EWAY_GENERATE: &str = "nic:eway_generate";
    pub const WB_EWAY_GENERATE: &str = "whitebooks:eway_generate";
    pub const WB_EWAY_CANCEL: &str = "whitebooks:eway_cancel";
    pub const WB_EWAY_EXTEND: &str = "whitebooks:eway_extend";
    pub const WB_EINVOICE_GENERATE: &str = "whitebooks:einvoice_generate";
    pub const WB_EINVOICE_CANCEL: &str = "whitebooks:einvoice_cancel";
    pub const WB_EINVOICE_GET_IRN: &str = "whitebooks:einvoice_get_irn";
    pub const WB_EINVOICE_GET_DETAILS: &str = "whitebooks:einvoice_get_details";
}

/// The four provider clients.
pub struct ProviderClients {
    pub vahan: Arc<VahanClient>,
    pub nic_eway: Arc<NicEwayClient>,
    pub whitebooks_eway: Arc<WhitebooksClient>,
    pub whitebooks_einvoice: Arc<WhitebooksClient>,
}

impl ProviderClients {
    pub fn from_config(config: &ProvidersConfig, codec: Arc<dyn EnvelopeCodec>) -> GatewayResult<Self> {
        Ok(Self {
            vahan: Arc::new(VahanClient::new(config.vahan.clone(), codec.clone())?),
            nic_eway: Arc::new(NicEwayClient::new(config.nic_eway.clone(), codec)?),
            whitebooks_eway: Arc::new(WhitebooksClient::new(
                WhitebooksProduct::Eway,
                config.whitebooks_eway.clone(),
            )?),
            whitebooks_einvoice: Arc::new(WhitebooksClient::new(
                WhitebooksProduct::Einvoice,
                config.whitebooks_einvoice.clone(),
            )?),
        })
    }
}

/// Dispatcher switches.
#[derive(Debug, Clone, Default)]
pub struct DispatchSettings {
    pub breakers_enabled: bool,
    pub cross_provider_fallback: bool,
}

/// Normalized successful dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub provider: &'static str,
    pub data: Value,
}

/// Provider session validity, for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub provider: &'static str,
    pub valid: bool,
    pub handshakes: u64,
}

pub struct Dispatcher {
    clients: ProviderClients,
    breakers: Arc<CircuitBreakerRegistry>,
    retry: RetryPolicy,
    usage: Arc<dyn UsageRecorder>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        clients: ProviderClients,
        breakers: Arc<CircuitBreakerRegistry>,
        retry: RetryPolicy,
        usage: Arc<dyn UsageRecorder>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            clients,
            breakers,
            retry,
            usage,
            settings,
        }
    }

    pub fn session_status(&self) -> Vec<SessionStatus> {
        vec![
            SessionStatus {
                provider: vahan::PROVIDER,
                valid: self.clients.vahan.sessions().is_valid(),
                handshakes: self.clients.vahan.sessions().handshake_count(),
            },
            SessionStatus {
                provider: nic::PROVIDER,
                valid: self.clients.nic_eway.sessions().is_valid(),
                handshakes: self.clients.nic_eway.sessions().handshake_count(),
            },
            SessionStatus {
                provider: "WHITEBOOKS_EWAY",
                valid: self.clients.whitebooks_eway.sessions().is_valid(),
                handshakes: self.clients.whitebooks_eway.sessions().handshake_count(),
            },
            SessionStatus {
                provider: "WHITEBOOKS_EINVOICE",
                valid: self.clients.whitebooks_einvoice.sessions().is_valid(),
                handshakes: self.clients.whitebooks_einvoice.sessions().handshake_count(),
            },
        ]
    }

    async fn retrying<F, Fut>(&self, operation: OperationType, call: F) -> GatewayResult<Value>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<Value>>,
    {
        with_retry(&self.retry, operation.as_str(), call).await
    }

    /// Breaker around retries around one provider attempt.
    async fn guarded<F, Fut>(&self, breaker: &str, operation: OperationType, call: F) -> GatewayResult<Value>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<Value>>,
    {
        if !self.settings.breakers_enabled {
            return self.retrying(operation, call).await;
        }
        let breaker = self.breakers.get(breaker);
        breaker.execute(move || self.retrying(operation, call)).await
    }

    async fn finish(
        &self,
        tenant: Option<&str>,
        operation: OperationType,
        result: GatewayResult<(&'static str, Value)>,
    ) -> GatewayResult<DispatchOutcome> {
        let success = result.is_ok();
        metrics::record_provider_call(operation.as_str(), if success { "success" } else { "failure" });

        if let Some(tenant) = tenant {
            if let Err(e) = self.usage.record(tenant, operation, success).await {
                tracing::warn!(tenant, operation = %operation, error = %e, "Failed to record usage");
            }
        }

        match result {
            Ok((provider, data)) => {
                tracing::info!(operation = %operation, provider, "Provider call succeeded");
                Ok(DispatchOutcome { provider, data })
            }
            Err(error) => {
                tracing::warn!(operation = %operation, code = %error.code(), error = %error, "Provider call failed");
                Err(error)
            }
        }
    }

    pub async fn validate_vehicle(&self, tenant: Option<&str>, vehicle_number: &str) -> GatewayResult<DispatchOutcome> {
        let op = OperationType::VahanVehicle;
        let client = self.clients.vahan.as_ref();
        let result = self
            .guarded(breakers::VAHAN_VEHICLE, op, move || client.validate_vehicle(vehicle_number))
            .await
            .map(|data| (vahan::PROVIDER, data));
        self.finish(tenant, op, result).await
    }

    pub async fn validate_dl(
        &self,
        tenant: Option<&str>,
        dl_number: &str,
        dob: Option<&str>,
    ) -> GatewayResult<DispatchOutcome> {
        let op = OperationType::VahanDl;
        let client = self.clients.vahan.as_ref();
        let result = self
            .guarded(breakers::VAHAN_DL, op, move || client.validate_dl(dl_number, dob))
            .await
            .map(|data| (vahan::PROVIDER, data));
        self.finish(tenant, op, result).await
    }

    /// Issue an eWay Bill through NIC (`use_nic`) or Whitebooks.
    pub async fn generate_eway(&self, tenant: Option<&str>, eway: &Value, use_nic: bool) -> GatewayResult<DispatchOutcome> {
        let op = OperationType::EwayGenerate;
        let wb = self.clients.whitebooks_eway.as_ref();
        let wb_payload = normalize::whitebooks_eway_payload(eway);
        let wb_body = &wb_payload;
        let wb_call = move || wb.post(paths::EWAY_GENERATE, wb_body, &ResponseShape::WHITEBOOKS);

        if !use_nic {
            let result = self
                .guarded(breakers::WB_EWAY_GENERATE, op, wb_call)
                .await
                .map(|data| (whitebooks::PROVIDER, data));
            return self.finish(tenant, op, result).await;
        }

        let nic_client = self.clients.nic_eway.as_ref();
        let nic_payload = normalize::nic_eway_payload(eway);
        let nic_body = &nic_payload;
        let nic_call = move || nic_client.generate(nic_body);

        let result = if self.settings.cross_provider_fallback && self.settings.breakers_enabled {
            self.breakers
                .get(breakers::NIC_EWAY_GENERATE)
                .execute_with_fallback(
                    move || async move {
                        self.retrying(op, nic_call).await.map(|data| (nic::PROVIDER, data))
                    },
                    move || async move {
                        tracing::warn!("NIC unavailable, issuing eWay Bill through Whitebooks");
                        self.guarded(breakers::WB_EWAY_GENERATE, op, wb_call)
                            .await
                            .map(|data| (whitebooks::PROVIDER, data))
                    },
                )
                .await
        } else {
            self.guarded(breakers::NIC_EWAY_GENERATE, op, nic_call)
                .await
                .map(|data| (nic::PROVIDER, data))
        };
        self.finish(tenant, op, result).await
    }

    pub async fn cancel_eway(
        &self,
        tenant: Option<&str>,
        ewb_no: &Value,
        reason_code: &Value,
        remark: &str,
    ) -> GatewayResult<DispatchOutcome> {
        let op = OperationType::EwayCancel;
        let result = match normalize::eway_cancel_payload(ewb_no, reason_code, remark) {
            Ok(payload) => {
                let wb = self.clients.whitebooks_eway.as_ref();
                let body = &payload;
                self.guarded(breakers::WB_EWAY_CANCEL, op, move || {
                    wb.post(paths::EWAY_CANCEL, body, &ResponseShape::WHITEBOOKS)
                })
                .await
                .map(|data| (whitebooks::PROVIDER, data))
            }
            Err(e) => Err(e),
        };
        self.finish(tenant, op, result).await
    }

    pub async fn extend_eway(&self, tenant: Option<&str>, extension: &Value) -> GatewayResult<DispatchOutcome> {
        let op = OperationType::EwayExtend;
        let wb = self.clients.whitebooks_eway.as_ref();
        let result = self
            .guarded(breakers::WB_EWAY_EXTEND, op, move || {
                wb.post(paths::EWAY_EXTEND, extension, &ResponseShape::WHITEBOOKS_EXTEND)
            })
            .await
            .map(|data| (whitebooks::PROVIDER, data));
        self.finish(tenant, op, result).await
    }

    pub async fn generate_einvoice(&self, tenant: Option<&str>, invoice: &Value) -> GatewayResult<DispatchOutcome> {
        let op = OperationType::EinvoiceGenerate;
        let wb = self.clients.whitebooks_einvoice.as_ref();
        let result = self
            .guarded(breakers::WB_EINVOICE_GENERATE, op, move || {
                wb.post(paths::EINVOICE_GENERATE, invoice, &ResponseShape::WHITEBOOKS)
            })
            .await
            .map(|data| (whitebooks::PROVIDER, data));
        self.finish(tenant, op, result).await
    }

    pub async fn cancel_einvoice(
        &self,
        tenant: Option<&str>,
        irn: &str,
        reason: &Value,
        remarks: &str,
    ) -> GatewayResult<DispatchOutcome> {
        let op = OperationType::EinvoiceCancel;
        let wb = self.clients.whitebooks_einvoice.as_ref();
        let payload = normalize::einvoice_cancel_payload(irn, reason, remarks);
        let body = &payload;
        let result = self
            .guarded(breakers::WB_EINVOICE_CANCEL, op, move || {
                wb.post(paths::EINVOICE_CANCEL, body, &ResponseShape::WHITEBOOKS)
            })
            .await
            .map(|data| (whitebooks::PROVIDER, data));
        self.finish(tenant, op, result).await
    }

    pub async fn get_einvoice_by_irn(&self, tenant: Option<&str>, irn: &str) -> GatewayResult<DispatchOutcome> {
        let op = OperationType::EinvoiceGetIrn;
        let wb = self.clients.whitebooks_einvoice.as_ref();
        let query = [("irn", irn)];
        let query = &query;
        let result = self
            .guarded(breakers::WB_EINVOICE_GET_IRN, op, move || {
                wb.get(paths::EINVOICE_GET_IRN, query, &ResponseShape::WHITEBOOKS)
            })
            .await
            .map(|data| (whitebooks::PROVIDER, data));
        self.finish(tenant, op, result).await
    }

    pub async fn get_einvoice_details(
        &self,
        tenant: Option<&str>,
        doc_type: &str,
        doc_no: &str,
        doc_date: &str,
    ) -> GatewayResult<DispatchOutcome> {
        let op = OperationType::EinvoiceGetDetails;
        let wb = self.clients.whitebooks_einvoice.as_ref();
        let query = [("doctype", doc_type), ("docno", doc_no), ("docdate", doc_date)];
        let query = &query;
        let result = self
            .guarded(breakers::WB_EINVOICE_GET_DETAILS, op, move || {
                wb.get(paths::EINVOICE_GET_DETAILS, query, &ResponseShape::WHITEBOOKS)
            })
            .await
            .map(|data| (whitebooks::PROVIDER, data));
        self.finish(tenant, op, result).await
    }
}
