//! Gateway route handlers.
//!
//! Handlers only check that required identifiers are present, then hand the
//! payload to the dispatcher. Document schemas are the providers' concern.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::http::response::SuccessBody;
use crate::http::server::AppState;
use crate::security::TenantContext;

fn payload<T>(body: Result<Json<T>, JsonRejection>) -> GatewayResult<T> {
    body.map(|Json(inner)| inner)
        .map_err(|rejection| GatewayError::InvalidRequest(rejection.body_text()))
}

fn required<'a>(value: &'a Option<String>, field: &str) -> GatewayResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest(format!("{} is required", field)))
}

fn required_value<'a>(value: &'a Option<Value>, field: &str) -> GatewayResult<&'a Value> {
    match value {
        None | Some(Value::Null) => Err(GatewayError::InvalidRequest(format!("{} is required", field))),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(GatewayError::InvalidRequest(format!("{} is required", field)))
        }
        Some(v) => Ok(v),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleRequest {
    pub vehicle_number: Option<String>,
}

pub async fn validate_vehicle(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<VehicleRequest>, JsonRejection>,
) -> GatewayResult<SuccessBody> {
    let request = payload(body)?;
    let vehicle_number = required(&request.vehicle_number, "vehicleNumber")?;
    let outcome = state
        .dispatcher
        .validate_vehicle(Some(&tenant.mine_id), vehicle_number)
        .await?;
    Ok(SuccessBody::new("Vehicle validated successfully", outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrivingLicenceRequest {
    pub dl_number: Option<String>,
    pub dob: Option<String>,
}

pub async fn validate_dl(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<DrivingLicenceRequest>, JsonRejection>,
) -> GatewayResult<SuccessBody> {
    let request = payload(body)?;
    let dl_number = required(&request.dl_number, "dlNumber")?;
    let dob = request.dob.as_deref().filter(|d| !d.trim().is_empty());
    let outcome = state
        .dispatcher
        .validate_dl(Some(&tenant.mine_id), dl_number, dob)
        .await?;
    Ok(SuccessBody::new("Driving licence validated successfully", outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EwayGenerateRequest {
    pub eway_data: Option<Value>,
    #[serde(default)]
    pub is_master_eway: bool,
}

pub async fn generate_eway(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<EwayGenerateRequest>, JsonRejection>,
) -> GatewayResult<SuccessBody> {
    let request = payload(body)?;
    let eway = required_value(&request.eway_data, "ewayData")?;
    let outcome = state
        .dispatcher
        .generate_eway(Some(&tenant.mine_id), eway, request.is_master_eway)
        .await?;
    Ok(SuccessBody::new("eWay Bill generated successfully", outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EwayCancelRequest {
    pub eway_bill_no: Option<Value>,
    pub cancel_rsn_code: Option<Value>,
    pub cancel_rmrk: Option<String>,
}

pub async fn cancel_eway(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<EwayCancelRequest>, JsonRejection>,
) -> GatewayResult<SuccessBody> {
    let request = payload(body)?;
    let ewb_no = required_value(&request.eway_bill_no, "ewayBillNo")?;
    let reason = required_value(&request.cancel_rsn_code, "cancelRsnCode")?;
    let remark = request.cancel_rmrk.as_deref().unwrap_or_default();
    let outcome = state
        .dispatcher
        .cancel_eway(Some(&tenant.mine_id), ewb_no, reason, remark)
        .await?;
    Ok(SuccessBody::new("eWay Bill cancelled successfully", outcome))
}

pub async fn extend_eway(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<Value>, JsonRejection>,
) -> GatewayResult<SuccessBody> {
    let extension = payload(body)?;
    required_value(&extension.get("ewbNo").cloned(), "ewbNo")?;
    let outcome = state
        .dispatcher
        .extend_eway(Some(&tenant.mine_id), &extension)
        .await?;
    Ok(SuccessBody::new("eWay Bill validity extended successfully", outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EinvoiceGenerateRequest {
    pub invoice_data: Option<Value>,
}

pub async fn generate_einvoice(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<EinvoiceGenerateRequest>, JsonRejection>,
) -> GatewayResult<SuccessBody> {
    let request = payload(body)?;
    let invoice = required_value(&request.invoice_data, "invoiceData")?;
    let outcome = state
        .dispatcher
        .generate_einvoice(Some(&tenant.mine_id), invoice)
        .await?;
    Ok(SuccessBody::new("eInvoice generated successfully", outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EinvoiceCancelRequest {
    pub irn: Option<String>,
    pub cancel_reason: Option<Value>,
    pub cancel_remarks: Option<String>,
}

pub async fn cancel_einvoice(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    body: Result<Json<EinvoiceCancelRequest>, JsonRejection>,
) -> GatewayResult<SuccessBody> {
    let request = payload(body)?;
    let irn = required(&request.irn, "irn")?;
    let reason = required_value(&request.cancel_reason, "cancelReason")?;
    let remarks = request.cancel_remarks.as_deref().unwrap_or_default();
    let outcome = state
        .dispatcher
        .cancel_einvoice(Some(&tenant.mine_id), irn, reason, remarks)
        .await?;
    Ok(SuccessBody::new("eInvoice cancelled successfully", outcome))
}

pub async fn get_einvoice_by_irn(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Path(irn): Path<String>,
) -> GatewayResult<SuccessBody> {
    let irn = required(&Some(irn), "irn")?.to_string();
    let outcome = state
        .dispatcher
        .get_einvoice_by_irn(Some(&tenant.mine_id), &irn)
        .await?;
    Ok(SuccessBody::new("eInvoice retrieved successfully", outcome))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EinvoiceDetailsQuery {
    pub doc_type: Option<String>,
    pub doc_no: Option<String>,
    pub doc_date: Option<String>,
}

pub async fn get_einvoice_details(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<EinvoiceDetailsQuery>,
) -> GatewayResult<SuccessBody> {
    let doc_type = required(&query.doc_type, "docType")?;
    let doc_no = required(&query.doc_no, "docNo")?;
    let doc_date = required(&query.doc_date, "docDate")?;
    let outcome = state
        .dispatcher
        .get_einvoice_details(Some(&tenant.mine_id), doc_type, doc_no, doc_date)
        .await?;
    Ok(SuccessBody::new("eInvoice details retrieved successfully", outcome))
}
