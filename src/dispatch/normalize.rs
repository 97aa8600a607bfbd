//! Caller payload → provider payload normalization.

use serde_json::{json, Map, Value};

use crate::error::{GatewayError, GatewayResult};
use crate::providers::clock;

/// Fields passed through to both eWay issuers unchanged.
const EWAY_PASSTHROUGH: &[&str] = &[
    "supplyType",
    "subSupplyType",
    "docType",
    "docNo",
    "docDate",
    "fromGstin",
    "fromTrdName",
    "fromAddr1",
    "fromPlace",
    "fromPincode",
    "actFromStateCode",
    "fromStateCode",
    "toGstin",
    "toTrdName",
    "toAddr1",
    "toPlace",
    "toPincode",
    "actToStateCode",
    "toStateCode",
    "transactionType",
    "totalValue",
    "totInvValue",
    "vehicleNo",
    "itemList",
];

/// Optional fields and the default used when the caller omits them.
fn eway_defaults() -> [(&'static str, Value); 14] {
    [
        ("subSupplyDesc", json!("")),
        ("fromAddr2", json!("")),
        ("toAddr2", json!("")),
        ("cgstValue", json!(0)),
        ("sgstValue", json!(0)),
        ("igstValue", json!(0)),
        ("cessValue", json!(0)),
        ("cessNonAdvolValue", json!(0)),
        ("transporterName", json!("")),
        ("transDocNo", json!("")),
        ("transMode", json!("1")),
        ("transDistance", json!("0")),
        ("vehicleType", json!("R")),
        ("transporterId", json!("")),
    ]
}

/// Empty strings, zero, false and null count as absent.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

fn present<'a>(source: &'a Value, field: &str) -> Option<&'a Value> {
    source.get(field).filter(|v| !is_blank(v))
}

fn common_eway(source: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    for field in EWAY_PASSTHROUGH {
        out.insert((*field).to_string(), source.get(*field).cloned().unwrap_or(Value::Null));
    }
    for (field, default) in eway_defaults() {
        out.insert(field.to_string(), present(source, field).cloned().unwrap_or(default));
    }
    out
}

fn or_field(source: &Value, field: &str, fallback: &str) -> Value {
    present(source, field)
        .or_else(|| source.get(fallback))
        .cloned()
        .unwrap_or(Value::Null)
}

/// NIC payload: transporter id and a transport document date defaulting to today.
pub fn nic_eway_payload(source: &Value) -> Value {
    let mut out = common_eway(source);
    out.insert(
        "transDocDate".into(),
        present(source, "transDocDate")
            .cloned()
            .unwrap_or_else(|| Value::String(clock::today_dmy())),
    );
    Value::Object(out)
}

/// Whitebooks payload: dispatch-from and ship-to parties default to consignor
/// and consignee. No transporter id.
pub fn whitebooks_eway_payload(source: &Value) -> Value {
    let mut out = common_eway(source);
    out.remove("transporterId");
    out.insert("dispatchFromGSTIN".into(), or_field(source, "dispatchFromGSTIN", "fromGstin"));
    out.insert("dispatchFromTradeName".into(), or_field(source, "dispatchFromTradeName", "fromTrdName"));
    out.insert("shipToGSTIN".into(), or_field(source, "shipToGSTIN", "toGstin"));
    out.insert("shipToTradeName".into(), or_field(source, "shipToTradeName", "toTrdName"));
    out.insert("transDocDate".into(), or_field(source, "transDocDate", "docDate"));
    Value::Object(out)
}

/// Coerce a caller value to an integer, accepting numeric strings.
pub fn coerce_int(value: &Value, field: &str) -> GatewayResult<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| GatewayError::InvalidRequest(format!("{} must be a number", field)))
}

pub fn eway_cancel_payload(ewb_no: &Value, reason_code: &Value, remark: &str) -> GatewayResult<Value> {
    Ok(json!({
        "ewbNo": coerce_int(ewb_no, "ewayBillNo")?,
        "cancelRsnCode": coerce_int(reason_code, "cancelRsnCode")?,
        "cancelRmrk": remark,
    }))
}

pub fn einvoice_cancel_payload(irn: &str, reason: &Value, remarks: &str) -> Value {
    json!({
        "Irn": irn,
        "CnlRsn": reason,
        "CnlRem": remarks,
    })
}
