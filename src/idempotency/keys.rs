//! Idempotency key derivation from canonical request fields.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Prefix marking derived keys.
pub const AUTO_PREFIX: &str = "auto:";

/// Derive a key for `route` from the JSON body, when the route has canonical fields.
pub fn derive_key(route: &str, body: &Value) -> Option<String> {
    let canonical = if route.ends_with("/eway/generate") {
        let data = body.get("ewayData").unwrap_or(body);
        join(&[
            field(data, "docNo")?,
            field(data, "fromGstin")?,
            field(data, "toGstin").unwrap_or_default(),
        ])
    } else if route.ends_with("/einvoice/generate") {
        let data = body.get("invoiceData").unwrap_or(body);
        join(&[
            field(data.get("DocDtls")?, "No")?,
            field(data.get("SellerDtls")?, "Gstin")?,
        ])
    } else if route.ends_with("/eway/cancel") {
        field(body, "ewayBillNo")?
    } else if route.ends_with("/einvoice/cancel") {
        field(body, "irn")?
    } else {
        return None;
    };
    Some(hash_key(&canonical))
}

/// `auto:` followed by the first 32 hex characters of SHA-256(`canonical`).
pub fn hash_key(canonical: &str) -> String {
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    format!("{}{}", AUTO_PREFIX, &digest[..32])
}

fn field(value: &Value, name: &str) -> Option<String> {
    match value.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn join(parts: &[String]) -> String {
    parts.join(":")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_eway_generate_key_is_stable() {
        let nested = json!({"ewayData": {"docNo": "INV-1", "fromGstin": "29AAA", "toGstin": "27BBB"}});
        let flat = json!({"docNo": "INV-1", "fromGstin": "29AAA", "toGstin": "27BBB", "extra": 1});

        let a = derive_key("/api/gateway/eway/generate", &nested).unwrap();
        let b = derive_key("/api/gateway/eway/generate", &flat).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, hash_key("INV-1:29AAA:27BBB"));
        assert!(a.starts_with(AUTO_PREFIX));
        assert_eq!(a.len(), AUTO_PREFIX.len() + 32);
    }

    #[test]
    fn test_einvoice_and_cancel_keys() {
        let invoice = json!({"invoiceData": {"DocDtls": {"No": "D1"}, "SellerDtls": {"Gstin": "29X"}}});
        assert_eq!(
            derive_key("/api/gateway/einvoice/generate", &invoice),
            Some(hash_key("D1:29X"))
        );
        assert_eq!(
            derive_key("/api/gateway/eway/cancel", &json!({"ewayBillNo": 331001234567u64})),
            Some(hash_key("331001234567"))
        );
        assert_eq!(
            derive_key("/api/gateway/einvoice/cancel", &json!({"irn": "abc"})),
            Some(hash_key("abc"))
        );
    }

    #[test]
    fn test_missing_fields_yield_no_key() {
        let partial = json!({"ewayData": {"docNo": "INV-1", "fromGstin": ""}});
        assert_eq!(derive_key("/api/gateway/eway/generate", &partial), None);
        assert_eq!(derive_key("/api/gateway/vahan/validate-vehicle", &json!({"vehicleNumber": "KA01"})), None);
    }

    #[test]
    fn test_eway_key_without_recipient_gstin() {
        let unregistered = json!({"ewayData": {"docNo": "INV-9", "fromGstin": "29AAA"}});
        assert_eq!(
            derive_key("/api/gateway/eway/generate", &unregistered),
            Some(hash_key("INV-9:29AAA:"))
        );
        let blank = json!({"docNo": "INV-9", "fromGstin": "29AAA", "toGstin": ""});
        assert_eq!(derive_key("/api/gateway/eway/generate", &blank), Some(hash_key("INV-9:29AAA:")));
    }
}
