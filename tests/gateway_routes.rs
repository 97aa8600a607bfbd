//! Router-level tests against mock providers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use compliance_gateway::providers::{EnvelopeCodec, PlainEnvelope, SealedEnvelope};
use compliance_gateway::Gateway;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

use common::MockRequest;

fn gateway_request(method: &str, uri: &str, body: Option<Value>) -> axum::http::request::Builder {
    tenant_request(method, uri, "mine-7", body)
}

fn tenant_request(method: &str, uri: &str, mine_id: &str, body: Option<Value>) -> axum::http::request::Builder {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-dispatcher-id", "disp-1")
        .header("x-mine-id", mine_id)
        .header("x-org-id", "org-3");
    match body {
        Some(_) => builder.header("content-type", "application/json"),
        None => builder,
    }
}

fn build(builder: axum::http::request::Builder, body: Option<Value>) -> Request<Body> {
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    builder.body(body).unwrap()
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cached = response
        .headers()
        .get("x-idempotency-cached")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, cached, json)
}

type Recorded = Arc<Mutex<Vec<MockRequest>>>;

fn recorded(log: &Recorded, path: &str) -> Vec<MockRequest> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|r| r.path == path)
        .cloned()
        .collect()
}

fn eway(doc_no: &str, master: bool) -> Value {
    json!({
        "isMasterEway": master,
        "ewayData": {
            "supplyType": "O",
            "docType": "INV",
            "docNo": doc_no,
            "docDate": "01/10/2026",
            "fromGstin": "29AABCU9603R1ZJ",
            "fromTrdName": "Quarry Works",
            "toGstin": "27AAACR5055K1Z7",
            "toTrdName": "Builders Ltd",
            "vehicleNo": "KA01AB1234",
            "transporterId": "29AAATR1234A1Z5",
            "itemList": [{"hsnCode": 2517, "quantity": 30}]
        }
    })
}

const NIC_AUTH_OK: &str = r#"{"status":1,"data":{"AuthToken":"nic-token","TokenExpiry":"2099-12-31 23:59:59"}}"#;

fn opened_data(request: &MockRequest, field: &str) -> Value {
    let body: Value = serde_json::from_str(&request.body).unwrap();
    let data = STANDARD.decode(body[field].as_str().unwrap()).unwrap();
    serde_json::from_slice(&data).unwrap()
}

fn invoice() -> Value {
    json!({
        "invoiceData": {
            "DocDtls": {"Typ": "INV", "No": "INV-001", "Dt": "01/10/2026"},
            "SellerDtls": {"Gstin": "29AABCU9603R1ZJ"}
        }
    })
}

#[tokio::test]
async fn test_einvoice_generate_and_idempotent_replay() {
    let generate_calls = Arc::new(AtomicU32::new(0));
    let auth_calls = Arc::new(AtomicU32::new(0));
    let (gen, auth) = (generate_calls.clone(), auth_calls.clone());
    let addr = common::start_programmable_backend(move |request| {
        let (gen, auth) = (gen.clone(), auth.clone());
        async move {
            match request.path.as_str() {
                "/irnapi/v1.03/authenticate" => {
                    auth.fetch_add(1, Ordering::SeqCst);
                    (200, common::WHITEBOOKS_AUTH_OK.to_string())
                }
                "/irnapi/genirn" => {
                    gen.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(request.header("authorization"), Some("Bearer wb-token"));
                    assert!(request.query.contains("email=ops%40example.com"));
                    (200, r#"{"status_cd":"1","data":{"Irn":"IRN-1","AckNo":112010000001}}"#.to_string())
                }
                _ => (404, "{}".to_string()),
            }
        }
    })
    .await;

    let gateway = Gateway::from_config(common::config_for(addr)).unwrap();
    let app = gateway.router();

    let builder = gateway_request("POST", "/api/gateway/einvoice/generate", Some(invoice()))
        .header("x-idempotency-key", "inv-001");
    let (status, cached, body) = call(&app, build(builder, Some(invoice()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cached, None);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["provider"], json!("WHITEBOOKS"));
    assert_eq!(body["data"]["data"]["Irn"], json!("IRN-1"));

    let builder = gateway_request("POST", "/api/gateway/einvoice/generate", Some(invoice()))
        .header("x-idempotency-key", "inv-001");
    let (status, cached, replayed) = call(&app, build(builder, Some(invoice()))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cached.as_deref(), Some("true"));
    assert_eq!(replayed, body);

    assert_eq!(generate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(auth_calls.load(Ordering::SeqCst), 1);

    let usage = gateway.state().usage.query(Some("mine-7"), None, None);
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].count, 1);
    assert_eq!(usage[0].success, 1);
}

#[tokio::test]
async fn test_business_error_maps_to_422_with_code() {
    let addr = common::start_programmable_backend(|request| async move {
        match request.path.as_str() {
            "/irnapi/v1.03/authenticate" => (200, common::WHITEBOOKS_AUTH_OK.to_string()),
            _ => (
                200,
                r#"{"status_cd":"0","status_desc":"Failed","error":{"error_cd":"2150","message":"Duplicate IRN"}}"#
                    .to_string(),
            ),
        }
    })
    .await;

    let gateway = Gateway::from_config(common::config_for(addr)).unwrap();
    let app = gateway.router();

    let builder = gateway_request("POST", "/api/gateway/einvoice/generate", Some(invoice()));
    let (status, _, body) = call(&app, build(builder, Some(invoice()))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["errorCodes"], json!("2150"));
    assert_eq!(body["error_message"], json!("Duplicate IRN"));
    assert_eq!(body["provider"], json!("WHITEBOOKS"));

    let usage = gateway.state().usage.query(Some("mine-7"), None, None);
    assert_eq!(usage[0].failure, 1);
}

#[tokio::test]
async fn test_missing_identity_is_rejected() {
    let addr = common::start_programmable_backend(|_| async { (200, "{}".to_string()) }).await;
    let gateway = Gateway::from_config(common::config_for(addr)).unwrap();
    let app = gateway.router();

    let request = Request::builder()
        .method("POST")
        .uri("/api/gateway/vahan/validate-vehicle")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"vehicleNumber":"KA01AB1234"}"#))
        .unwrap();
    let (status, _, body) = call(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_missing_required_field_is_400() {
    let addr = common::start_programmable_backend(|_| async { (200, "{}".to_string()) }).await;
    let gateway = Gateway::from_config(common::config_for(addr)).unwrap();
    let app = gateway.router();

    let payload = json!({"cancelRsnCode": 2, "cancelRmrk": "duplicate"});
    let builder = gateway_request("POST", "/api/gateway/eway/cancel", Some(payload.clone()));
    let (status, _, body) = call(&app, build(builder, Some(payload))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCodes"], json!("INVALID_REQUEST"));
    assert_eq!(body["error_message"], json!("ewayBillNo is required"));

    let builder = gateway_request("GET", "/api/gateway/einvoice/details?docType=INV&docNo=1", None);
    let (status, _, body) = call(&app, build(builder, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_message"], json!("docDate is required"));
}

#[tokio::test]
async fn test_open_breaker_still_calls_provider() {
    let lookups = Arc::new(AtomicU32::new(0));
    let counter = lookups.clone();
    let addr = common::start_programmable_backend(move |request| {
        let counter = counter.clone();
        async move {
            match request.path.as_str() {
                "/irnapi/v1.03/authenticate" => (200, common::WHITEBOOKS_AUTH_OK.to_string()),
                _ => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (503, r#"{"message":"service unavailable"}"#.to_string())
                }
            }
        }
    })
    .await;

    let mut config = common::config_for(addr);
    config.retries.enabled = false;
    config.circuit_breaker.failure_threshold = 1;
    let gateway = Gateway::from_config(config).unwrap();
    let app = gateway.router();

    for _ in 0..2 {
        let builder = gateway_request("GET", "/api/gateway/einvoice/irn/IRN-9", None);
        let (status, _, _) = call(&app, build(builder, None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
    assert_eq!(lookups.load(Ordering::SeqCst), 2);

    let (status, _, health) = call(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], json!("UP"));
    assert_eq!(health["open_circuits"], json!(["whitebooks:einvoice_get_irn"]));
}

#[tokio::test]
async fn test_admin_requires_key_and_resets_breakers() {
    let addr = common::start_programmable_backend(|_| async { (503, "{}".to_string()) }).await;
    let mut config = common::config_for(addr);
    config.retries.enabled = false;
    config.circuit_breaker.failure_threshold = 1;
    let gateway = Gateway::from_config(config).unwrap();
    let admin = gateway.admin_router();

    let (status, _, _) = call(
        &admin,
        Request::builder().uri("/admin/status").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    gateway.state().breakers.get("nic:eway_generate").record_failure();

    let authed = |method: &str, uri: &str| {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", "Bearer test-admin-key")
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, breakers) = call(&admin, authed("GET", "/admin/circuit-breakers")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(breakers[0]["name"], json!("nic:eway_generate"));
    assert_eq!(breakers[0]["state"], json!("OPEN"));

    let (status, _, reset) = call(&admin, authed("POST", "/admin/circuit-breakers/nic:eway_generate/reset")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reset["state"], json!("CLOSED"));

    let (status, _, _) = call(&admin, authed("POST", "/admin/circuit-breakers/unknown/reset")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, stats) = call(&admin, authed("GET", "/admin/idempotency")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_entries"], json!(0));
}

#[tokio::test]
async fn test_same_key_from_two_tenants_issues_two_documents() {
    let generate_calls = Arc::new(AtomicU32::new(0));
    let gen = generate_calls.clone();
    let addr = common::start_programmable_backend(move |request| {
        let gen = gen.clone();
        async move {
            match request.path.as_str() {
                "/irnapi/v1.03/authenticate" => (200, common::WHITEBOOKS_AUTH_OK.to_string()),
                _ => {
                    let n = gen.fetch_add(1, Ordering::SeqCst) + 1;
                    (200, format!(r#"{{"status_cd":"1","data":{{"Irn":"IRN-{}"}}}}"#, n))
                }
            }
        }
    })
    .await;

    let gateway = Gateway::from_config(common::config_for(addr)).unwrap();
    let app = gateway.router();
    let send = |mine: &'static str| {
        let builder = tenant_request("POST", "/api/gateway/einvoice/generate", mine, Some(invoice()))
            .header("x-idempotency-key", "same-key");
        build(builder, Some(invoice()))
    };

    let (_, cached, first) = call(&app, send("mine-a")).await;
    assert_eq!(cached, None);
    assert_eq!(first["data"]["data"]["Irn"], json!("IRN-1"));

    let (status, cached, second) = call(&app, send("mine-b")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cached, None);
    assert_eq!(second["data"]["data"]["Irn"], json!("IRN-2"));

    let (_, cached, replay) = call(&app, send("mine-a")).await;
    assert_eq!(cached.as_deref(), Some("true"));
    assert_eq!(replay["data"]["data"]["Irn"], json!("IRN-1"));
    assert_eq!(generate_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_master_eway_goes_to_nic_and_others_to_whitebooks() {
    let log: Recorded = Arc::default();
    let sink = log.clone();
    let addr = common::start_programmable_backend(move |request| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(request.clone());
            match request.path.as_str() {
                "/authenticate" => (200, NIC_AUTH_OK.to_string()),
                "/genewaybill" => (200, r#"{"status":1,"data":{"ewayBillNo":331001234567}}"#.to_string()),
                "/ewaybillapi/v1.03/authenticate" => (200, common::WHITEBOOKS_AUTH_OK.to_string()),
                "/ewayapi/genewaybill" => (
                    200,
                    r#"{"status_cd":"1","data":{"ewayBillNo":331009876543}}"#.to_string(),
                ),
                _ => (404, "{}".to_string()),
            }
        }
    })
    .await;

    let gateway = Gateway::from_config(common::config_for(addr)).unwrap();
    let app = gateway.router();

    let master = eway("INV-77", true);
    let builder = gateway_request("POST", "/api/gateway/eway/generate", Some(master.clone()));
    let (status, _, body) = call(&app, build(builder, Some(master))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], json!("NIC"));
    assert_eq!(body["data"]["data"]["ewayBillNo"], json!(331001234567u64));

    let nic = recorded(&log, "/genewaybill");
    assert_eq!(nic.len(), 1);
    assert_eq!(nic[0].header("authtoken"), Some("nic-token"));
    assert_eq!(nic[0].header("sek"), Some(STANDARD.encode("sandbox").as_str()));
    let sealed = opened_data(&nic[0], "Data");
    assert_eq!(sealed["docNo"], json!("INV-77"));
    assert_eq!(sealed["transporterId"], json!("29AAATR1234A1Z5"));
    assert!(sealed["transDocDate"].is_string());
    assert!(opened_data(&recorded(&log, "/authenticate")[0], "Data")["UserName"].is_string());

    let plain = eway("INV-78", false);
    let builder = gateway_request("POST", "/api/gateway/eway/generate", Some(plain.clone()));
    let (status, _, body) = call(&app, build(builder, Some(plain))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], json!("WHITEBOOKS"));

    let wb = recorded(&log, "/ewayapi/genewaybill");
    assert_eq!(wb.len(), 1);
    assert_eq!(wb[0].header("authorization"), Some("Bearer wb-token"));
    let payload: Value = serde_json::from_str(&wb[0].body).unwrap();
    assert_eq!(payload["docNo"], json!("INV-78"));
    assert_eq!(payload["dispatchFromGSTIN"], json!("29AABCU9603R1ZJ"));
    assert_eq!(payload["shipToGSTIN"], json!("27AAACR5055K1Z7"));
    assert_eq!(payload["transDocDate"], json!("01/10/2026"));
    assert!(payload.get("transporterId").is_none());
    assert_eq!(recorded(&log, "/genewaybill").len(), 1);
}

#[tokio::test]
async fn test_nic_encoded_business_error_is_422() {
    let generate_calls = Arc::new(AtomicU32::new(0));
    let gen = generate_calls.clone();
    let addr = common::start_programmable_backend(move |request| {
        let gen = gen.clone();
        async move {
            match request.path.as_str() {
                "/authenticate" => (200, NIC_AUTH_OK.to_string()),
                _ => {
                    gen.fetch_add(1, Ordering::SeqCst);
                    let blob = STANDARD.encode(r#"{"errorCodes":"604","message":"Invalid from GSTIN"}"#);
                    (200, json!({"status": 0, "error": blob}).to_string())
                }
            }
        }
    })
    .await;

    let gateway = Gateway::from_config(common::config_for(addr)).unwrap();
    let app = gateway.router();

    let master = eway("INV-79", true);
    let builder = gateway_request("POST", "/api/gateway/eway/generate", Some(master.clone()));
    let (status, _, body) = call(&app, build(builder, Some(master))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["errorCodes"], json!("604"));
    assert_eq!(body["error_message"], json!("Invalid from GSTIN"));
    assert_eq!(body["provider"], json!("NIC"));
    assert_eq!(generate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_vahan_lookup_opens_sealed_reply() {
    let log: Recorded = Arc::default();
    let sink = log.clone();
    let addr = common::start_programmable_backend(move |request| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(request.clone());
            match request.path.as_str() {
                "/oauth/token" => (200, r#"{"access_token":"vahan-token","expires_in":3600}"#.to_string()),
                "/protean/vehicle-detailed-advanced" => {
                    let sealed = PlainEnvelope::new("sandbox")
                        .seal(br#"{"rcNumber":"KA01AB1234","rcStatus":"ACTIVE"}"#)
                        .unwrap();
                    let reply = json!({
                        "data": sealed.data,
                        "symmetricKey": sealed.symmetric_key,
                        "hash": sealed.hash,
                    });
                    (200, reply.to_string())
                }
                _ => (404, "{}".to_string()),
            }
        }
    })
    .await;

    let gateway = Gateway::from_config(common::config_for(addr)).unwrap();
    let app = gateway.router();

    let payload = json!({"vehicleNumber": "KA01AB1234"});
    let builder = gateway_request("POST", "/api/gateway/vahan/validate-vehicle", Some(payload.clone()));
    let (status, _, body) = call(&app, build(builder, Some(payload))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], json!("VAHAN"));
    assert_eq!(body["data"]["rcNumber"], json!("KA01AB1234"));
    assert_eq!(body["data"]["rcStatus"], json!("ACTIVE"));

    let lookups = recorded(&log, "/protean/vehicle-detailed-advanced");
    assert_eq!(lookups.len(), 1);
    assert_eq!(lookups[0].header("authorization"), Some("Bearer vahan-token"));
    let envelope: Value = serde_json::from_str(&lookups[0].body).unwrap();
    assert_eq!(envelope["version"], json!("1.0.0"));
    let opened = PlainEnvelope::new("sandbox")
        .open(&SealedEnvelope {
            data: envelope["data"].as_str().unwrap().to_string(),
            symmetric_key: envelope["symmetricKey"].as_str().unwrap().to_string(),
            hash: envelope["hash"].as_str().unwrap().to_string(),
        })
        .unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&opened).unwrap(), json!({"vehicleNumber": "KA01AB1234"}));
}

#[tokio::test]
async fn test_open_nic_breaker_falls_back_to_whitebooks() {
    let log: Recorded = Arc::default();
    let sink = log.clone();
    let addr = common::start_programmable_backend(move |request| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(request.clone());
            match request.path.as_str() {
                "/ewaybillapi/v1.03/authenticate" => (200, common::WHITEBOOKS_AUTH_OK.to_string()),
                "/ewayapi/genewaybill" => (
                    200,
                    r#"{"status_cd":"1","data":{"ewayBillNo":331005550001}}"#.to_string(),
                ),
                _ => (503, r#"{"message":"NIC down"}"#.to_string()),
            }
        }
    })
    .await;

    let mut config = common::config_for(addr);
    config.dispatch.cross_provider_fallback = true;
    config.circuit_breaker.failure_threshold = 1;
    let gateway = Gateway::from_config(config).unwrap();
    gateway.state().breakers.get("nic:eway_generate").record_failure();
    let app = gateway.router();

    let master = eway("INV-80", true);
    let builder = gateway_request("POST", "/api/gateway/eway/generate", Some(master.clone()));
    let (status, _, body) = call(&app, build(builder, Some(master))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provider"], json!("WHITEBOOKS"));
    assert_eq!(body["data"]["data"]["ewayBillNo"], json!(331005550001u64));

    assert!(recorded(&log, "/authenticate").is_empty());
    assert!(recorded(&log, "/genewaybill").is_empty());
    assert_eq!(recorded(&log, "/ewayapi/genewaybill").len(), 1);
}

#[tokio::test]
async fn test_provider_401_forces_fresh_handshake() {
    let auth_calls = Arc::new(AtomicU32::new(0));
    let lookups = Arc::new(AtomicU32::new(0));
    let (auth, seen) = (auth_calls.clone(), lookups.clone());
    let addr = common::start_programmable_backend(move |request| {
        let (auth, seen) = (auth.clone(), seen.clone());
        async move {
            if request.path == "/irnapi/v1.03/authenticate" {
                let n = auth.fetch_add(1, Ordering::SeqCst) + 1;
                let body = format!(r#"{{"status_cd":"1","data":{{"AuthToken":"wb-token-{}"}}}}"#, n);
                return (200, body);
            }
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                return (401, r#"{"message":"token expired"}"#.to_string());
            }
            assert_eq!(request.header("authorization"), Some("Bearer wb-token-2"));
            (200, r#"{"status_cd":"1","data":{"Irn":"IRN-5","Status":"ACT"}}"#.to_string())
        }
    })
    .await;

    let gateway = Gateway::from_config(common::config_for(addr)).unwrap();
    let app = gateway.router();

    let builder = gateway_request("GET", "/api/gateway/einvoice/irn/IRN-5", None);
    let (status, _, body) = call(&app, build(builder, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_message"], json!("upstream rejected request (HTTP 401): token expired"));
    assert_eq!(auth_calls.load(Ordering::SeqCst), 1);

    let builder = gateway_request("GET", "/api/gateway/einvoice/irn/IRN-5", None);
    let (status, _, body) = call(&app, build(builder, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"]["Irn"], json!("IRN-5"));
    assert_eq!(auth_calls.load(Ordering::SeqCst), 2);
    assert_eq!(lookups.load(Ordering::SeqCst), 2);
}
