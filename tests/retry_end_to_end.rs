//! Retry executor against a real HTTP provider mock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use compliance_gateway::providers::Transport;
use compliance_gateway::resilience::{with_retry, RetryPolicy};
use compliance_gateway::GatewayError;
use serde_json::json;

mod common;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        ..RetryPolicy::default()
    }
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let addr = common::start_programmable_backend(move |_request| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                (503, r#"{"message":"maintenance"}"#.to_string())
            } else {
                (200, r#"{"status":"ok","id":"X1"}"#.to_string())
            }
        }
    })
    .await;

    let transport = Transport::new("MOCK", Duration::from_secs(5)).unwrap();
    let url = format!("http://{}/op", addr);
    let (transport, url) = (&transport, url.as_str());

    let reply = with_retry(&fast_policy(3), "mock_op", move || async move {
        transport.send(transport.client().post(url).json(&json!({}))).await
    })
    .await
    .unwrap();

    assert_eq!(reply.body, json!({"status": "ok", "id": "X1"}));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let addr = common::start_programmable_backend(move |_request| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (400, r#"{"message":"bad vehicle number"}"#.to_string())
        }
    })
    .await;

    let transport = Transport::new("MOCK", Duration::from_secs(5)).unwrap();
    let url = format!("http://{}/op", addr);
    let (transport, url) = (&transport, url.as_str());

    let err = with_retry(&fast_policy(3), "mock_op", move || async move {
        transport.send(transport.client().get(url)).await
    })
    .await
    .unwrap_err();

    match err {
        GatewayError::ClientRequest { status, message, .. } => {
            assert_eq!(status, 400);
            assert_eq!(message, "bad vehicle number");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhaustion_returns_last_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let addr = common::start_programmable_backend(move |_request| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            (502, String::new())
        }
    })
    .await;

    let transport = Transport::new("MOCK", Duration::from_secs(5)).unwrap();
    let url = format!("http://{}/op", addr);
    let (transport, url) = (&transport, url.as_str());

    let policy = RetryPolicy {
        retryable_status_codes: HashSet::from([502]),
        ..fast_policy(4)
    };
    let err = with_retry(&policy, "mock_op", move || async move {
        transport.send(transport.client().get(url)).await
    })
    .await
    .unwrap_err();

    assert_eq!(err.upstream_status(), Some(502));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
