mod common;

use axum::{body::Body, http::Request, http::StatusCode};
use common::{config, TestApp, WEBHOOK_SECRET};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use terminal_pos_core::testing::{customer, reader};

fn signature_header(payload: &str, secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn reader_succeeded(customer_id: Option<&str>, email: &str) -> Value {
    let metadata = match customer_id {
        Some(id) => json!({ "customer_id": id }),
        None => json!({}),
    };
    json!({
        "id": "evt_1",
        "type": "terminal.reader.action_succeeded",
        "data": { "object": {
            "id": "tmr_123",
            "device_type": "bbpos_wisepos_e",
            "status": "online",
            "action": {
                "type": "collect_inputs",
                "status": "succeeded",
                "collect_inputs": {
                    "inputs": [{ "type": "email", "email": { "value": email } }],
                    "metadata": metadata
                }
            }
        }}
    })
}

async fn deliver(
    app: &TestApp,
    payload: &str,
    signature: Option<String>,
) -> common::TestResponse {
    let mut builder = Request::post("/webhook").header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }
    app.send(builder.body(Body::from(payload.to_string())).unwrap())
        .await
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn signed(payload: &str) -> String {
    signature_header(payload, WEBHOOK_SECRET, now())
}

#[tokio::test]
async fn signed_delivery_records_the_collected_email() {
    let app = TestApp::new();
    app.platform.add_customer(customer("cus_1", "Hanako", None));
    let payload = reader_succeeded(Some("cus_1"), "a@example.com").to_string();

    let response = deliver(&app, &payload, Some(signed(&payload))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["received"], true);
    assert_eq!(
        app.platform.customer("cus_1").unwrap().email.as_deref(),
        Some("a@example.com")
    );
}

#[tokio::test]
async fn collection_then_webhook_end_to_end() {
    let app = TestApp::new();
    app.platform.add_reader(reader("tmr_123"));
    app.platform.add_customer(customer("cus_1", "Hanako", None));

    app.post_json(
        "/api/terminal/tmr_123/collect_email",
        None,
        json!({ "customer_id": "cus_1" }),
    )
    .await;
    app.platform.enter_input("tmr_123", "a@example.com");
    let polled = app.get("/api/terminal/tmr_123/collected_data", None).await;
    assert_eq!(polled.status, StatusCode::OK);
    assert_eq!(app.platform.customer("cus_1").unwrap().email, None);

    let payload = reader_succeeded(Some("cus_1"), "a@example.com").to_string();
    deliver(&app, &payload, Some(signed(&payload))).await;
    assert_eq!(
        app.platform.customer("cus_1").unwrap().email.as_deref(),
        Some("a@example.com")
    );
}

#[tokio::test]
async fn event_without_customer_writes_nothing() {
    let app = TestApp::new();
    let payload = reader_succeeded(None, "a@example.com").to_string();

    let response = deliver(&app, &payload, Some(signed(&payload))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.platform.call_count("update_customer"), 0);
}

#[tokio::test]
async fn bad_signatures_are_rejected_without_side_effects() {
    let app = TestApp::new();
    app.platform.add_customer(customer("cus_1", "Hanako", None));
    let payload = reader_succeeded(Some("cus_1"), "a@example.com").to_string();

    let cases = [
        None,
        Some("garbage".to_string()),
        Some(signature_header(&payload, "whsec_other", now())),
        Some(signature_header("{}", WEBHOOK_SECRET, now())),
        Some(signature_header(&payload, WEBHOOK_SECRET, now() - 3600)),
    ];
    for signature in cases {
        let response = deliver(&app, &payload, signature).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body["error"].is_string());
    }
    assert!(app.platform.calls().is_empty());
    assert_eq!(app.platform.customer("cus_1").unwrap().email, None);
}

#[tokio::test]
async fn unreadable_payload_is_a_bad_request() {
    let app = TestApp::new();
    let payload = "not json";

    let response = deliver(&app, payload, Some(signed(payload))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_endpoint_secret_refuses_every_delivery() {
    let app = TestApp::with_config(config(&[("STRIPE_ENDPOINT_SECRET", "")]));
    let payload = reader_succeeded(Some("cus_1"), "a@example.com").to_string();

    let response = deliver(&app, &payload, Some(signed(&payload))).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(app.platform.calls().is_empty());
}

#[tokio::test]
async fn failed_customer_update_is_still_acknowledged() {
    let app = TestApp::new();
    let payload = reader_succeeded(Some("cus_gone"), "a@example.com").to_string();

    let response = deliver(&app, &payload, Some(signed(&payload))).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(app.platform.call_count("update_customer:cus_gone"), 1);
}

#[tokio::test]
async fn other_events_are_acknowledged() {
    let app = TestApp::new();
    for payload in [
        json!({
            "id": "evt_2",
            "type": "payment_method.attached",
            "data": { "object": { "id": "pm_1" } }
        }),
        json!({ "id": "evt_3", "type": "charge.succeeded", "data": { "object": {} } }),
    ] {
        let payload = payload.to_string();
        let response = deliver(&app, &payload, Some(signed(&payload))).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["received"], true);
    }
}
