use api_lib::adapters::StripeAdapter;
use secrecy::SecretString;
use serde_json::json;
use std::collections::HashMap;
use terminal_pos_core::domain::{
    ActionStatus, Address, CaptureMethod, CollectInputsRequest, CollectPrompt, NewLocation,
    NewPaymentIntent, NewPaymentLink, NewReader, ReaderFilter,
};
use terminal_pos_core::{PaymentPlatform, PortError};
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn adapter() -> (MockServer, StripeAdapter) {
    let server = MockServer::start().await;
    let adapter = StripeAdapter::new(
        server.uri(),
        SecretString::from("sk_test_123".to_string()),
    );
    (server, adapter)
}

fn reader_json(action: serde_json::Value) -> serde_json::Value {
    json!({
        "id": "tmr_123",
        "object": "terminal.reader",
        "label": "Front desk",
        "device_type": "bbpos_wisepos_e",
        "status": "online",
        "location": "tml_1",
        "serial_number": "WSC-1",
        "action": action
    })
}

fn intent_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "amount": 1500,
        "currency": "jpy",
        "status": status,
        "customer": "cus_1",
        "client_secret": format!("{id}_secret"),
        "payment_method": null,
        "latest_charge": null,
        "metadata": {},
        "created": 1700000000
    })
}

#[tokio::test]
async fn retrieve_reader_sends_the_bearer_key() {
    let (server, adapter) = adapter().await;
    Mock::given(method("GET"))
        .and(path("/terminal/readers/tmr_123"))
        .and(header("authorization", "Bearer sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reader_json(json!(null))))
        .expect(1)
        .mount(&server)
        .await;

    let reader = adapter.retrieve_reader("tmr_123").await.unwrap();
    assert_eq!(reader.id, "tmr_123");
    assert_eq!(reader.label.as_deref(), Some("Front desk"));
    assert!(reader.action.is_none());
}

#[tokio::test]
async fn collected_email_is_read_from_the_typed_field() {
    let (server, adapter) = adapter().await;
    let action = json!({
        "type": "collect_inputs",
        "status": "succeeded",
        "failure_message": null,
        "collect_inputs": {
            "inputs": [{
                "type": "email",
                "required": false,
                "skipped": false,
                "email": { "value": "a@example.com" }
            }],
            "metadata": { "customer_id": "cus_1" }
        }
    });
    Mock::given(method("GET"))
        .and(path("/terminal/readers/tmr_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reader_json(action)))
        .mount(&server)
        .await;

    let reader = adapter.retrieve_reader("tmr_123").await.unwrap();
    let action = reader.action.as_ref().unwrap();
    assert_eq!(action.status, ActionStatus::Succeeded);
    let collect = reader.collect_inputs().unwrap();
    assert_eq!(collect.value_of("email"), Some("a@example.com"));
    assert_eq!(collect.metadata.get("customer_id").map(String::as_str), Some("cus_1"));
}

#[tokio::test]
async fn collect_inputs_posts_the_prompt_form() {
    let (server, adapter) = adapter().await;
    let action = json!({
        "type": "collect_inputs",
        "status": "in_progress",
        "collect_inputs": {
            "inputs": [{ "type": "email" }],
            "metadata": { "customer_id": "cus_1" }
        }
    });
    Mock::given(method("POST"))
        .and(path("/terminal/readers/tmr_123/collect_inputs"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("inputs%5B0%5D%5Btype%5D=email"))
        .and(body_string_contains("inputs%5B0%5D%5Brequired%5D=false"))
        .and(body_string_contains("inputs%5B0%5D%5Bcustom_text%5D%5Bsubmit_button%5D=Submit"))
        .and(body_string_contains("metadata%5Bcustomer_id%5D=cus_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reader_json(action)))
        .expect(1)
        .mount(&server)
        .await;

    let request = CollectInputsRequest {
        input_type: "email".to_string(),
        required: false,
        prompt: CollectPrompt::default(),
        metadata: HashMap::from([("customer_id".to_string(), "cus_1".to_string())]),
    };
    let reader = adapter.collect_inputs("tmr_123", &request).await.unwrap();
    assert_eq!(reader.action.unwrap().status, ActionStatus::InProgress);
}

#[tokio::test]
async fn list_readers_passes_filters_as_query() {
    let (server, adapter) = adapter().await;
    Mock::given(method("GET"))
        .and(path("/terminal/readers"))
        .and(query_param("limit", "3"))
        .and(query_param("device_type", "bbpos_wisepos_e"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "object": "list", "data": [reader_json(json!(null))] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let filter = ReaderFilter {
        limit: Some(3),
        device_type: Some("bbpos_wisepos_e".to_string()),
        ..Default::default()
    };
    let readers = adapter.list_readers(&filter).await.unwrap();
    assert_eq!(readers.len(), 1);
}

#[tokio::test]
async fn not_found_maps_to_not_found() {
    let (server, adapter) = adapter().await;
    Mock::given(method("GET"))
        .and(path("/terminal/readers/tmr_missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "type": "invalid_request_error", "code": "resource_missing",
                       "message": "No such terminal.reader: 'tmr_missing'" }
        })))
        .mount(&server)
        .await;

    let err = adapter.retrieve_reader("tmr_missing").await.unwrap_err();
    match err {
        PortError::NotFound(message) => assert!(message.contains("tmr_missing")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn rejection_carries_status_and_message() {
    let (server, adapter) = adapter().await;
    Mock::given(method("POST"))
        .and(path("/terminal/readers/tmr_123/cancel_action"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "type": "invalid_request_error", "message": "Reader is currently busy" }
        })))
        .mount(&server)
        .await;

    let err = adapter.cancel_reader_action("tmr_123").await.unwrap_err();
    match err {
        PortError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Reader is currently busy");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn unreadable_error_body_still_reports_the_status() {
    let (server, adapter) = adapter().await;
    Mock::given(method("GET"))
        .and(path("/customers/cus_1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = adapter.retrieve_customer("cus_1").await.unwrap_err();
    assert!(matches!(err, PortError::Rejected { status: 503, .. }));
}

#[tokio::test]
async fn update_customer_email_posts_the_email() {
    let (server, adapter) = adapter().await;
    Mock::given(method("POST"))
        .and(path("/customers/cus_1"))
        .and(body_string_contains("email=a%40example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cus_1",
            "name": "Hanako",
            "email": "a@example.com",
            "phone": null,
            "created": 1700000000,
            "invoice_settings": { "default_payment_method": "pm_1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let customer = adapter
        .update_customer_email("cus_1", "a@example.com")
        .await
        .unwrap();
    assert_eq!(customer.email.as_deref(), Some("a@example.com"));
    assert_eq!(customer.default_payment_method.as_deref(), Some("pm_1"));
}

#[tokio::test]
async fn charge_search_queries_by_fingerprint() {
    let (server, adapter) = adapter().await;
    Mock::given(method("GET"))
        .and(path("/charges/search"))
        .and(query_param("query", "payment_method_details.card.fingerprint:'fp_1'"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "search_result",
            "data": [{
                "id": "ch_1",
                "amount": 1000,
                "currency": "jpy",
                "status": "succeeded",
                "customer": "cus_1",
                "payment_intent": "pi_1",
                "payment_method_details": { "type": "card_present",
                                            "card_present": { "fingerprint": "fp_1" } },
                "created": 1700000000
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let charges = adapter.search_charges_by_fingerprint("fp_1").await.unwrap();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].customer.as_deref(), Some("cus_1"));
    assert_eq!(charges[0].fingerprint.as_deref(), Some("fp_1"));
}

#[tokio::test]
async fn payment_intent_form_and_expansion() {
    let (server, adapter) = adapter().await;
    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .and(body_string_contains("payment_method_types%5B%5D=card_present"))
        .and(body_string_contains("amount=1500"))
        .and(body_string_contains("capture_method=automatic"))
        .and(body_string_contains("customer=cus_1"))
        .and(body_string_contains("expand%5B%5D=latest_charge"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(intent_json("pi_1", "requires_payment_method")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut request = NewPaymentIntent::new(1500, "jpy");
    request.customer = Some("cus_1".to_string());
    request.payment_method_types = vec!["card_present".to_string()];
    let intent = adapter.create_payment_intent(&request).await.unwrap();
    assert_eq!(intent.id, "pi_1");
    assert_eq!(intent.client_secret.as_deref(), Some("pi_1_secret"));
}

#[tokio::test]
async fn payment_link_creates_the_product_first() {
    let (server, adapter) = adapter().await;
    Mock::given(method("POST"))
        .and(path("/products"))
        .and(body_string_contains("default_price_data%5Bunit_amount%5D=3000"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "prod_1", "default_price": "price_1" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/payment_links"))
        .and(body_string_contains("line_items%5B0%5D%5Bprice%5D=price_1"))
        .and(body_string_contains("payment_intent_data%5Bmetadata%5D%5Border%5D=42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "plink_1", "url": "https://buy.stripe.com/x" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let link = adapter
        .create_payment_link(&NewPaymentLink {
            amount: 3000,
            currency: "jpy".to_string(),
            product_name: "Tshirt".to_string(),
            metadata: HashMap::from([("order".to_string(), "42".to_string())]),
        })
        .await
        .unwrap();
    assert_eq!(link.url, "https://buy.stripe.com/x");
}

#[tokio::test]
async fn payment_method_options_keep_their_bracketed_paths() {
    let (server, adapter) = adapter().await;
    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .and(body_string_contains("capture_method=manual"))
        .and(body_string_contains("payment_method_types%5B%5D=interac_present"))
        .and(body_string_contains(
            "payment_method_options%5Bcard_present%5D%5Brequest_extended_authorization%5D=true",
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(intent_json("pi_2", "requires_payment_method")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut request = NewPaymentIntent::new(1500, "cad");
    request.capture_method = CaptureMethod::Manual;
    request.payment_method_types = vec!["interac_present".to_string()];
    request.payment_method_options.insert(
        "[card_present][request_extended_authorization]".to_string(),
        "true".to_string(),
    );
    let intent = adapter.create_payment_intent(&request).await.unwrap();
    assert_eq!(intent.id, "pi_2");
}

#[tokio::test]
async fn register_reader_posts_the_registration_code() {
    let (server, adapter) = adapter().await;
    Mock::given(method("POST"))
        .and(path("/terminal/readers"))
        .and(body_string_contains("registration_code=simulated-wpe"))
        .and(body_string_contains("location=tml_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reader_json(json!(null))))
        .expect(1)
        .mount(&server)
        .await;

    let reader = adapter
        .register_reader(&NewReader {
            registration_code: "simulated-wpe".to_string(),
            label: None,
            location: Some("tml_1".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(reader.id, "tmr_123");
}

#[tokio::test]
async fn create_location_sends_the_address_fields() {
    let (server, adapter) = adapter().await;
    Mock::given(method("POST"))
        .and(path("/terminal/locations"))
        .and(body_string_contains("display_name=Umeda"))
        .and(body_string_contains("address%5Bline1%5D=1-1+Umeda"))
        .and(body_string_contains("address%5Bcountry%5D=JP"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "tml_9",
            "object": "terminal.location",
            "display_name": "Umeda",
            "address": { "line1": "1-1 Umeda", "city": null, "country": "JP" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let location = adapter
        .create_location(&NewLocation {
            display_name: "Umeda".to_string(),
            address: Address {
                line1: Some("1-1 Umeda".to_string()),
                country: Some("JP".to_string()),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(location.id, "tml_9");
    assert_eq!(location.address.country.as_deref(), Some("JP"));
}

#[tokio::test]
async fn list_locations_asks_for_a_full_page() {
    let (server, adapter) = adapter().await;
    Mock::given(method("GET"))
        .and(path("/terminal/locations"))
        .and(query_param("limit", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{ "id": "tml_1", "display_name": "Shibuya", "address": {} }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let locations = adapter.list_locations(100).await.unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].display_name, "Shibuya");
}

#[tokio::test]
async fn customer_lookup_by_email_takes_the_first_match() {
    let (server, adapter) = adapter().await;
    Mock::given(method("GET"))
        .and(path("/customers"))
        .and(query_param("email", "example@test.com"))
        .and(query_param("limit", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let found = adapter
        .find_customer_by_email("example@test.com")
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn attach_payment_method_expands_the_customer() {
    let (server, adapter) = adapter().await;
    Mock::given(method("POST"))
        .and(path("/payment_methods/pm_1/attach"))
        .and(body_string_contains("customer=cus_1"))
        .and(body_string_contains("expand%5B%5D=customer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pm_1",
            "type": "card_present",
            "customer": { "id": "cus_1", "object": "customer" },
            "card_present": { "brand": "visa", "last4": "0000", "fingerprint": "fp_1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pm = adapter.attach_payment_method("pm_1", "cus_1").await.unwrap();
    assert_eq!(pm.fingerprint(), Some("fp_1"));
}
