use rust_decimal_macros::dec;
use serde_json::json;
use std::collections::BTreeMap;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use adress_storefront::domain::value_objects::Language;
use adress_storefront::payment::maib::sign;
use adress_storefront::payment::{
    CallbackParams, GatewayError, GatewayStatus, MaibClient, MaibConfig, PaymentGateway, PaymentItem, PaymentRequest,
};

fn config(api_url: &str) -> MaibConfig {
    MaibConfig {
        api_url: api_url.to_string(),
        project_id: "proj-1".into(),
        project_secret: "secret".into(),
        signature_key: "sig-key".into(),
        callback_url: Some("https://shop.example.com/api/v1/payments/maib/callback".into()),
        ok_url: Some("https://shop.example.com/payment/return".into()),
        fail_url: None,
        currency: "MDL".into(),
    }
}

async fn token_endpoint(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/v1/generate-token"))
        .and(body_partial_json(json!({ "projectId": "proj-1", "projectSecret": "secret" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": { "accessToken": "tok-1", "expiresIn": 300 } })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn request() -> PaymentRequest {
    PaymentRequest {
        order_ref: "ref-1".into(),
        amount: dec!(165),
        description: "Comanda ref-1".into(),
        language: Language::Ro,
        client_name: "Ana Popescu".into(),
        email: "ana@example.com".into(),
        phone: None,
        client_ip: None,
        items: vec![PaymentItem { id: "G1".into(), name: "Gene".into(), price: dec!(75), quantity: 2 }],
    }
}

#[tokio::test]
async fn test_initiate_reuses_cached_token() {
    let server = MockServer::start().await;
    token_endpoint(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/pay"))
        .and(header("authorization", "Bearer tok-1"))
        .and(body_partial_json(json!({ "orderId": "ref-1", "currency": "MDL", "language": "ro", "clientIp": "127.0.0.1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": { "payId": "pay-9", "payUrl": "https://maib.example/pay-9" } })))
        .expect(2)
        .mount(&server)
        .await;

    let client = MaibClient::new(config(&server.uri()));
    let first = client.initiate(&request()).await.unwrap();
    let second = client.initiate(&request()).await.unwrap();

    assert_eq!(first.pay_id, "pay-9");
    assert_eq!(second.redirect_url, "https://maib.example/pay-9");
}

#[tokio::test]
async fn test_status_check_classifies_and_handles_unknown_payment() {
    let server = MockServer::start().await;
    token_endpoint(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/v1/pay-info/pay-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": { "status": "OK", "statusMessage": "Approved" } })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/pay-info/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = MaibClient::new(config(&server.uri()));
    let report = client.check_status("pay-9", None).await.unwrap();
    assert_eq!(report.status, GatewayStatus::Success);
    assert_eq!(report.message.as_deref(), Some("Approved"));
    assert_eq!(client.check_status("missing", None).await.unwrap().status, GatewayStatus::NotFound);
}

#[tokio::test]
async fn test_gateway_error_message_is_surfaced() {
    let server = MockServer::start().await;
    token_endpoint(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/pay"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "ok": false, "errors": [{ "errorMessage": "Invalid amount" }] })))
        .mount(&server)
        .await;

    let client = MaibClient::new(config(&server.uri()));
    match client.initiate(&request()).await {
        Err(GatewayError::Http { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid amount");
        }
        other => panic!("expected http error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_refund_sends_project_header() {
    let server = MockServer::start().await;
    token_endpoint(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/v1/refund"))
        .and(header("x-project-id", "proj-1"))
        .and(body_partial_json(json!({ "payId": "pay-9" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": { "status": "REVERSED" } })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MaibClient::new(config(&server.uri()));
    let report = client.refund("pay-9", Some(dec!(40))).await.unwrap();

    assert!(report.ok);
    assert_eq!(report.status.as_deref(), Some("REVERSED"));
    assert_eq!(report.amount, Some(dec!(40)));
}

#[tokio::test]
async fn test_unconfigured_client_never_calls_out() {
    let server = MockServer::start().await;
    let mut cfg = config(&server.uri());
    cfg.project_secret.clear();

    let client = MaibClient::new(cfg);
    assert!(matches!(client.check_status("pay-9", None).await, Err(GatewayError::NotConfigured)));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_callback_signature_verification() {
    let client = MaibClient::new(config("http://127.0.0.1:9"));
    let mut params = CallbackParams {
        pay_id: Some("pay-9".into()),
        order_id: Some("ref-1".into()),
        status: Some("OK".into()),
        ..CallbackParams::default()
    };
    let fields: BTreeMap<String, String> = params.signed_fields();
    params.signature = Some(sign(&fields, "sig-key"));
    assert_eq!(client.process_callback(&params).await.unwrap().status, GatewayStatus::Success);

    params.status = Some("FAILED".into());
    assert!(matches!(client.process_callback(&params).await, Err(GatewayError::InvalidSignature)));

    params.signature = None;
    assert!(matches!(client.process_callback(&params).await, Err(GatewayError::MissingSignature)));
}
