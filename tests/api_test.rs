mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::{ack, success_callback, Harness};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, request_id)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_raw(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_initiate_returns_gateway_ack() {
    let h = Harness::new();
    h.gateway.then(Ok(ack("ws_CO_API", "m-API")));

    let (status, body, request_id) = send(
        h.router(),
        post_json(
            "/api/payments/initiate",
            json!({
                "phone_number": "0712345678",
                "amount": "50",
                "voucher_data": "1 hour",
                "voucher_duration": 3600
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["stk_response"]["CheckoutRequestID"], "ws_CO_API");
    assert_eq!(body["stk_response"]["ResponseCode"], "0");
    assert!(request_id.is_some());

    let (status, body, _) = send(h.router(), get("/api/payments/ws_CO_API")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction"]["status"], "PENDING");
}

#[tokio::test]
async fn test_initiate_validation_errors() {
    let h = Harness::new();

    let (status, body, _) = send(
        h.router(),
        post_json(
            "/api/payments/initiate",
            json!({"phone_number": "0712345678", "voucher_data": "1 hour", "voucher_duration": 3600}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body, _) = send(
        h.router(),
        post_json(
            "/api/payments/initiate",
            json!({"phone_number": "999", "amount": 50, "voucher_data": "1 hour", "voucher_duration": 3600}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_PHONE_NUMBER");

    let (status, _, _) = send(
        h.router(),
        post_raw("/api/payments/initiate", b"{not json".to_vec()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.gateway.push_count(), 0);
}

#[tokio::test]
async fn test_gateway_timeout_is_server_error() {
    let h = Harness::new();
    h.gateway.then(Err(common::timeout_error()));

    let (status, body, _) = send(
        h.router(),
        post_json(
            "/api/payments/initiate",
            json!({"phone_number": "254712345678", "amount": 50, "voucher_data": "1 hour", "voucher_duration": 3600}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "EXTERNAL_SERVICE_TIMEOUT");
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn test_callback_always_answers_200() {
    let h = Harness::new();

    let (status, body, _) = send(h.router(), post_raw("/mpesa/callback", b"garbage".to_vec())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ResultCode"], 0);

    let (status, body, _) = send(
        h.router(),
        post_raw("/mpesa-callback", success_callback("ws_CO_9", "m-9", "RCPT9")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ResultCode": 0, "ResultDesc": "Accepted"}));

    h.store.set_unavailable(true);
    let (status, body, _) = send(
        h.router(),
        post_raw("/mpesa/callback", success_callback("ws_CO_10", "m-10", "RCPT10")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ResultCode"], 1);
}

#[tokio::test]
async fn test_redeem_flow_over_http() {
    let h = Harness::new();
    h.gateway.then(Ok(ack("ws_CO_R", "m-R")));
    h.initiator
        .initiate(voucherpay::services::InitiatePayment {
            phone_number: "0712345678".to_string(),
            amount: Some(rust_decimal_macros::dec!(50)),
            description: Some("1 hour".to_string()),
            voucher_duration_secs: Some(3600),
        })
        .await
        .unwrap();
    h.reconciler
        .apply_callback(&success_callback("ws_CO_R", "m-R", "ABC123"))
        .await;

    let (status, first, _) = send(
        h.router(),
        post_json("/api/vouchers/redeem", json!({"receipt_number": "ABC123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["message"], "Voucher activated");

    let (status, second, _) = send(
        h.router(),
        post_json("/api/vouchers/redeem", json!({"code": "ABC123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["message"], "Voucher already active");
    assert_eq!(first["expiry_time"], second["expiry_time"]);

    let (status, body, _) = send(h.router(), get("/api/vouchers/ABC123")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["voucher"]["state"], "ACTIVE");

    let (status, body, _) = send(h.router(), get("/api/vouchers?limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, body, _) = send(
        h.router(),
        post_json("/api/vouchers/redeem", json!({"receipt_number": "UNKNOWN"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "VOUCHER_NOT_FOUND");
    assert_eq!(body["message"], "Invalid receipt number");
}

#[tokio::test]
async fn test_health_reflects_store() {
    let h = Harness::new();

    let (status, body, _) = send(h.router(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "up");
    assert_eq!(body["store"]["backend"], "memory");

    h.store.set_unavailable(true);
    let (status, _, _) = send(h.router(), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
