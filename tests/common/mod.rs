#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use voucherpay::api::{self, AppState};
use voucherpay::clock::{Clock, ManualClock};
use voucherpay::config::MpesaConfig;
use voucherpay::database::InMemoryPaymentStore;
use voucherpay::health::HealthChecker;
use voucherpay::payments::types::{PushRequest, StkPushAck};
use voucherpay::payments::{PaymentError, PaymentGateway, PaymentResult};
use voucherpay::services::{CallbackReconciler, PaymentInitiator, VoucherService};

// ---------------------------------------------------------------------------
// Scripted HTTP server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
    /// Advertise a longer body than is sent, then close the connection.
    pub truncated: bool,
}

impl ScriptedResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
            truncated: false,
        }
    }

    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body should be JSON")
    }
}

/// Answers one connection per scripted response, in order, then stops.
pub async fn spawn_scripted_server(
    responses: Vec<ScriptedResponse>,
) -> (String, Arc<Mutex<Vec<RecordedRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test listener");
    let addr = listener.local_addr().expect("failed to read listener addr");
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let log = recorded.clone();

    tokio::spawn(async move {
        let mut script: VecDeque<ScriptedResponse> = responses.into();
        while let Some(response) = script.pop_front() {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            let request = read_request(&mut socket).await;
            log.lock().unwrap().push(request);

            if !response.delay.is_zero() {
                tokio::time::sleep(response.delay).await;
            }

            let reason = match response.status {
                200 => "OK",
                400 => "Bad Request",
                401 => "Unauthorized",
                404 => "Not Found",
                _ => "Internal Server Error",
            };
            let raw = format!(
                "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response.status,
                reason,
                response.body.len() + if response.truncated { 64 } else { 0 },
                response.body
            );
            let _ = socket.write_all(raw.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}", addr), recorded)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> RecordedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body_end = (header_end + content_length).min(buf.len());
    RecordedRequest {
        request_line,
        headers,
        body: String::from_utf8_lossy(&buf[header_end..body_end]).to_string(),
    }
}

pub fn mpesa_config(base_url: &str) -> MpesaConfig {
    MpesaConfig {
        environment: "sandbox".to_string(),
        base_url_override: Some(base_url.to_string()),
        consumer_key: "consumer-key".to_string(),
        consumer_secret: "consumer-secret".to_string(),
        shortcode: "174379".to_string(),
        passkey: "test-passkey".to_string(),
        callback_url: "https://portal.example.com/mpesa/callback".to_string(),
        account_reference: "VoucherPurchase".to_string(),
        transaction_desc: "BuyVoucher".to_string(),
        auth_timeout: Duration::from_secs(5),
        stk_timeout: Duration::from_secs(5),
        auth_max_retries: 2,
        token_safety_margin: 60,
    }
}

// ---------------------------------------------------------------------------
// Mock gateway
// ---------------------------------------------------------------------------

/// Accepts every push with a fresh checkout id unless told otherwise.
pub struct MockGateway {
    pub pushes: Mutex<Vec<PushRequest>>,
    scripted: Mutex<VecDeque<PaymentResult<StkPushAck>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            pushes: Mutex::new(Vec::new()),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    pub fn then(&self, result: PaymentResult<StkPushAck>) {
        self.scripted.lock().unwrap().push_back(result);
    }

    pub fn push_count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }
}

pub fn ack(checkout_request_id: &str, merchant_request_id: &str) -> StkPushAck {
    StkPushAck {
        merchant_request_id: Some(merchant_request_id.to_string()),
        checkout_request_id: checkout_request_id.to_string(),
        response_code: "0".to_string(),
        response_description: Some("Success. Request accepted for processing".to_string()),
        customer_message: Some("Success. Request accepted for processing".to_string()),
    }
}

pub fn timeout_error() -> PaymentError {
    PaymentError::NetworkError {
        message: "operation timed out".to_string(),
        timed_out: true,
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn push_payment(&self, request: PushRequest) -> PaymentResult<StkPushAck> {
        let n = {
            let mut pushes = self.pushes.lock().unwrap();
            pushes.push(request);
            pushes.len()
        };
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ack(&format!("ws_CO_{}", n), &format!("m-{}", n))))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Wired-up services
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: InMemoryPaymentStore,
    pub gateway: Arc<MockGateway>,
    pub clock: ManualClock,
    pub initiator: Arc<PaymentInitiator>,
    pub reconciler: Arc<CallbackReconciler>,
    pub vouchers: Arc<VoucherService>,
}

/// Voucher duration ceiling used by the harness (30 days).
pub const MAX_DURATION_SECS: i64 = 30 * 24 * 3600;

impl Harness {
    pub fn new() -> Self {
        let store = InMemoryPaymentStore::new();
        let gateway = Arc::new(MockGateway::new());
        let clock = ManualClock::new(chrono::Utc::now());
        let shared_store = Arc::new(store.clone());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

        Self {
            initiator: Arc::new(PaymentInitiator::new(
                gateway.clone(),
                shared_store.clone(),
                shared_clock.clone(),
                MAX_DURATION_SECS,
            )),
            reconciler: Arc::new(CallbackReconciler::new(
                shared_store.clone(),
                shared_clock.clone(),
                3600,
            )),
            vouchers: Arc::new(VoucherService::new(shared_store, shared_clock, 100)),
            store,
            gateway,
            clock,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            initiator: self.initiator.clone(),
            reconciler: self.reconciler.clone(),
            vouchers: self.vouchers.clone(),
            health: HealthChecker::new(
                Arc::new(self.store.clone()),
                Arc::new(self.clock.clone()),
            ),
        }
    }

    pub fn router(&self) -> axum::Router {
        api::router(self.app_state())
    }
}

// ---------------------------------------------------------------------------
// Callback bodies
// ---------------------------------------------------------------------------

pub fn success_callback(checkout_request_id: &str, merchant_request_id: &str, receipt: &str) -> Vec<u8> {
    serde_json::json!({
        "Body": {"stkCallback": {
            "MerchantRequestID": merchant_request_id,
            "CheckoutRequestID": checkout_request_id,
            "ResultCode": 0,
            "ResultDesc": "The service request is processed successfully.",
            "CallbackMetadata": {"Item": [
                {"Name": "Amount", "Value": 50.00},
                {"Name": "MpesaReceiptNumber", "Value": receipt},
                {"Name": "TransactionDate", "Value": 20260301120000u64},
                {"Name": "PhoneNumber", "Value": 254712345678u64}
            ]}
        }}
    })
    .to_string()
    .into_bytes()
}

pub fn failure_callback(checkout_request_id: &str, merchant_request_id: &str, code: i64) -> Vec<u8> {
    serde_json::json!({
        "Body": {"stkCallback": {
            "MerchantRequestID": merchant_request_id,
            "CheckoutRequestID": checkout_request_id,
            "ResultCode": code,
            "ResultDesc": "Request cancelled by user"
        }}
    })
    .to_string()
    .into_bytes()
}
