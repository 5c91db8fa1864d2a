pub mod callbacks;
pub mod payments;
pub mod vouchers;

use crate::health::HealthChecker;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::{CallbackReconciler, PaymentInitiator, VoucherService};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

/// Shared handler state; every service is cheap to clone behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub initiator: Arc<PaymentInitiator>,
    pub reconciler: Arc<CallbackReconciler>,
    pub vouchers: Arc<VoucherService>,
    pub health: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/payments/initiate", post(payments::initiate_payment))
        .route(
            "/api/payments/{checkout_request_id}",
            get(payments::get_transaction),
        )
        .route("/mpesa/callback", post(callbacks::mpesa_callback))
        .route("/mpesa-callback", post(callbacks::mpesa_callback))
        .route("/api/vouchers", get(vouchers::list_vouchers))
        .route("/api/vouchers/redeem", post(vouchers::redeem_voucher))
        .route("/api/vouchers/{code}", get(vouchers::get_voucher))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn root() -> &'static str {
    "Voucher payments API"
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.report().await;
    let code = if report.is_up() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}
