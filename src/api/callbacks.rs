use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use tracing::info;

use super::AppState;
use crate::payments::types::CallbackAckBody;

/// POST /mpesa/callback
///
/// Always answers 200; the `ResultCode` in the body tells the gateway
/// whether to redeliver.
pub async fn mpesa_callback(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<CallbackAckBody>) {
    info!(bytes = body.len(), "Received M-Pesa callback");
    let ack = state.reconciler.apply_callback(&body).await;
    (StatusCode::OK, Json(ack.to_body()))
}
