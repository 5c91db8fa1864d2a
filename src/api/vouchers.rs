use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::payments::with_request_id;
use super::AppState;
use crate::error::AppError;
use crate::middleware::error::{get_request_id_from_headers, malformed_body_response};
use crate::models::{Voucher, VoucherState};

#[derive(Debug, Deserialize)]
pub struct RedeemVoucherRequest {
    #[serde(default)]
    pub receipt_number: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListVouchersQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct VoucherView {
    pub code: String,
    pub price: Decimal,
    pub duration_secs: i64,
    pub is_used: bool,
    pub state: VoucherState,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl VoucherView {
    fn new(voucher: Voucher, now: DateTime<Utc>) -> Self {
        Self {
            state: voucher.state(now),
            code: voucher.code,
            price: voucher.price,
            duration_secs: voucher.duration_secs,
            is_used: voucher.is_used,
            activated_at: voucher.activated_at,
            expires_at: voucher.expires_at,
            created_at: voucher.created_at,
        }
    }
}

/// POST /api/vouchers/redeem
pub async fn redeem_voucher(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<RedeemVoucherRequest>, JsonRejection>,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);

    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return malformed_body_response(rejection, request_id)
        }
    };

    let code = payload.receipt_number.or(payload.code).unwrap_or_default();
    match state.vouchers.redeem(&code).await {
        Ok(redemption) => {
            let message = if redemption.newly_activated {
                "Voucher activated"
            } else {
                "Voucher already active"
            };
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "message": message,
                    "expiry_time": redemption.expires_at.to_rfc3339(),
                })),
            )
                .into_response()
        }
        Err(e) => with_request_id(e, request_id).into_response(),
    }
}

/// GET /api/vouchers/{code}
pub async fn get_voucher(
    State(state): State<AppState>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let voucher = state
        .vouchers
        .get_voucher(&code)
        .await
        .map_err(|e| with_request_id(e, request_id))?;

    Ok(Json(json!({
        "status": "success",
        "voucher": VoucherView::new(voucher, state.vouchers.now()),
    })))
}

/// GET /api/vouchers
pub async fn list_vouchers(
    State(state): State<AppState>,
    Query(query): Query<ListVouchersQuery>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let now = state.vouchers.now();
    let vouchers: Vec<VoucherView> = state
        .vouchers
        .list_vouchers(query.limit)
        .await
        .map_err(|e| with_request_id(e, request_id))?
        .into_iter()
        .map(|v| VoucherView::new(v, now))
        .collect();

    Ok(Json(json!({
        "status": "success",
        "count": vouchers.len(),
        "vouchers": vouchers,
    })))
}
