use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::str::FromStr;

use super::AppState;
use crate::error::{AppError, AppErrorKind, AppResult, ValidationError};
use crate::middleware::error::{get_request_id_from_headers, malformed_body_response};
use crate::services::InitiatePayment;

/// Body of `POST /api/payments/initiate`. Numbers may arrive as JSON strings.
#[derive(Debug, Deserialize)]
pub struct InitiatePaymentApiRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub amount: Option<JsonValue>,
    #[serde(default)]
    pub voucher_data: Option<String>,
    #[serde(default)]
    pub voucher_duration: Option<JsonValue>,
}

fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::String(s) => Some(s.trim().to_string()),
        JsonValue::Null => None,
        other => Some(other.to_string()),
    }
}

fn parse_amount(value: Option<&JsonValue>) -> AppResult<Option<Decimal>> {
    let Some(text) = value.and_then(json_text) else {
        return Ok(None);
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(Some)
        .map_err(|_| {
            AppError::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
                amount: text.clone(),
                reason: "Amount must be a number".to_string(),
            }))
        })
}

fn parse_duration(value: Option<&JsonValue>) -> AppResult<Option<i64>> {
    let Some(text) = value.and_then(json_text) else {
        return Ok(None);
    };
    text.parse::<i64>().map(Some).map_err(|_| {
        AppError::new(AppErrorKind::Validation(ValidationError::InvalidDuration {
            duration: text.clone(),
            reason: "Duration must be a whole number of seconds".to_string(),
        }))
    })
}

impl InitiatePaymentApiRequest {
    fn into_command(self) -> AppResult<InitiatePayment> {
        Ok(InitiatePayment {
            phone_number: self.phone_number.unwrap_or_default(),
            amount: parse_amount(self.amount.as_ref())?,
            description: self.voucher_data,
            voucher_duration_secs: parse_duration(self.voucher_duration.as_ref())?,
        })
    }
}

/// POST /api/payments/initiate
pub async fn initiate_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<InitiatePaymentApiRequest>, JsonRejection>,
) -> Response {
    let request_id = get_request_id_from_headers(&headers);

    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return malformed_body_response(rejection, request_id)
        }
    };

    let result = match payload.into_command() {
        Ok(command) => state.initiator.initiate(command).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(stk_response) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "stk_response": stk_response,
            })),
        )
            .into_response(),
        Err(e) => with_request_id(e, request_id).into_response(),
    }
}

/// GET /api/payments/{checkout_request_id}
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>, AppError> {
    let request_id = get_request_id_from_headers(&headers);
    let transaction = state
        .initiator
        .transaction_status(&checkout_request_id)
        .await
        .map_err(|e| with_request_id(e, request_id))?;

    Ok(Json(json!({
        "status": "success",
        "transaction": transaction,
    })))
}

pub(crate) fn with_request_id(err: AppError, request_id: Option<String>) -> AppError {
    match request_id {
        Some(req_id) => err.with_request_id(req_id),
        None => err,
    }
}
