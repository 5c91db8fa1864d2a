//! JSON error bodies.
//!
//! Every failed request leaves the service as
//! `{status:"error", error, message, request_id, timestamp, retryable}`.

use crate::error::{AppError, ErrorCode};
use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `"error"`; success bodies carry `"success"`
    pub status: String,
    pub error: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
    /// RFC 3339
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub retryable: bool,
}

impl ErrorResponse {
    fn build(error: ErrorCode, message: String, request_id: Option<String>, retryable: bool) -> Self {
        Self {
            status: "error".to_string(),
            error,
            message,
            request_id,
            timestamp: Utc::now().to_rfc3339(),
            details: None,
            retryable,
        }
    }

    pub fn from_app_error(error: &AppError) -> Self {
        Self::build(
            error.error_code(),
            error.user_message(),
            error.request_id.clone(),
            error.is_retryable(),
        )
    }

    /// Body that failed to deserialize before any handler logic ran.
    pub fn malformed_body(rejection: &JsonRejection, request_id: Option<String>) -> Self {
        let mut response = Self::build(
            ErrorCode::ValidationError,
            "Request body is not valid JSON for this endpoint".to_string(),
            request_id,
            false,
        );
        response.details = Some(serde_json::json!({ "reason": rejection.body_text() }));
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                error_code = ?self.error_code(),
                detail = ?self.internal_detail(),
                context = ?self.context,
                request_id = ?self.request_id,
                status = status.as_u16(),
                "Request failed"
            );
        } else {
            tracing::warn!(
                error_code = ?self.error_code(),
                message = %self.user_message(),
                request_id = ?self.request_id,
                status = status.as_u16(),
                "Request rejected"
            );
        }

        (status, Json(ErrorResponse::from_app_error(&self))).into_response()
    }
}

pub fn get_request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// 400 response for a request whose JSON body was rejected by the extractor.
pub fn malformed_body_response(rejection: JsonRejection, request_id: Option<String>) -> Response {
    tracing::warn!(
        reason = %rejection.body_text(),
        request_id = ?request_id,
        "Malformed request body"
    );
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::malformed_body(&rejection, request_id)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppErrorKind, DomainError, InfrastructureError, ValidationError};

    #[test]
    fn test_body_mirrors_app_error() {
        let err = AppError::new(AppErrorKind::Domain(DomainError::VoucherExpired {
            code: "QK12ABC".to_string(),
        }))
        .with_request_id("req_123");

        let body = ErrorResponse::from_app_error(&err);
        assert_eq!(body.status, "error");
        assert_eq!(body.error, ErrorCode::VoucherExpired);
        assert_eq!(body.request_id.as_deref(), Some("req_123"));
        assert_eq!(body.message, "Voucher has expired");
        assert!(!body.retryable);
    }

    #[test]
    fn test_validation_error_is_bad_request() {
        let err = AppError::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
            amount: "-100".to_string(),
            reason: "Amount must be positive".to_string(),
        }));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_database_detail_stays_out_of_body() {
        let err = AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Database {
            message: "connection reset by peer".to_string(),
            is_retryable: true,
        }));

        let body = ErrorResponse::from_app_error(&err);
        assert!(!body.message.contains("connection reset"));
        assert!(body.retryable);
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_request_id_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(get_request_id_from_headers(&headers), None);
        headers.insert(REQUEST_ID_HEADER, "abc".parse().unwrap());
        assert_eq!(get_request_id_from_headers(&headers).as_deref(), Some("abc"));
    }
}
