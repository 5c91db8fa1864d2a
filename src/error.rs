//! Unified error handling for the voucher payments backend
//!
//! Every failure that can reach an HTTP client is expressed as an [`AppError`]
//! with a status code, a stable error code and a user-facing message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable machine-readable codes the portal switches on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 400
    InvalidPhoneNumber,
    InvalidAmount,
    InvalidDuration,
    ValidationError,
    DuplicateTransaction,
    VoucherExpired,
    PaymentRejected,

    // 404
    TransactionNotFound,
    VoucherNotFound,

    // gateway
    AuthenticationError,
    TransportError,
    ExternalServiceTimeout,
    PaymentProviderError,

    DatabaseError,
}

/// Business rule violations
#[derive(Debug, Clone)]
pub enum DomainError {
    /// A transaction with this checkout id is already recorded
    DuplicateTransaction { checkout_request_id: String },
    TransactionNotFound { checkout_request_id: String },
    VoucherNotFound { code: String },
    /// Voucher was used and its access window has closed
    VoucherExpired { code: String },
    /// Gateway refused the push request
    PaymentRejected {
        message: String,
        provider_code: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
}

/// Failures talking to the payment gateway
#[derive(Debug, Clone)]
pub enum ExternalError {
    /// Credential exchange failed or the gateway refused our token
    Authentication { provider: String, message: String },
    /// Connection failure or timeout; the request may not have reached the gateway
    Transport {
        service: String,
        message: String,
        timed_out: bool,
    },
    /// Gateway answered with something we could not interpret
    Gateway {
        provider: String,
        message: String,
        is_retryable: bool,
    },
}

/// Rejected caller input
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidPhoneNumber { phone: String, reason: String },
    InvalidAmount { amount: String, reason: String },
    InvalidDuration { duration: String, reason: String },
    MissingField { field: String },
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateTransaction { .. } => 400,
                DomainError::TransactionNotFound { .. } => 404,
                DomainError::VoucherNotFound { .. } => 404,
                DomainError::VoucherExpired { .. } => 400,
                DomainError::PaymentRejected { .. } => 400,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::Authentication { .. } => 401,
                ExternalError::Transport { .. } => 500,
                ExternalError::Gateway { .. } => 500,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateTransaction { .. } => ErrorCode::DuplicateTransaction,
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::VoucherNotFound { .. } => ErrorCode::VoucherNotFound,
                DomainError::VoucherExpired { .. } => ErrorCode::VoucherExpired,
                DomainError::PaymentRejected { .. } => ErrorCode::PaymentRejected,
            },
            AppErrorKind::Infrastructure(InfrastructureError::Database { .. }) => {
                ErrorCode::DatabaseError
            }
            AppErrorKind::External(err) => match err {
                ExternalError::Authentication { .. } => ErrorCode::AuthenticationError,
                ExternalError::Transport {
                    timed_out: true, ..
                } => ErrorCode::ExternalServiceTimeout,
                ExternalError::Transport { .. } => ErrorCode::TransportError,
                ExternalError::Gateway { .. } => ErrorCode::PaymentProviderError,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidPhoneNumber { .. } => ErrorCode::InvalidPhoneNumber,
                ValidationError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
                ValidationError::InvalidDuration { .. } => ErrorCode::InvalidDuration,
                ValidationError::MissingField { .. } => ErrorCode::ValidationError,
            },
        }
    }

    /// Safe to show to the customer; never carries infrastructure detail.
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::DuplicateTransaction {
                    checkout_request_id,
                } => format!("Transaction '{}' already exists", checkout_request_id),
                DomainError::TransactionNotFound {
                    checkout_request_id,
                } => format!("Transaction '{}' not found", checkout_request_id),
                DomainError::VoucherNotFound { .. } => "Invalid receipt number".to_string(),
                DomainError::VoucherExpired { .. } => "Voucher has expired".to_string(),
                DomainError::PaymentRejected { message, .. } => message.clone(),
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::Authentication { provider, .. } => {
                    format!("Could not authenticate with payment provider ({})", provider)
                }
                ExternalError::Transport {
                    service,
                    timed_out: true,
                    ..
                } => format!("{} request timed out. Please try again", service),
                ExternalError::Transport { service, .. } => {
                    format!("{} is temporarily unreachable. Please try again", service)
                }
                ExternalError::Gateway {
                    provider,
                    is_retryable,
                    ..
                } => {
                    if *is_retryable {
                        format!(
                            "Payment provider ({}) is temporarily unavailable. Please try again",
                            provider
                        )
                    } else {
                        "Payment processing failed. Please contact support".to_string()
                    }
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidPhoneNumber { phone, reason } => {
                    format!("Invalid phone number '{}': {}", phone, reason)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidDuration { duration, reason } => {
                    format!("Invalid voucher duration '{}': {}", duration, reason)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(InfrastructureError::Database { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(err) => match err {
                ExternalError::Authentication { .. } => true,
                ExternalError::Transport { .. } => true,
                ExternalError::Gateway { is_retryable, .. } => *is_retryable,
            },
            AppErrorKind::Validation(_) => false,
        }
    }

    /// Detail for logs only; never sent to clients.
    pub fn internal_detail(&self) -> Option<String> {
        match &self.kind {
            AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. })
            | AppErrorKind::External(ExternalError::Authentication { message, .. })
            | AppErrorKind::External(ExternalError::Transport { message, .. })
            | AppErrorKind::External(ExternalError::Gateway { message, .. }) => {
                Some(message.clone())
            }
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// From<DatabaseError> lives in database/error.rs, From<PaymentError> in payments/error.rs

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_transaction_error() {
        let error = AppError::new(AppErrorKind::Domain(DomainError::DuplicateTransaction {
            checkout_request_id: "ws_CO_1".to_string(),
        }));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::DuplicateTransaction);
        assert!(error.user_message().contains("ws_CO_1"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_voucher_errors() {
        let missing = AppError::new(AppErrorKind::Domain(DomainError::VoucherNotFound {
            code: "ABC".to_string(),
        }));
        assert_eq!(missing.status_code(), 404);
        assert_eq!(missing.user_message(), "Invalid receipt number");

        let expired = AppError::new(AppErrorKind::Domain(DomainError::VoucherExpired {
            code: "ABC".to_string(),
        }));
        assert_eq!(expired.status_code(), 400);
        assert_eq!(expired.error_code(), ErrorCode::VoucherExpired);
    }

    #[test]
    fn test_transport_timeout_error() {
        let error = AppError::new(AppErrorKind::External(ExternalError::Transport {
            service: "mpesa".to_string(),
            message: "operation timed out".to_string(),
            timed_out: true,
        }));

        assert_eq!(error.status_code(), 500);
        assert_eq!(error.error_code(), ErrorCode::ExternalServiceTimeout);
        assert!(error.is_retryable());
        assert!(!error.user_message().contains("operation timed out"));
        assert_eq!(
            error.internal_detail().as_deref(),
            Some("operation timed out")
        );
    }

    #[test]
    fn test_database_error_hides_detail() {
        let error = AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Database {
                message: "relation \"vouchers\" does not exist".to_string(),
                is_retryable: false,
            },
        ));

        assert_eq!(error.status_code(), 500);
        assert!(!error.user_message().contains("vouchers"));
    }

    #[test]
    fn test_validation_error() {
        let error = AppError::new(AppErrorKind::Validation(ValidationError::InvalidAmount {
            amount: "-100".to_string(),
            reason: "Amount must be positive".to_string(),
        }));

        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::InvalidAmount);
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_error_codes_serialize_screaming_snake() {
        assert_eq!(
            serde_json::to_value(ErrorCode::ExternalServiceTimeout).unwrap(),
            "EXTERNAL_SERVICE_TIMEOUT"
        );
        assert_eq!(
            serde_json::to_value(ErrorCode::InvalidPhoneNumber).unwrap(),
            "INVALID_PHONE_NUMBER"
        );
    }
}
