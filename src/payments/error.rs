use thiserror::Error;

use crate::error::{AppError, AppErrorKind, DomainError, ExternalError};

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Failures from the credential exchange or the STK push call.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Authentication failed: {message}")]
    AuthenticationError { message: String },

    /// No usable HTTP answer: connect failure, reset or timeout.
    #[error("Network error: {message}")]
    NetworkError { message: String, timed_out: bool },

    /// The gateway understood the push and refused it.
    #[error("Payment request rejected: {message}")]
    PaymentRejectedError {
        message: String,
        provider_code: Option<String>,
    },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl PaymentError {
    pub fn network(err: &reqwest::Error) -> Self {
        PaymentError::NetworkError {
            message: format!("provider request failed: {}", err),
            timed_out: err.is_timeout(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::AuthenticationError { .. } | PaymentError::NetworkError { .. } => true,
            PaymentError::PaymentRejectedError { .. } => false,
            PaymentError::ProviderError { retryable, .. } => *retryable,
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let kind = match err {
            PaymentError::AuthenticationError { message } => {
                AppErrorKind::External(ExternalError::Authentication {
                    provider: "mpesa".to_string(),
                    message,
                })
            }
            PaymentError::NetworkError { message, timed_out } => {
                AppErrorKind::External(ExternalError::Transport {
                    service: "mpesa".to_string(),
                    message,
                    timed_out,
                })
            }
            PaymentError::PaymentRejectedError {
                message,
                provider_code,
            } => AppErrorKind::Domain(DomainError::PaymentRejected {
                message,
                provider_code,
            }),
            PaymentError::ProviderError {
                provider,
                message,
                retryable,
                ..
            } => AppErrorKind::External(ExternalError::Gateway {
                provider,
                message,
                is_retryable: retryable,
            }),
        };

        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn retryable_flags_are_set() {
        assert!(PaymentError::NetworkError {
            message: "timeout".to_string(),
            timed_out: true
        }
        .is_retryable());
        assert!(!PaymentError::PaymentRejectedError {
            message: "Invalid PhoneNumber".to_string(),
            provider_code: Some("400.002.02".to_string())
        }
        .is_retryable());
    }

    #[test]
    fn gateway_failures_map_to_app_errors() {
        let auth: AppError = PaymentError::AuthenticationError {
            message: "no token".to_string(),
        }
        .into();
        assert_eq!(auth.status_code(), 401);

        let timeout: AppError = PaymentError::NetworkError {
            message: "timeout".to_string(),
            timed_out: true,
        }
        .into();
        assert_eq!(timeout.status_code(), 500);
        assert_eq!(timeout.error_code(), ErrorCode::ExternalServiceTimeout);

        let rejected: AppError = PaymentError::PaymentRejectedError {
            message: "Bad Request - Invalid Amount".to_string(),
            provider_code: None,
        }
        .into();
        assert_eq!(rejected.status_code(), 400);
        assert_eq!(rejected.user_message(), "Bad Request - Invalid Amount");
    }
}
