use crate::clock::Clock;
use crate::database::store::PaymentStore;
use crate::error::{AppError, AppErrorKind, AppResult, DomainError, ValidationError};
use crate::logging::mask_phone_number;
use crate::models::{NewTransaction, PaymentTransaction};
use crate::payments::phone::normalize_phone_number;
use crate::payments::provider::PaymentGateway;
use crate::payments::types::PushRequest;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Caller input for a voucher purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiatePayment {
    pub phone_number: String,
    pub amount: Option<Decimal>,
    /// What is being bought, e.g. "1 hour"; sent to the gateway as the description.
    pub description: Option<String>,
    pub voucher_duration_secs: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitiatedPayment {
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: Option<String>,
}

struct ValidatedPayment {
    phone_number: String,
    amount: Decimal,
    description: String,
    voucher_duration_secs: i64,
}

const AMOUNT_SCALE: u32 = 2;

/// Largest amount `payment_transactions.amount NUMERIC(12, 2)` can hold.
fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, AMOUNT_SCALE)
}

fn validation(kind: ValidationError) -> AppError {
    AppError::new(AppErrorKind::Validation(kind))
}

fn invalid_amount(amount: Decimal, reason: &str) -> AppError {
    validation(ValidationError::InvalidAmount {
        amount: amount.to_string(),
        reason: reason.to_string(),
    })
}

fn validate(request: InitiatePayment, max_duration_secs: i64) -> AppResult<ValidatedPayment> {
    if request.phone_number.trim().is_empty() {
        return Err(validation(ValidationError::MissingField {
            field: "phone_number".to_string(),
        }));
    }
    let phone_number = normalize_phone_number(&request.phone_number)?;

    let amount = request.amount.ok_or_else(|| {
        validation(ValidationError::MissingField {
            field: "amount".to_string(),
        })
    })?;
    if amount <= Decimal::ZERO {
        return Err(invalid_amount(amount, "Amount must be positive"));
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(invalid_amount(
            amount,
            "Amount cannot have more than 2 decimal places",
        ));
    }
    if amount > max_amount() {
        return Err(invalid_amount(amount, "Amount exceeds the maximum allowed"));
    }

    let description = request
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| {
            validation(ValidationError::MissingField {
                field: "voucher_data".to_string(),
            })
        })?;

    let voucher_duration_secs = request.voucher_duration_secs.ok_or_else(|| {
        validation(ValidationError::MissingField {
            field: "voucher_duration".to_string(),
        })
    })?;
    if voucher_duration_secs <= 0 {
        return Err(validation(ValidationError::InvalidDuration {
            duration: voucher_duration_secs.to_string(),
            reason: "Duration must be a positive number of seconds".to_string(),
        }));
    }
    if voucher_duration_secs > max_duration_secs {
        return Err(validation(ValidationError::InvalidDuration {
            duration: voucher_duration_secs.to_string(),
            reason: format!("Duration cannot exceed {} seconds", max_duration_secs),
        }));
    }

    Ok(ValidatedPayment {
        phone_number,
        amount,
        description,
        voucher_duration_secs,
    })
}

/// Starts STK push payments and records them as PENDING.
pub struct PaymentInitiator {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStore>,
    clock: Arc<dyn Clock>,
    max_duration_secs: i64,
}

impl PaymentInitiator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentStore>,
        clock: Arc<dyn Clock>,
        max_duration_secs: i64,
    ) -> Self {
        Self {
            gateway,
            store,
            clock,
            max_duration_secs,
        }
    }

    pub async fn initiate(&self, request: InitiatePayment) -> AppResult<InitiatedPayment> {
        let payment = validate(request, self.max_duration_secs)?;

        info!(
            provider = self.gateway.name(),
            phone = %mask_phone_number(&payment.phone_number),
            amount = %payment.amount,
            duration_secs = payment.voucher_duration_secs,
            "Initiating payment"
        );

        // Nothing is persisted unless the gateway accepts the push.
        let ack = self
            .gateway
            .push_payment(PushRequest {
                phone_number: payment.phone_number.clone(),
                amount: payment.amount,
                description: payment.description.clone(),
            })
            .await?;

        let new_transaction = NewTransaction {
            checkout_request_id: ack.checkout_request_id.clone(),
            merchant_request_id: ack.merchant_request_id.clone(),
            phone_number: payment.phone_number,
            amount: payment.amount,
            description: Some(payment.description),
            voucher_duration_secs: Some(payment.voucher_duration_secs),
        };

        match self
            .store
            .insert_pending(new_transaction, self.clock.now())
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_unique_violation() => {
                warn!(
                    checkout_request_id = %ack.checkout_request_id,
                    "Gateway returned a checkout id that is already recorded"
                );
                return Err(AppError::new(AppErrorKind::Domain(
                    DomainError::DuplicateTransaction {
                        checkout_request_id: ack.checkout_request_id,
                    },
                )));
            }
            Err(e) => {
                error!(
                    provider = self.gateway.name(),
                    checkout_request_id = %ack.checkout_request_id,
                    error = %e,
                    "Failed to persist pending transaction"
                );
                return Err(AppError::from(e)
                    .with_context(format!("checkout_request_id={}", ack.checkout_request_id)));
            }
        }

        info!(
            checkout_request_id = %ack.checkout_request_id,
            "Payment pending confirmation"
        );

        Ok(InitiatedPayment {
            checkout_request_id: ack.checkout_request_id,
            merchant_request_id: ack.merchant_request_id,
            response_code: ack.response_code,
            response_description: ack.response_description,
            customer_message: ack.customer_message,
        })
    }

    pub async fn transaction_status(
        &self,
        checkout_request_id: &str,
    ) -> AppResult<PaymentTransaction> {
        self.store
            .find_transaction(checkout_request_id)
            .await?
            .ok_or_else(|| {
                AppError::new(AppErrorKind::Domain(DomainError::TransactionNotFound {
                    checkout_request_id: checkout_request_id.to_string(),
                }))
            })
    }
}
