//! Applies asynchronous STK callbacks exactly once.
//!
//! The gateway redelivers callbacks, possibly concurrently and out of order.
//! Whatever arrives, the answer is a well-formed ack: only a persistence
//! failure asks for redelivery.

use crate::clock::Clock;
use crate::database::store::{CallbackApplied, CallbackUpdate, PaymentStore};
use crate::models::PaymentOutcome;
use crate::payments::types::{
    item_as_decimal, item_as_string, CallbackAckBody, CallbackEnvelope, AMOUNT_ITEM, PHONE_ITEM,
    RECEIPT_ITEM,
};
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_FAILURE_DESC: &str = "Payment failed";
const MISSING_RECEIPT: &str = "successful callback without MpesaReceiptNumber";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAck {
    Accepted,
    /// Transaction was already terminal; nothing changed.
    Duplicate,
    /// Malformed or inconsistent callback; redelivery would not help.
    Rejected(String),
    /// Persistence failed and was rolled back; ask the gateway to resend.
    RetryLater(String),
}

impl CallbackAck {
    pub fn result_code(&self) -> i32 {
        match self {
            CallbackAck::RetryLater(_) => 1,
            _ => 0,
        }
    }

    pub fn to_body(&self) -> CallbackAckBody {
        let result_desc = match self {
            CallbackAck::Accepted => "Accepted".to_string(),
            CallbackAck::Duplicate => "Already processed".to_string(),
            CallbackAck::Rejected(reason) => format!("Rejected: {}", reason),
            CallbackAck::RetryLater(_) => "Temporary failure, please retry".to_string(),
        };
        CallbackAckBody {
            result_code: self.result_code(),
            result_desc,
        }
    }
}

pub struct CallbackReconciler {
    store: Arc<dyn PaymentStore>,
    clock: Arc<dyn Clock>,
    default_duration_secs: i64,
}

impl CallbackReconciler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        clock: Arc<dyn Clock>,
        default_duration_secs: i64,
    ) -> Self {
        Self {
            store,
            clock,
            default_duration_secs,
        }
    }

    pub async fn apply_callback(&self, body: &[u8]) -> CallbackAck {
        let update = match self.parse(body) {
            Ok(update) => update,
            Err(reason) => {
                warn!(reason = %reason, "Rejecting callback");
                return CallbackAck::Rejected(reason);
            }
        };

        let checkout_request_id = update.checkout_request_id.clone();
        match self.store.apply_callback(update, self.clock.now()).await {
            Ok(CallbackApplied::Completed {
                receipt_number,
                voucher_created,
                orphan,
            }) => {
                info!(
                    checkout_request_id = %checkout_request_id,
                    receipt_number = %receipt_number,
                    voucher_created,
                    orphan,
                    "Payment completed"
                );
                CallbackAck::Accepted
            }
            Ok(CallbackApplied::Failed { orphan }) => {
                info!(
                    checkout_request_id = %checkout_request_id,
                    orphan,
                    "Payment failed"
                );
                CallbackAck::Accepted
            }
            Ok(CallbackApplied::Recorded { orphan }) => {
                error!(
                    checkout_request_id = %checkout_request_id,
                    orphan,
                    "Successful callback carries no MpesaReceiptNumber; left PENDING for review"
                );
                CallbackAck::Rejected(MISSING_RECEIPT.to_string())
            }
            Ok(CallbackApplied::AlreadyFinal(status)) => {
                info!(
                    checkout_request_id = %checkout_request_id,
                    status = %status,
                    "Callback already applied"
                );
                CallbackAck::Duplicate
            }
            Ok(CallbackApplied::MerchantMismatch { stored, received }) => {
                warn!(
                    checkout_request_id = %checkout_request_id,
                    stored = ?stored,
                    received = ?received,
                    "MerchantRequestID mismatch"
                );
                CallbackAck::Rejected("MerchantRequestID mismatch".to_string())
            }
            Err(e) => {
                error!(
                    checkout_request_id = %checkout_request_id,
                    error = %e,
                    "Failed to apply callback, rolled back"
                );
                CallbackAck::RetryLater(e.to_string())
            }
        }
    }

    fn parse(&self, body: &[u8]) -> Result<CallbackUpdate, String> {
        let envelope: CallbackEnvelope =
            serde_json::from_slice(body).map_err(|e| format!("invalid JSON: {}", e))?;

        let callback = envelope
            .body
            .and_then(|body| body.stk_callback)
            .ok_or_else(|| "missing Body.stkCallback".to_string())?;

        let checkout_request_id = callback
            .checkout_request_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| "missing CheckoutRequestID".to_string())?
            .to_string();

        let result_code = callback
            .result_code()
            .ok_or_else(|| "missing ResultCode".to_string())?;

        let outcome = if result_code == 0 {
            match callback.metadata_item(RECEIPT_ITEM).and_then(item_as_string) {
                Some(receipt_number) => PaymentOutcome::Paid {
                    receipt_number,
                    result_desc: callback.result_desc.clone(),
                },
                None => PaymentOutcome::Unconfirmed {
                    result_code,
                    result_desc: format!(
                        "{}: {}",
                        MISSING_RECEIPT,
                        callback.result_desc.as_deref().unwrap_or("no description")
                    ),
                },
            }
        } else {
            PaymentOutcome::Declined {
                result_code,
                result_desc: callback
                    .result_desc
                    .clone()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_DESC.to_string()),
            }
        };

        Ok(CallbackUpdate {
            checkout_request_id,
            merchant_request_id: callback.merchant_request_id.clone(),
            outcome,
            phone_number: callback.metadata_item(PHONE_ITEM).and_then(item_as_string),
            amount: callback.metadata_item(AMOUNT_ITEM).and_then(item_as_decimal),
            default_duration_secs: self.default_duration_secs,
        })
    }
}
