//! Payment transaction lifecycle.
//!
//! PENDING -> SUCCESS | FAILED, terminal thereafter. The state machine lives
//! here so the Postgres and in-memory stores apply callbacks identically.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TransactionStatus::Pending),
            "SUCCESS" => Ok(TransactionStatus::Success),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentTransaction {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub phone_number: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub voucher_duration_secs: Option<i64>,
    pub status: TransactionStatus,
    pub receipt_number: Option<String>,
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A transaction the gateway has just accepted for processing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub phone_number: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub voucher_duration_secs: Option<i64>,
}

impl NewTransaction {
    pub fn into_pending(self, now: DateTime<Utc>) -> PaymentTransaction {
        PaymentTransaction {
            checkout_request_id: self.checkout_request_id,
            merchant_request_id: self.merchant_request_id,
            phone_number: self.phone_number,
            amount: self.amount,
            description: self.description,
            voucher_duration_secs: self.voucher_duration_secs,
            status: TransactionStatus::Pending,
            receipt_number: None,
            result_code: None,
            result_desc: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Final result reported by the gateway callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid {
        receipt_number: String,
        result_desc: Option<String>,
    },
    Declined {
        result_code: i64,
        result_desc: String,
    },
    /// Reported as paid but unusable (no receipt); kept on the row for review.
    Unconfirmed {
        result_code: i64,
        result_desc: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Already SUCCESS or FAILED; nothing changed.
    AlreadyFinal(TransactionStatus),
    Completed { receipt_number: String },
    Failed,
    /// Callback noted on the row; status is still PENDING.
    Recorded,
}

impl PaymentTransaction {
    /// Audit record for a callback whose checkout id was never initiated here.
    pub fn orphan(
        checkout_request_id: &str,
        merchant_request_id: Option<String>,
        phone_number: Option<String>,
        amount: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Self {
        NewTransaction {
            checkout_request_id: checkout_request_id.to_string(),
            merchant_request_id,
            phone_number: phone_number.unwrap_or_default(),
            amount: amount.unwrap_or(Decimal::ZERO),
            description: None,
            voucher_duration_secs: None,
        }
        .into_pending(now)
    }

    /// Both sides must agree on the merchant id when both carry one.
    pub fn merchant_matches(&self, merchant_request_id: Option<&str>) -> bool {
        match (self.merchant_request_id.as_deref(), merchant_request_id) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => true,
        }
    }

    pub fn resolve(&mut self, outcome: &PaymentOutcome, now: DateTime<Utc>) -> Resolution {
        if self.status.is_terminal() {
            return Resolution::AlreadyFinal(self.status);
        }

        self.updated_at = now;
        match outcome {
            PaymentOutcome::Paid {
                receipt_number,
                result_desc,
            } => {
                self.status = TransactionStatus::Success;
                self.receipt_number = Some(receipt_number.clone());
                self.result_code = Some(0);
                self.result_desc = result_desc.clone();
                Resolution::Completed {
                    receipt_number: receipt_number.clone(),
                }
            }
            PaymentOutcome::Declined {
                result_code,
                result_desc,
            } => {
                self.status = TransactionStatus::Failed;
                self.result_code = Some(*result_code);
                self.result_desc = Some(result_desc.clone());
                Resolution::Failed
            }
            PaymentOutcome::Unconfirmed {
                result_code,
                result_desc,
            } => {
                self.result_code = Some(*result_code);
                self.result_desc = Some(result_desc.clone());
                Resolution::Recorded
            }
        }
    }
}
