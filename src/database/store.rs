//! Storage port for transactions and vouchers.
//!
//! Every mutating operation is atomic per key: callback application per
//! checkout id, redemption per voucher code.

use crate::database::error::DatabaseError;
use crate::models::{
    NewTransaction, PaymentOutcome, PaymentTransaction, Redemption, TransactionStatus, Voucher,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A parsed gateway callback ready to be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackUpdate {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
    pub outcome: PaymentOutcome,
    /// Metadata used to build an audit record when the checkout id is unknown.
    pub phone_number: Option<String>,
    pub amount: Option<Decimal>,
    /// Voucher duration when the transaction did not record one.
    pub default_duration_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackApplied {
    /// Stored merchant id differs from the callback's; nothing written.
    MerchantMismatch {
        stored: Option<String>,
        received: Option<String>,
    },
    /// Transaction was already SUCCESS or FAILED; nothing written.
    AlreadyFinal(TransactionStatus),
    Completed {
        receipt_number: String,
        voucher_created: bool,
        orphan: bool,
    },
    Failed {
        orphan: bool,
    },
    /// Callback written to the audit fields; transaction left PENDING.
    Recorded {
        orphan: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    NotFound,
    Redeemed(Redemption),
    Expired { expired_at: Option<DateTime<Utc>> },
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a PENDING transaction. A second insert with the same checkout id
    /// fails with a unique violation and leaves the first row untouched.
    async fn insert_pending(
        &self,
        transaction: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<PaymentTransaction, DatabaseError>;

    /// Look up (or create) the transaction, gate on its status, write the
    /// terminal state and insert-or-ignore the voucher, all as one unit.
    async fn apply_callback(
        &self,
        update: CallbackUpdate,
        now: DateTime<Utc>,
    ) -> Result<CallbackApplied, DatabaseError>;

    async fn redeem_voucher(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, DatabaseError>;

    async fn find_transaction(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError>;

    async fn find_voucher(&self, code: &str) -> Result<Option<Voucher>, DatabaseError>;

    /// Newest first.
    async fn list_vouchers(&self, limit: i64) -> Result<Vec<Voucher>, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;

    fn backend_name(&self) -> &'static str;
}

/// Voucher minted for a transaction that just reached SUCCESS.
pub(crate) fn voucher_for(
    transaction: &PaymentTransaction,
    receipt_number: &str,
    default_duration_secs: i64,
    now: DateTime<Utc>,
) -> Voucher {
    Voucher::new(
        receipt_number.to_string(),
        transaction.amount,
        transaction
            .voucher_duration_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(default_duration_secs),
        now,
    )
}
