use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::store::{
    voucher_for, CallbackApplied, CallbackUpdate, PaymentStore, RedeemOutcome,
};
use crate::models::{NewTransaction, PaymentTransaction, RedeemError, Resolution, Voucher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct MemoryState {
    transactions: HashMap<String, PaymentTransaction>,
    vouchers: HashMap<String, Voucher>,
}

/// Thread-safe in-memory store.
///
/// Both tables sit behind one `RwLock`, so every mutating operation holds the
/// write lock for its whole check-then-act sequence.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<MemoryState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the database connection dropped.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DatabaseError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DatabaseError::new(DatabaseErrorKind::Connection {
                message: "in-memory store marked unavailable".to_string(),
            }));
        }
        Ok(())
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    pub async fn voucher_count(&self) -> usize {
        self.state.read().await.vouchers.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_pending(
        &self,
        transaction: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<PaymentTransaction, DatabaseError> {
        self.check_available()?;
        let mut state = self.state.write().await;

        if state
            .transactions
            .contains_key(&transaction.checkout_request_id)
        {
            return Err(DatabaseError::new(DatabaseErrorKind::UniqueViolation {
                constraint: Some("payment_transactions_checkout_request_id_key".to_string()),
                message: format!(
                    "checkout_request_id '{}' already exists",
                    transaction.checkout_request_id
                ),
            }));
        }

        let record = transaction.into_pending(now);
        state
            .transactions
            .insert(record.checkout_request_id.clone(), record.clone());
        Ok(record)
    }

    async fn apply_callback(
        &self,
        update: CallbackUpdate,
        now: DateTime<Utc>,
    ) -> Result<CallbackApplied, DatabaseError> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let existing = state.transactions.get(&update.checkout_request_id).cloned();
        let orphan = existing.is_none();
        let mut record = match existing {
            Some(record) => {
                if !record.merchant_matches(update.merchant_request_id.as_deref()) {
                    return Ok(CallbackApplied::MerchantMismatch {
                        stored: record.merchant_request_id,
                        received: update.merchant_request_id,
                    });
                }
                record
            }
            None => PaymentTransaction::orphan(
                &update.checkout_request_id,
                update.merchant_request_id.clone(),
                update.phone_number.clone(),
                update.amount,
                now,
            ),
        };

        let applied = match record.resolve(&update.outcome, now) {
            Resolution::AlreadyFinal(status) => return Ok(CallbackApplied::AlreadyFinal(status)),
            Resolution::Completed { receipt_number } => {
                let voucher =
                    voucher_for(&record, &receipt_number, update.default_duration_secs, now);
                let voucher_created = !state.vouchers.contains_key(&voucher.code);
                if voucher_created {
                    state.vouchers.insert(voucher.code.clone(), voucher);
                }
                CallbackApplied::Completed {
                    receipt_number,
                    voucher_created,
                    orphan,
                }
            }
            Resolution::Failed => CallbackApplied::Failed { orphan },
            Resolution::Recorded => CallbackApplied::Recorded { orphan },
        };

        state
            .transactions
            .insert(record.checkout_request_id.clone(), record);
        Ok(applied)
    }

    async fn redeem_voucher(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, DatabaseError> {
        self.check_available()?;
        let mut state = self.state.write().await;

        let Some(voucher) = state.vouchers.get_mut(code) else {
            return Ok(RedeemOutcome::NotFound);
        };

        match voucher.redeem(now) {
            Ok(redemption) => Ok(RedeemOutcome::Redeemed(redemption)),
            Err(RedeemError::Expired(expired)) => Ok(RedeemOutcome::Expired {
                expired_at: expired.expired_at,
            }),
            Err(err @ RedeemError::InvalidDuration { .. }) => {
                Err(DatabaseError::new(DatabaseErrorKind::Decode {
                    message: err.to_string(),
                }))
            }
        }
    }

    async fn find_transaction(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.transactions.get(checkout_request_id).cloned())
    }

    async fn find_voucher(&self, code: &str) -> Result<Option<Voucher>, DatabaseError> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.vouchers.get(code).cloned())
    }

    async fn list_vouchers(&self, limit: i64) -> Result<Vec<Voucher>, DatabaseError> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut vouchers: Vec<Voucher> = state.vouchers.values().cloned().collect();
        vouchers.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.code.cmp(&b.code))
        });
        vouchers.truncate(limit.max(0) as usize);
        Ok(vouchers)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.check_available()
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
