use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::store::{
    voucher_for, CallbackApplied, CallbackUpdate, PaymentStore, RedeemOutcome,
};
use crate::models::{
    NewTransaction, PaymentTransaction, RedeemError, Resolution, TransactionStatus, Voucher,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;

const TRANSACTION_COLUMNS: &str = "checkout_request_id, merchant_request_id, phone_number, \
     amount, description, voucher_duration_secs, status, receipt_number, result_code, \
     result_desc, created_at, updated_at";

const VOUCHER_COLUMNS: &str =
    "code, price, duration_secs, is_used, activated_at, expires_at, created_at";

#[derive(Debug, Clone, FromRow)]
struct TransactionRow {
    checkout_request_id: String,
    merchant_request_id: Option<String>,
    phone_number: String,
    amount: Decimal,
    description: Option<String>,
    voucher_duration_secs: Option<i64>,
    status: String,
    receipt_number: Option<String>,
    result_code: Option<i64>,
    result_desc: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for PaymentTransaction {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<TransactionStatus>()
            .map_err(|message| DatabaseError::new(DatabaseErrorKind::Decode { message }))?;

        Ok(PaymentTransaction {
            checkout_request_id: row.checkout_request_id,
            merchant_request_id: row.merchant_request_id,
            phone_number: row.phone_number,
            amount: row.amount,
            description: row.description,
            voucher_duration_secs: row.voucher_duration_secs,
            status,
            receipt_number: row.receipt_number,
            result_code: row.result_code,
            result_desc: row.result_desc,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct VoucherRow {
    code: String,
    price: Decimal,
    duration_secs: i64,
    is_used: bool,
    activated_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<VoucherRow> for Voucher {
    fn from(row: VoucherRow) -> Self {
        Voucher {
            code: row.code,
            price: row.price,
            duration_secs: row.duration_secs,
            is_used: row.is_used,
            activated_at: row.activated_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL-backed store.
///
/// Callback application and redemption each run in one database transaction
/// holding a `FOR UPDATE` lock on the affected row.
#[derive(Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_transaction(
        tx: &mut Transaction<'_, Postgres>,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE checkout_request_id = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        ))
        .bind(checkout_request_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    /// Insert the audit record for an unknown checkout id, or lock the row a
    /// concurrent callback inserted first.
    async fn lock_or_insert_orphan(
        tx: &mut Transaction<'_, Postgres>,
        orphan: &PaymentTransaction,
    ) -> Result<(PaymentTransaction, bool), DatabaseError> {
        let inserted = sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO payment_transactions
             (checkout_request_id, merchant_request_id, phone_number, amount, status,
              created_at, updated_at)
             VALUES ($1, $2, $3, $4, 'PENDING', $5, $5)
             ON CONFLICT (checkout_request_id) DO NOTHING
             RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(&orphan.checkout_request_id)
        .bind(&orphan.merchant_request_id)
        .bind(&orphan.phone_number)
        .bind(orphan.amount)
        .bind(orphan.created_at)
        .fetch_optional(&mut **tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match inserted {
            Some(row) => Ok((PaymentTransaction::try_from(row)?, true)),
            None => {
                let existing = Self::lock_transaction(tx, &orphan.checkout_request_id)
                    .await?
                    .ok_or_else(|| DatabaseError::new(DatabaseErrorKind::NotFound))?;
                Ok((existing, false))
            }
        }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_pending(
        &self,
        transaction: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<PaymentTransaction, DatabaseError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "INSERT INTO payment_transactions
             (checkout_request_id, merchant_request_id, phone_number, amount, description,
              voucher_duration_secs, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, 'PENDING', $7, $7)
             RETURNING {}",
            TRANSACTION_COLUMNS
        ))
        .bind(&transaction.checkout_request_id)
        .bind(&transaction.merchant_request_id)
        .bind(&transaction.phone_number)
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(transaction.voucher_duration_secs)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        PaymentTransaction::try_from(row)
    }

    async fn apply_callback(
        &self,
        update: CallbackUpdate,
        now: DateTime<Utc>,
    ) -> Result<CallbackApplied, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let (mut record, orphan) =
            match Self::lock_transaction(&mut tx, &update.checkout_request_id).await? {
                Some(record) => (record, false),
                None => {
                    let orphan = PaymentTransaction::orphan(
                        &update.checkout_request_id,
                        update.merchant_request_id.clone(),
                        update.phone_number.clone(),
                        update.amount,
                        now,
                    );
                    Self::lock_or_insert_orphan(&mut tx, &orphan).await?
                }
            };

        if !record.merchant_matches(update.merchant_request_id.as_deref()) {
            tx.commit().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(CallbackApplied::MerchantMismatch {
                stored: record.merchant_request_id,
                received: update.merchant_request_id,
            });
        }

        let resolution = record.resolve(&update.outcome, now);
        if let Resolution::AlreadyFinal(status) = resolution {
            tx.commit().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(CallbackApplied::AlreadyFinal(status));
        }

        sqlx::query(
            "UPDATE payment_transactions
             SET status = $2, receipt_number = $3, result_code = $4, result_desc = $5,
                 updated_at = $6
             WHERE checkout_request_id = $1",
        )
        .bind(&record.checkout_request_id)
        .bind(record.status.as_str())
        .bind(&record.receipt_number)
        .bind(record.result_code)
        .bind(&record.result_desc)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let applied = match resolution {
            Resolution::Completed { receipt_number } => {
                let voucher =
                    voucher_for(&record, &receipt_number, update.default_duration_secs, now);
                let result = sqlx::query(
                    "INSERT INTO vouchers (code, price, duration_secs, is_used, created_at)
                     VALUES ($1, $2, $3, FALSE, $4)
                     ON CONFLICT (code) DO NOTHING",
                )
                .bind(&voucher.code)
                .bind(voucher.price)
                .bind(voucher.duration_secs)
                .bind(voucher.created_at)
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;

                CallbackApplied::Completed {
                    receipt_number,
                    voucher_created: result.rows_affected() == 1,
                    orphan,
                }
            }
            Resolution::Failed => CallbackApplied::Failed { orphan },
            Resolution::Recorded => CallbackApplied::Recorded { orphan },
            Resolution::AlreadyFinal(status) => CallbackApplied::AlreadyFinal(status),
        };

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        debug!(
            checkout_request_id = %update.checkout_request_id,
            "Callback committed"
        );
        Ok(applied)
    }

    async fn redeem_voucher(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<RedeemOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let row = sqlx::query_as::<_, VoucherRow>(&format!(
            "SELECT {} FROM vouchers WHERE code = $1 FOR UPDATE",
            VOUCHER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(RedeemOutcome::NotFound);
        };

        let mut voucher = Voucher::from(row);
        let outcome = match voucher.redeem(now) {
            Ok(redemption) => {
                if redemption.newly_activated {
                    sqlx::query(
                        "UPDATE vouchers
                         SET is_used = TRUE, activated_at = $2, expires_at = $3
                         WHERE code = $1",
                    )
                    .bind(code)
                    .bind(voucher.activated_at)
                    .bind(voucher.expires_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(DatabaseError::from_sqlx)?;
                }
                RedeemOutcome::Redeemed(redemption)
            }
            Err(RedeemError::Expired(expired)) => RedeemOutcome::Expired {
                expired_at: expired.expired_at,
            },
            Err(err @ RedeemError::InvalidDuration { .. }) => {
                tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
                return Err(DatabaseError::new(DatabaseErrorKind::Decode {
                    message: err.to_string(),
                }));
            }
        };

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(outcome)
    }

    async fn find_transaction(
        &self,
        checkout_request_id: &str,
    ) -> Result<Option<PaymentTransaction>, DatabaseError> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM payment_transactions WHERE checkout_request_id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        row.map(PaymentTransaction::try_from).transpose()
    }

    async fn find_voucher(&self, code: &str) -> Result<Option<Voucher>, DatabaseError> {
        let row = sqlx::query_as::<_, VoucherRow>(&format!(
            "SELECT {} FROM vouchers WHERE code = $1",
            VOUCHER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(row.map(Voucher::from))
    }

    async fn list_vouchers(&self, limit: i64) -> Result<Vec<Voucher>, DatabaseError> {
        let rows = sqlx::query_as::<_, VoucherRow>(&format!(
            "SELECT {} FROM vouchers ORDER BY created_at DESC, code ASC LIMIT $1",
            VOUCHER_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(rows.into_iter().map(Voucher::from).collect())
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        super::ping(&self.pool).await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
