use crate::clock::Clock;
use crate::database::store::{PaymentStore, RedeemOutcome};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError, ValidationError};
use crate::models::{Redemption, Voucher};
use std::sync::Arc;
use tracing::info;

pub struct VoucherService {
    store: Arc<dyn PaymentStore>,
    clock: Arc<dyn Clock>,
    list_limit: i64,
}

impl VoucherService {
    pub fn new(store: Arc<dyn PaymentStore>, clock: Arc<dyn Clock>, list_limit: i64) -> Self {
        Self {
            store,
            clock,
            list_limit,
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Activate a voucher on first use; hand back the same expiry on reconnect.
    pub async fn redeem(&self, code: &str) -> AppResult<Redemption> {
        let code = require_code(code)?;

        match self.store.redeem_voucher(code, self.clock.now()).await? {
            RedeemOutcome::Redeemed(redemption) => {
                info!(
                    code = %redemption.code,
                    expires_at = %redemption.expires_at,
                    newly_activated = redemption.newly_activated,
                    "Voucher redeemed"
                );
                Ok(redemption)
            }
            RedeemOutcome::NotFound => Err(AppError::new(AppErrorKind::Domain(
                DomainError::VoucherNotFound {
                    code: code.to_string(),
                },
            ))),
            RedeemOutcome::Expired { expired_at } => {
                info!(code = %code, expired_at = ?expired_at, "Expired voucher presented");
                Err(AppError::new(AppErrorKind::Domain(
                    DomainError::VoucherExpired {
                        code: code.to_string(),
                    },
                )))
            }
        }
    }

    pub async fn get_voucher(&self, code: &str) -> AppResult<Voucher> {
        let code = require_code(code)?;
        self.store.find_voucher(code).await?.ok_or_else(|| {
            AppError::new(AppErrorKind::Domain(DomainError::VoucherNotFound {
                code: code.to_string(),
            }))
        })
    }

    /// Newest first, capped at the configured limit.
    pub async fn list_vouchers(&self, limit: Option<i64>) -> AppResult<Vec<Voucher>> {
        let limit = limit
            .filter(|l| *l > 0)
            .map_or(self.list_limit, |l| l.min(self.list_limit));
        Ok(self.store.list_vouchers(limit).await?)
    }
}

fn require_code(code: &str) -> AppResult<&str> {
    let code = code.trim();
    if code.is_empty() {
        return Err(AppError::new(AppErrorKind::Validation(
            ValidationError::MissingField {
                field: "receipt_number".to_string(),
            },
        )));
    }
    Ok(code)
}
