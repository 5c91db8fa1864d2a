//! Network-access voucher: UNUSED -> ACTIVE -> EXPIRED, never backwards.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Voucher {
    pub code: String,
    pub price: Decimal,
    pub duration_secs: i64,
    pub is_used: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherState {
    Unused,
    Active,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// False when an active voucher was presented again (reconnect).
    pub newly_activated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("voucher '{code}' has expired")]
pub struct VoucherExpired {
    pub code: String,
    pub expired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedeemError {
    #[error(transparent)]
    Expired(#[from] VoucherExpired),
    /// The stored duration does not yield a representable expiry.
    #[error("voucher '{code}' has an unusable duration of {duration_secs}s")]
    InvalidDuration { code: String, duration_secs: i64 },
}

impl Voucher {
    pub fn new(code: String, price: Decimal, duration_secs: i64, now: DateTime<Utc>) -> Self {
        Self {
            code,
            price,
            duration_secs,
            is_used: false,
            activated_at: None,
            expires_at: None,
            created_at: now,
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> VoucherState {
        match (self.is_used, self.expires_at) {
            (false, _) => VoucherState::Unused,
            (true, Some(expires_at)) if now < expires_at => VoucherState::Active,
            (true, _) => VoucherState::Expired,
        }
    }

    pub fn redeem(&mut self, now: DateTime<Utc>) -> Result<Redemption, RedeemError> {
        match self.state(now) {
            VoucherState::Unused => {
                let expires_at = TimeDelta::try_seconds(self.duration_secs)
                    .filter(|window| *window > TimeDelta::zero())
                    .and_then(|window| now.checked_add_signed(window))
                    .ok_or_else(|| RedeemError::InvalidDuration {
                        code: self.code.clone(),
                        duration_secs: self.duration_secs,
                    })?;
                self.is_used = true;
                self.activated_at = Some(now);
                self.expires_at = Some(expires_at);
                Ok(Redemption {
                    code: self.code.clone(),
                    expires_at,
                    newly_activated: true,
                })
            }
            VoucherState::Active => Ok(Redemption {
                code: self.code.clone(),
                // state() only reports Active when expires_at is set
                expires_at: self.expires_at.unwrap_or(now),
                newly_activated: false,
            }),
            VoucherState::Expired => Err(VoucherExpired {
                code: self.code.clone(),
                expired_at: self.expires_at,
            }
            .into()),
        }
    }
}
