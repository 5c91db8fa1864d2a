pub mod transaction;
pub mod voucher;

pub use transaction::{
    NewTransaction, PaymentOutcome, PaymentTransaction, Resolution, TransactionStatus,
};
pub use voucher::{RedeemError, Redemption, Voucher, VoucherExpired, VoucherState};
