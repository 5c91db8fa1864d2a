pub mod callback_reconciler;
pub mod payment_initiator;
pub mod voucher_service;

pub use callback_reconciler::{CallbackAck, CallbackReconciler};
pub use payment_initiator::{InitiatePayment, InitiatedPayment, PaymentInitiator};
pub use voucher_service::VoucherService;
