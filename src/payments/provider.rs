use crate::payments::error::PaymentResult;
use crate::payments::types::{PushRequest, StkPushAck};
use async_trait::async_trait;

/// Outbound side of a mobile-money gateway.
///
/// `push_payment` returns `Ok` only when the gateway accepted the push for
/// processing; the final outcome arrives later through the callback.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn push_payment(&self, request: PushRequest) -> PaymentResult<StkPushAck>;

    fn name(&self) -> &'static str;
}
