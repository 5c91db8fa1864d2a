//! Mobile-money payment integration: the gateway trait, the Daraja adapter,
//! its OAuth token cache and the phone number rules it depends on.

pub mod error;
pub mod phone;
pub mod provider;
pub mod providers;
pub mod token;
pub mod types;

pub use error::{PaymentError, PaymentResult};
pub use provider::PaymentGateway;
pub use token::{TokenProvider, TokenProviderConfig};
