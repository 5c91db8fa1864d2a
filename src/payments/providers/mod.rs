pub mod mpesa;

pub use mpesa::{DarajaCredentials, MpesaGateway};
