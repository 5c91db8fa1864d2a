use crate::clock::Clock;
use crate::config::MpesaConfig;
use crate::logging::mask_phone_number;
use crate::middleware::logging::log_external_call;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::token::{CredentialExchange, TokenProvider};
use crate::payments::types::{
    AuthResponse, PushRequest, StkPushAck, StkPushRequest, StkPushResponse,
    TRANSACTION_TYPE_PAYBILL,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const PROVIDER_NAME: &str = "mpesa";

/// Daraja timestamps are wall-clock time in East Africa Time (UTC+3).
const EAT_OFFSET_HOURS: i64 = 3;

pub fn stk_timestamp(now: DateTime<Utc>) -> String {
    (now + Duration::hours(EAT_OFFSET_HOURS))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// One-time STK password: `base64(shortcode + passkey + timestamp)`.
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    BASE64_STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

fn build_client(timeout: std::time::Duration) -> PaymentResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PaymentError::NetworkError {
            message: format!("failed to initialize HTTP client: {}", e),
            timed_out: false,
        })
}

/// OAuth client-credentials exchange against `/oauth/v1/generate`.
pub struct DarajaCredentials {
    http: Client,
    auth_url: String,
    consumer_key: String,
    consumer_secret: String,
}

impl DarajaCredentials {
    pub fn new(config: &MpesaConfig) -> PaymentResult<Self> {
        Ok(Self {
            http: build_client(config.auth_timeout)?,
            auth_url: config.auth_url(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
        })
    }

    fn basic_auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.consumer_key, self.consumer_secret);
        format!("Basic {}", BASE64_STANDARD.encode(credentials))
    }
}

#[async_trait]
impl CredentialExchange for DarajaCredentials {
    async fn exchange(&self) -> PaymentResult<AuthResponse> {
        let request = self
            .http
            .get(&self.auth_url)
            .header(reqwest::header::AUTHORIZATION, self.basic_auth_header());
        let response = log_external_call(PROVIDER_NAME, "oauth", request.send())
            .await
            .map_err(|e| PaymentError::network(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::network(&e))?;

        if status.is_server_error() {
            // Treated as transport trouble so the token provider retries it.
            return Err(PaymentError::NetworkError {
                message: format!("HTTP {}: {}", status, text),
                timed_out: false,
            });
        }
        if !status.is_success() {
            return Err(PaymentError::AuthenticationError {
                message: format!("HTTP {}: {}", status, text),
            });
        }

        serde_json::from_str::<AuthResponse>(&text).map_err(|e| {
            PaymentError::AuthenticationError {
                message: format!("invalid credential response: {}", e),
            }
        })
    }
}

/// STK push adapter for the Daraja API.
pub struct MpesaGateway {
    http: Client,
    config: MpesaConfig,
    tokens: Arc<TokenProvider>,
    clock: Arc<dyn Clock>,
}

impl MpesaGateway {
    pub fn new(
        config: MpesaConfig,
        tokens: Arc<TokenProvider>,
        clock: Arc<dyn Clock>,
    ) -> PaymentResult<Self> {
        Ok(Self {
            http: build_client(config.stk_timeout)?,
            config,
            tokens,
            clock,
        })
    }

    fn build_request(&self, request: &PushRequest) -> StkPushRequest {
        let timestamp = stk_timestamp(self.clock.now());
        let password = stk_password(&self.config.shortcode, &self.config.passkey, &timestamp);
        let description = if request.description.trim().is_empty() {
            self.config.transaction_desc.clone()
        } else {
            request.description.clone()
        };

        StkPushRequest {
            business_short_code: self.config.shortcode.clone(),
            password,
            timestamp,
            transaction_type: TRANSACTION_TYPE_PAYBILL.to_string(),
            amount: request.amount.normalize().to_string(),
            party_a: request.phone_number.clone(),
            party_b: self.config.shortcode.clone(),
            phone_number: request.phone_number.clone(),
            callback_url: self.config.callback_url.clone(),
            account_reference: self.config.account_reference.clone(),
            transaction_desc: description,
        }
    }
}

#[async_trait]
impl PaymentGateway for MpesaGateway {
    async fn push_payment(&self, request: PushRequest) -> PaymentResult<StkPushAck> {
        let token = self.tokens.get_token().await?;
        let payload = self.build_request(&request);

        info!(
            phone = %mask_phone_number(&request.phone_number),
            amount = %request.amount,
            "Sending STK push"
        );

        let request = self
            .http
            .post(self.config.stk_push_url())
            .bearer_auth(&token.value)
            .json(&payload);
        let response = log_external_call(PROVIDER_NAME, "stkpush", request.send())
            .await
            .map_err(|e| {
                error!(error = %e, timed_out = e.is_timeout(), "STK push transport failure");
                PaymentError::network(&e)
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::network(&e))?;

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return Err(PaymentError::AuthenticationError {
                message: format!("STK push unauthorized: {}", text),
            });
        }

        let parsed = match serde_json::from_str::<StkPushResponse>(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(status = %status, error = %e, "Unreadable STK push response");
                return Err(PaymentError::ProviderError {
                    provider: PROVIDER_NAME.to_string(),
                    message: format!("HTTP {}: invalid provider JSON response", status),
                    provider_code: Some(status.as_u16().to_string()),
                    retryable: status.is_server_error(),
                });
            }
        };

        if status.is_success() && parsed.is_accepted() {
            let ack = StkPushAck {
                merchant_request_id: parsed.merchant_request_id,
                checkout_request_id: parsed.checkout_request_id.unwrap_or_default(),
                response_code: parsed.response_code.unwrap_or_default(),
                response_description: parsed.response_description,
                customer_message: parsed.customer_message,
            };
            info!(
                checkout_request_id = %ack.checkout_request_id,
                "STK push accepted"
            );
            return Ok(ack);
        }

        if parsed.error_code.is_none() && parsed.response_code.is_none() && !status.is_success() {
            return Err(PaymentError::ProviderError {
                provider: PROVIDER_NAME.to_string(),
                message: format!("HTTP {}: {}", status, text),
                provider_code: Some(status.as_u16().to_string()),
                retryable: status.is_server_error(),
            });
        }

        let message = parsed.rejection_message();
        warn!(
            status = %status,
            code = ?parsed.rejection_code(),
            message = %message,
            "STK push rejected"
        );
        Err(PaymentError::PaymentRejectedError {
            message,
            provider_code: parsed.rejection_code(),
        })
    }

    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_is_east_africa_time_to_the_second() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 22, 30, 5).unwrap();
        assert_eq!(stk_timestamp(now), "20260201013005");
    }

    #[test]
    fn password_concatenates_shortcode_passkey_and_timestamp() {
        let password = stk_password("174379", "secret-passkey", "20260101120000");
        let decoded = BASE64_STANDARD.decode(password).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "174379secret-passkey20260101120000"
        );
    }

    #[test]
    fn password_changes_with_timestamp() {
        assert_ne!(
            stk_password("174379", "key", "20260101120000"),
            stk_password("174379", "key", "20260101120001")
        );
    }
}
