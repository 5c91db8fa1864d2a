//! OAuth bearer token cache for the Daraja API.
//!
//! One `TokenProvider` is shared by every request handler. The cached token
//! is checked and, when stale, refreshed while holding a single async mutex,
//! so a burst of concurrent callers triggers at most one credential exchange.

use crate::clock::Clock;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::AuthResponse;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Performs one credential exchange against the gateway.
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self) -> PaymentResult<AuthResponse>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenProviderConfig {
    /// A token is refreshed once `now >= expires_at - safety_margin`.
    pub safety_margin: Duration,
    /// Extra attempts after the first failed exchange.
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry.
    pub base_backoff: std::time::Duration,
    /// TTL used when the gateway omits `expires_in`.
    pub default_ttl_secs: i64,
    /// Upper bound on any TTL the gateway reports.
    pub max_ttl_secs: i64,
}

impl Default for TokenProviderConfig {
    fn default() -> Self {
        Self {
            safety_margin: Duration::seconds(60),
            max_retries: 3,
            base_backoff: std::time::Duration::from_millis(500),
            default_ttl_secs: 3599,
            max_ttl_secs: 24 * 3600,
        }
    }
}

pub struct TokenProvider {
    exchange: Arc<dyn CredentialExchange>,
    clock: Arc<dyn Clock>,
    config: TokenProviderConfig,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(
        exchange: Arc<dyn CredentialExchange>,
        clock: Arc<dyn Clock>,
        config: TokenProviderConfig,
    ) -> Self {
        Self {
            exchange,
            clock,
            config,
            cached: Mutex::new(None),
        }
    }

    pub async fn get_token(&self) -> PaymentResult<AccessToken> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if self.is_fresh(token) {
                debug!(expires_at = %token.expires_at, "Using cached access token");
                return Ok(token.clone());
            }
        }

        let token = self.refresh().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token, e.g. after the gateway answered 401 to a push.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    fn is_fresh(&self, token: &AccessToken) -> bool {
        self.clock.now() < token.expires_at - self.config.safety_margin
    }

    async fn refresh(&self) -> PaymentResult<AccessToken> {
        let mut attempt: u32 = 0;
        loop {
            match self.exchange.exchange().await {
                Ok(response) => return self.token_from_response(response),
                Err(PaymentError::NetworkError { message, .. }) => {
                    if attempt >= self.config.max_retries {
                        return Err(PaymentError::AuthenticationError {
                            message: format!(
                                "credential exchange failed after {} attempt(s): {}",
                                attempt + 1,
                                message
                            ),
                        });
                    }
                    let delay = self.config.base_backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %message,
                        "Credential exchange failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn token_from_response(&self, response: AuthResponse) -> PaymentResult<AccessToken> {
        let ttl = response
            .expires_in_secs()
            .filter(|secs| *secs > 0)
            .unwrap_or(self.config.default_ttl_secs)
            .min(self.config.max_ttl_secs);

        let value = response
            .access_token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| PaymentError::AuthenticationError {
                message: "access_token missing from credential response".to_string(),
            })?;

        let expires_at = self.clock.now() + Duration::seconds(ttl);
        info!(ttl_secs = ttl, "Access token obtained");
        Ok(AccessToken { value, expires_at })
    }
}
