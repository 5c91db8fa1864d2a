//! Runtime settings, read once from the environment (and `.env` when present).

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub mpesa: MpesaConfig,
    pub voucher: VoucherConfig,
}

/// HTTP listener
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Which store backs transactions and vouchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// M-Pesa Daraja configuration
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub environment: String,
    pub base_url_override: Option<String>,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub callback_url: String,
    pub account_reference: String,
    pub transaction_desc: String,
    pub auth_timeout: Duration,
    pub stk_timeout: Duration,
    pub auth_max_retries: u32,
    pub token_safety_margin: u64, // seconds
}

/// Ceiling for `VOUCHER_MAX_DURATION_SECS` (one year).
pub const MAX_VOUCHER_DURATION_SECS: i64 = 365 * 24 * 3600;

/// Voucher configuration
#[derive(Debug, Clone)]
pub struct VoucherConfig {
    /// Access window for vouchers whose payment did not record one
    pub default_duration_secs: i64,
    /// Longest access window a purchase may request
    pub max_duration_secs: i64,
    pub list_limit: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            mpesa: MpesaConfig::from_env()?,
            voucher: VoucherConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.mpesa.validate()?;
        self.voucher.validate()?;

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVariable(name.to_string()))
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("SERVER_PORT", "5000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_string())
            .to_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            _ => return Err(ConfigError::InvalidValue("STORAGE_BACKEND".to_string())),
        };

        let url = match backend {
            StorageBackend::Postgres => required_var("DATABASE_URL")?,
            StorageBackend::Memory => env::var("DATABASE_URL").unwrap_or_default(),
        };

        Ok(DatabaseConfig {
            backend,
            url,
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == StorageBackend::Memory {
            return Ok(());
        }

        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl MpesaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(MpesaConfig {
            environment: env::var("MPESA_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string()),
            base_url_override: env::var("MPESA_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            consumer_key: required_var("MPESA_CONSUMER_KEY")?,
            consumer_secret: required_var("MPESA_CONSUMER_SECRET")?,
            shortcode: env::var("MPESA_SHORTCODE").unwrap_or_else(|_| "174379".to_string()),
            passkey: required_var("MPESA_PASSKEY")?,
            callback_url: required_var("MPESA_CALLBACK_URL")?,
            account_reference: env::var("MPESA_ACCOUNT_REFERENCE")
                .unwrap_or_else(|_| "VoucherPurchase".to_string()),
            transaction_desc: env::var("MPESA_TRANSACTION_DESC")
                .unwrap_or_else(|_| "BuyVoucher".to_string()),
            auth_timeout: Duration::from_secs(parse_var("MPESA_AUTH_TIMEOUT", "10")?),
            stk_timeout: Duration::from_secs(parse_var("MPESA_STK_TIMEOUT", "30")?),
            auth_max_retries: parse_var("MPESA_AUTH_MAX_RETRIES", "3")?,
            token_safety_margin: parse_var("MPESA_TOKEN_SAFETY_MARGIN", "60")?,
        })
    }

    pub fn base_url(&self) -> String {
        if let Some(url) = &self.base_url_override {
            return url.trim_end_matches('/').to_string();
        }
        if self.is_production() {
            "https://api.safaricom.co.ke".to_string()
        } else {
            "https://sandbox.safaricom.co.ke".to_string()
        }
    }

    pub fn auth_url(&self) -> String {
        format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.base_url()
        )
    }

    pub fn stk_push_url(&self) -> String {
        format!("{}/mpesa/stkpush/v1/processrequest", self.base_url())
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_environments = ["sandbox", "production"];
        if !valid_environments.contains(&self.environment.as_str()) {
            return Err(ConfigError::InvalidValue("MPESA_ENVIRONMENT".to_string()));
        }

        if self.shortcode.is_empty() || !self.shortcode.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue("MPESA_SHORTCODE".to_string()));
        }

        if !self.callback_url.starts_with("https://") && !self.callback_url.starts_with("http://")
        {
            return Err(ConfigError::InvalidValue(
                "MPESA_CALLBACK_URL must be a valid URL".to_string(),
            ));
        }

        if self.stk_timeout.is_zero() || self.auth_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "MPESA timeouts must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

impl VoucherConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(VoucherConfig {
            default_duration_secs: parse_var("VOUCHER_DEFAULT_DURATION_SECS", "3600")?,
            max_duration_secs: parse_var("VOUCHER_MAX_DURATION_SECS", "2592000")?,
            list_limit: parse_var("VOUCHER_LIST_LIMIT", "100")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_duration_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "VOUCHER_DEFAULT_DURATION_SECS".to_string(),
            ));
        }

        if self.max_duration_secs < self.default_duration_secs
            || self.max_duration_secs > MAX_VOUCHER_DURATION_SECS
        {
            return Err(ConfigError::InvalidValue(
                "VOUCHER_MAX_DURATION_SECS".to_string(),
            ));
        }

        if self.list_limit <= 0 {
            return Err(ConfigError::InvalidValue("VOUCHER_LIST_LIMIT".to_string()));
        }

        Ok(())
    }
}

impl Default for VoucherConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: 3600,
            max_duration_secs: 30 * 24 * 3600,
            list_limit: 100,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}
