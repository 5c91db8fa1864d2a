//! Tracing set-up and log-safe formatting helpers.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `LOG_LEVEL` when set.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    // A second call (tests, embedding) leaves the first subscriber in place.
    let _ = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Plain => registry.with(fmt::layer().with_target(true)).try_init(),
    };
}

/// Keep the country code and the last three digits: `254712345678` -> `254******678`.
pub fn mask_phone_number(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len());
    }

    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}{}{}", head, "*".repeat(chars.len() - 6), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone_number() {
        assert_eq!(mask_phone_number("254712345678"), "254******678");
        assert_eq!(mask_phone_number("0712"), "****");
        assert_eq!(mask_phone_number(""), "");
    }

    #[test]
    fn test_init_tracing_twice_does_not_panic() {
        let config = LoggingConfig {
            level: "DEBUG".to_string(),
            format: LogFormat::Json,
        };
        init_tracing(&config);
        init_tracing(&config);
    }
}
