//! Persistence for payment transactions and vouchers.
//!
//! `PaymentStore` is the port; `PgPaymentStore` backs it with Postgres and
//! `InMemoryPaymentStore` with a lock-guarded map for tests and local runs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info};

use self::error::DatabaseError;
use crate::config::DatabaseConfig;

pub use memory::InMemoryPaymentStore;
pub use postgres::PgPaymentStore;
pub use store::{CallbackApplied, CallbackUpdate, PaymentStore, RedeemOutcome};

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(30 * 60);

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .idle_timeout(Duration::from_secs(
            config.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
        ))
        .max_lifetime(MAX_CONNECTION_LIFETIME)
}

/// Open the pool and make sure at least one connection can be acquired.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        acquire_timeout_secs = config.connection_timeout,
        "Connecting to Postgres"
    );

    let pool = pool_options(config)
        .connect(&config.url)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to open database pool");
            DatabaseError::from_sqlx(e)
        })?;

    ping(&pool).await?;
    Ok(pool)
}

/// Apply the SQL files under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        error!(error = %e, "Database migration failed");
        DatabaseError::from_migrate(e)
    })?;

    info!("Database migrations applied");
    Ok(())
}

pub async fn ping(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(DatabaseError::from_sqlx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;

    #[test]
    fn test_pool_options_follow_config() {
        let config = DatabaseConfig {
            backend: StorageBackend::Postgres,
            url: "postgres://localhost/voucherpay".to_string(),
            max_connections: 12,
            min_connections: 2,
            connection_timeout: 7,
            idle_timeout: None,
        };

        let options = pool_options(&config);
        assert_eq!(options.get_max_connections(), 12);
        assert_eq!(options.get_min_connections(), 2);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(7));
        assert_eq!(
            options.get_idle_timeout(),
            Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS))
        );
    }
}
