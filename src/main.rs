use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use voucherpay::api::{self, AppState};
use voucherpay::clock::{Clock, SystemClock};
use voucherpay::config::{AppConfig, StorageBackend};
use voucherpay::database::{self, InMemoryPaymentStore, PaymentStore, PgPaymentStore};
use voucherpay::health::HealthChecker;
use voucherpay::logging::init_tracing;
use voucherpay::payments::providers::{DarajaCredentials, MpesaGateway};
use voucherpay::payments::{PaymentGateway, TokenProvider, TokenProviderConfig};
use voucherpay::services::{CallbackReconciler, PaymentInitiator, VoucherService};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn build_store(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentStore>> {
    match config.database.backend {
        StorageBackend::Memory => {
            info!("Using in-memory store (STORAGE_BACKEND=memory)");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
        StorageBackend::Postgres => {
            let pool = database::connect(&config.database)
                .await
                .context("failed to initialize database pool")?;
            database::run_migrations(&pool)
                .await
                .context("failed to apply database migrations")?;
            info!(
                max_connections = pool.options().get_max_connections(),
                "Database connection pool initialized"
            );
            Ok(Arc::new(PgPaymentStore::new(pool)))
        }
    }
}

fn build_gateway(
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    let credentials =
        DarajaCredentials::new(&config.mpesa).context("failed to build credential client")?;
    let tokens = Arc::new(TokenProvider::new(
        Arc::new(credentials),
        clock.clone(),
        TokenProviderConfig {
            safety_margin: chrono::Duration::seconds(config.mpesa.token_safety_margin as i64),
            max_retries: config.mpesa.auth_max_retries,
            ..Default::default()
        },
    ));
    let gateway = MpesaGateway::new(config.mpesa.clone(), tokens, clock)
        .context("failed to build M-Pesa gateway")?;
    Ok(Arc::new(gateway))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mpesa_environment = %config.mpesa.environment,
        storage = ?config.database.backend,
        "Starting voucher payments service"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_store(&config).await?;
    let gateway = build_gateway(&config, clock.clone())?;

    let state = AppState {
        initiator: Arc::new(PaymentInitiator::new(
            gateway,
            store.clone(),
            clock.clone(),
            config.voucher.max_duration_secs,
        )),
        reconciler: Arc::new(CallbackReconciler::new(
            store.clone(),
            clock.clone(),
            config.voucher.default_duration_secs,
        )),
        vouchers: Arc::new(VoucherService::new(
            store.clone(),
            clock.clone(),
            config.voucher.list_limit,
        )),
        health: HealthChecker::new(store, clock),
    };

    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}
