//! Liveness report for `/health`: the only dependency probed is the store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::clock::Clock;
use crate::database::store::PaymentStore;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreProbe {
    pub backend: &'static str,
    pub status: Liveness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: Liveness,
    pub version: &'static str,
    pub store: StoreProbe,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_up(&self) -> bool {
        self.status == Liveness::Up
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    store: Arc<dyn PaymentStore>,
    clock: Arc<dyn Clock>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn PaymentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn report(&self) -> HealthReport {
        let store = self.probe_store().await;
        HealthReport {
            status: store.status,
            version: env!("CARGO_PKG_VERSION"),
            store,
            checked_at: self.clock.now(),
        }
    }

    async fn probe_store(&self) -> StoreProbe {
        let backend = self.store.backend_name();
        let started = Instant::now();

        let error = match tokio::time::timeout(PROBE_TIMEOUT, self.store.ping()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("no answer within {}s", PROBE_TIMEOUT.as_secs())),
        };

        match error {
            None => {
                let latency_ms = started.elapsed().as_millis() as u64;
                debug!(backend, latency_ms, "Store probe ok");
                StoreProbe {
                    backend,
                    status: Liveness::Up,
                    latency_ms: Some(latency_ms),
                    error: None,
                }
            }
            Some(error) => {
                error!(backend, error = %error, "Store probe failed");
                StoreProbe {
                    backend,
                    status: Liveness::Down,
                    latency_ms: None,
                    error: Some(error),
                }
            }
        }
    }
}
