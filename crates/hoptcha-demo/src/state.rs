//! Application state and shared resources.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use hoptcha::{
    AttemptGate, CounterStore, GateConfig, MemoryStore, RedisStore, RemoteVerifier, Settings,
    TokenVerifier,
};

use crate::config::{AppConfig, StoreBackend};

/// How often the in-memory store drops expired counters
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Provider settings
    pub settings: Arc<Settings>,

    /// Attempt counter store
    pub store: Arc<dyn CounterStore>,

    /// Gate protecting the form endpoint
    pub gate: Arc<AttemptGate>,
}

impl AppState {
    /// Open the configured store and build the gate
    pub async fn new(
        config: AppConfig,
        settings: Arc<Settings>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let store: Arc<dyn CounterStore> = match config.store {
            StoreBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                tokio::spawn(purge_worker(store.clone(), PURGE_INTERVAL, shutdown));
                store
            }
            StoreBackend::Redis => {
                let store = RedisStore::connect(&config.redis_url)
                    .await
                    .context("Failed to connect to Redis")?;
                tracing::info!(url = %config.redis_url, "Redis connected");
                Arc::new(store)
            }
        };

        let verifier =
            RemoteVerifier::new(&settings).context("Failed to create CAPTCHA verifier")?;

        Self::with_parts(config, settings, store, Arc::new(verifier))
    }

    /// Assemble state around an existing store and verifier
    pub fn with_parts(
        config: AppConfig,
        settings: Arc<Settings>,
        store: Arc<dyn CounterStore>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Result<Self> {
        let gate_config =
            GateConfig::from_options(&config.gate).context("Invalid [gate] configuration")?;
        tracing::info!(
            threshold = gate_config.threshold,
            timeout_secs = gate_config.timeout.as_secs(),
            key = gate_config.key.name(),
            "Gate configured"
        );

        let gate = Arc::new(AttemptGate::new(
            gate_config,
            settings.clone(),
            store.clone(),
            verifier,
        ));

        Ok(Self {
            config,
            settings,
            store,
            gate,
        })
    }
}

/// Periodically drop expired counters until shutdown
async fn purge_worker(store: Arc<MemoryStore>, every: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                store.purge_expired().await;
            }
            _ = shutdown.recv() => {
                tracing::debug!("Purge worker stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoptcha::GateOptions;

    #[tokio::test(start_paused = true)]
    async fn test_purge_worker_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        store.set("k", 1, Duration::from_secs(5)).await.unwrap();

        let (tx, rx) = broadcast::channel(1);
        let worker = tokio::spawn(purge_worker(store.clone(), Duration::from_secs(10), rx));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(store.is_empty().await);

        tx.send(()).unwrap();
        tokio_test::assert_ok!(worker.await);
    }

    #[tokio::test]
    async fn test_memory_state_and_bad_gate_options() {
        let (_tx, rx) = broadcast::channel(1);
        let state = AppState::new(AppConfig::default(), Arc::new(Settings::default()), rx)
            .await
            .unwrap();
        assert_eq!(state.gate.config().threshold, 3);
        assert!(state.store.ping().await.is_ok());

        let config = AppConfig {
            gate: GateOptions {
                key: "fingerprint".to_string(),
                ..GateOptions::default()
            },
            ..AppConfig::default()
        };
        let result = AppState::with_parts(
            config,
            Arc::new(Settings::default()),
            Arc::new(MemoryStore::new()),
            Arc::new(RemoteVerifier::new(&Settings::default()).unwrap()),
        );
        assert!(result.is_err());
    }
}
