//! Configuration management for the demo server.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use hoptcha::GateOptions;
use hoptcha_common::constants::{DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL};

/// Threshold for the protected form unless the config says otherwise
const DEMO_THRESHOLD: u64 = 3;

/// Where attempt counters live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on restart
    #[default]
    Memory,
    /// Shared between instances
    Redis,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Counter store backend
    #[serde(default)]
    pub store: StoreBackend,

    /// Redis connection URL (redis backend only)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Gate protecting `/submit/`
    #[serde(default = "default_gate")]
    pub gate: GateOptions,
}

fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_gate() -> GateOptions {
    GateOptions {
        threshold: DEMO_THRESHOLD,
        ..GateOptions::default()
    }
}

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            Self::from_file(config_path)?
        } else {
            tracing::warn!(path = config_path, "Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(store) = args.store {
            config.store = store;
        }
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        config::Config::builder()
            // A partial [gate] table keeps the demo threshold
            .set_default("gate.threshold", DEMO_THRESHOLD)
            .context("Failed to set config defaults")?
            .add_source(config::File::with_name(path))
            .build()
            .context("Failed to load config file")?
            .try_deserialize()
            .context("Failed to parse config")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            store: StoreBackend::default(),
            redis_url: default_redis_url(),
            gate: default_gate(),
        }
    }
}
