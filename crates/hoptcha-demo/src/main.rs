//! # Hoptcha Demo
//!
//! A small form endpoint behind the attempt gate. After a few submissions
//! from the same address the endpoint answers with a CAPTCHA challenge, and
//! the bundled client script renders it and retries with the token.
//!
//! ```text
//! Browser → /submit/ → HoptchaLayer → handler
//!                          ↓
//!                   Counter store (memory | Redis)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use hoptcha::Settings;

mod config;
mod routes;
mod state;

use config::{AppConfig, StoreBackend};
use state::AppState;

/// Hoptcha demo server
#[derive(Parser, Debug)]
#[command(name = "hoptcha-demo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/hoptcha-demo.toml")]
    config: String,

    /// Counter store backend (overrides config)
    #[arg(long, value_enum, env = "HOPTCHA_STORE")]
    store: Option<StoreBackend>,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so clap's env fallbacks and the settings see it
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Hoptcha demo v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!(path = %args.config, store = ?config.store, "Configuration loaded");

    let settings = Settings::from_env().context("Failed to load Hoptcha settings")?;
    if settings.client_id.is_empty() {
        warn!("HOPTCHA_CLIENT_ID is not set; challenges will not verify");
    }
    if settings.debug {
        warn!("DEBUG is set; the gate lets everything through unless enforce_in_debug is on");
    }

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let state = AppState::new(config.clone(), Arc::new(settings), shutdown_tx.subscribe()).await?;

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    })
    .await
    .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .context("Failed to initialize logging")?;
    }

    Ok(())
}
