//! booking-escrow server entry point.
//!
//! Connects the database and the escrow wallet, then serves the REST API
//! and the escrow function.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use booking_escrow::api;
use booking_escrow::app_state::AppState;
use booking_escrow::config::{EscrowConfig, LogFormat};
use booking_escrow::domain::EventBus;
use booking_escrow::ledger::{LocalWallet, Signer};
use booking_escrow::persistence::{EscrowStore, PostgresStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = EscrowConfig::from_env().context("loading configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting booking-escrow");

    // Database
    let connect_options = PgConnectOptions::from_str(&config.database_url)
        .context("parsing DATABASE_URL")?
        .password(&config.database_service_key);
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect_with(connect_options)
        .await
        .context("connecting to database")?;
    let store = PostgresStore::new(pool);
    store.ping().await.context("database health check")?;
    let store: Arc<dyn EscrowStore> = Arc::new(store);

    // Escrow wallet
    let wallet = LocalWallet::connect(config.wallet_settings())
        .await
        .context("connecting escrow wallet")?;
    match wallet.balance().await {
        Ok(balance) => tracing::info!(%balance, "escrow wallet balance (wei)"),
        Err(e) => tracing::warn!(error = %e, "escrow wallet balance unavailable"),
    }
    let signer: Arc<dyn Signer> = Arc::new(wallet);

    // Build application state
    let event_bus = EventBus::new(config.event_bus_capacity);
    let app_state = AppState::new(store, signer, event_bus);

    // Build router
    let app = api::build_router()
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await.context("serving HTTP")?;

    Ok(())
}
