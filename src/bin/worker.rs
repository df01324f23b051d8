//! Entry point for the alert worker.
//!
//! Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Establishing a PostgreSQL connection pool (bounded retry)
//! - Creating the database schema if it does not exist
//! - Mounting the webhook and health routes via the `routes` gateway
//! - Binding the Axum HTTP server and serving requests
//!
//! # Environment Variables
//! - `DATABASE_URL` (**required**) – PostgreSQL connection string
//! - `DB_POOL_MAX` (optional) – maximum number of DB connections (default: 5)
//! - `ALERT_DURATION_SECONDS` (optional) – sustained firing before acting (default: 20)
//! - `WORKER_PORT` (optional) – listen port (default: 5000)
//! - `SENSORLOOP_LOG_LEVEL` (optional) – log verbosity (default: `debug`)
use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use dotenvy::dotenv;

use sensorloop::{
    config, routes, schema, store, telemetry, AlertDurationManager, PgEventStore, SystemClock,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    telemetry::init_tracing();
    dotenv().ok();

    let cfg = config::load_worker_from_env()?;
    cfg.log_config();

    tracing::info!("Attempting to connect to database");
    let pool = store::connect_with_retry(&cfg.db).await?;
    tracing::info!("Successfully connected to database");

    schema::create_schema(&pool).await?;

    let store = Arc::new(PgEventStore::new(pool, cfg.db.clone()));
    let manager = Arc::new(AlertDurationManager::new(
        chrono::Duration::seconds(cfg.alert_duration_seconds.into()),
        Arc::new(SystemClock),
    ));

    let app = routes::router(store, manager);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
