//! Entry point for the simulated sensor.
//!
//! Startup sequence:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Connecting to PostgreSQL (bounded retry, fatal when exhausted)
//! - Creating the database schema if it does not exist
//! - Seeding the simulator from the last persisted value, then deleting this
//!   sensor's old readings
//! - Resuming in recovery if a recent action is found while out of range
//! - Writing one reading per interval until the process is stopped
//!
//! # Environment Variables
//! | Variable                   | Default             |
//! |----------------------------|---------------------|
//! | `DATABASE_URL`             | required            |
//! | `WRITE_INTERVAL_SECONDS`   | `5`                 |
//! | `SENSOR_NAME`              | `lackieranlage_1`   |
//! | `PARAMETER`                | `kabinentemperatur` |
//! | `UNIT`                     | `C`                 |
//! | `MIN_VALUE` / `MAX_VALUE`  | `18` / `30`         |
//! | `THRESHOLD_LOW` / `_HIGH`  | `20` / `26`         |
//! | `ANOMALY_CYCLE_MINUTES`    | `15`                |
//! | `BUILDUP_SECONDS`          | `180`               |
//! | `RECOVERY_SECONDS`         | `120`               |
//! | `ACTION_POLL_MILLIS`       | `1000`              |
//! | `ACTION_LOOKBACK_SECONDS`  | `120`               |
//! | `STARTUP_LOOKBACK_SECONDS` | `300`               |
use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;

use sensorloop::scheduler::IntervalTicker;
use sensorloop::{
    config, schema, store, telemetry, AnomalySimulator, EventStore, PgEventStore, SystemClock,
};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    telemetry::init_tracing();
    dotenv().ok();

    let cfg = config::load_sensor_from_env()?;
    cfg.log_config();

    let pool = store::connect_with_retry(&cfg.db).await?;
    tracing::info!("DB connection established. Starting simulation...");

    schema::create_schema(&pool).await?;
    let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool, cfg.db.clone()));

    let sensor_name = &cfg.identity.sensor_name;
    let parameter = &cfg.identity.parameter;

    let last_value = match store.latest_reading(sensor_name, parameter).await {
        Ok(reading) => reading.map(|r| r.value),
        Err(e) => {
            tracing::warn!("Could not read last value: {}", e);
            None
        }
    };

    match store.clear_readings(sensor_name, parameter).await {
        Ok(n) => tracing::info!("Deleted {} old readings for '{}' from '{}'", n, parameter, sensor_name),
        Err(e) => tracing::error!("Error during cleanup: {}", e),
    }

    let mut simulator = AnomalySimulator::new(
        cfg.simulation.clone(),
        cfg.identity.clone(),
        store,
        Arc::new(SystemClock),
    );
    if let Some(value) = last_value {
        simulator.seed_value(value);
    }
    simulator.reconcile_on_startup().await;

    let mut ticker = IntervalTicker::new(cfg.write_interval);
    simulator.run(&mut ticker).await;

    Ok(())
}
