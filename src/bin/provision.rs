//! Pushes the alert rules to Grafana.
//!
//! # Environment Variables
//! - `GRAFANA_URL` (optional) – default `http://localhost:3000`
//! - `GRAFANA_USER` / `GRAFANA_PASSWORD` (optional) – default `admin` / `admin`
//! - `GRAFANA_FOLDER` (optional) – rule folder, default `IBSYS`
//! - `GRAFANA_CONTACT_POINT` (optional) – expected contact point, default `worker-webhook`
use std::time::Duration;

use anyhow::{bail, Result};
use dotenvy::dotenv;

use sensorloop::grafana::{GrafanaClient, RuleOutcome};
use sensorloop::rules::ALERT_RULES;
use sensorloop::{config, telemetry};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    telemetry::init_tracing();
    dotenv().ok();

    let cfg = config::load_provision_from_env()?;
    cfg.log_config();

    let client = GrafanaClient::new(cfg.clone())?;
    client.wait_until_ready(60, Duration::from_secs(2)).await?;

    // Datasources may still be loading right after health turns green
    tokio::time::sleep(Duration::from_secs(5)).await;

    let datasource_uid = client.postgres_datasource_uid().await?;
    let folder_uid = client.ensure_folder().await?;

    match client.contact_point_exists().await {
        Ok(true) => tracing::info!("Contact point '{}' exists", cfg.contact_point),
        Ok(false) => tracing::warn!("Contact point '{}' not found", cfg.contact_point),
        Err(e) => tracing::warn!("Could not verify contact point: {}", e),
    }

    tracing::info!("Creating {} alert rules...", ALERT_RULES.len());
    let mut succeeded = 0;
    for rule in &ALERT_RULES {
        match client.upsert_rule(rule, &datasource_uid, &folder_uid).await {
            Ok(RuleOutcome::Created) => {
                tracing::info!("Created alert: {}", rule.title);
                succeeded += 1;
            }
            Ok(RuleOutcome::Recreated) => {
                tracing::info!("Recreated alert: {}", rule.title);
                succeeded += 1;
            }
            Err(e) => tracing::error!("{}", e),
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    match client.set_group_intervals("10s").await {
        Ok(n) => tracing::info!("Updated {} rule group intervals", n),
        Err(e) => tracing::warn!("Could not update rule group intervals: {}", e),
    }

    tracing::info!(
        "Successfully created/updated {}/{} alert rules",
        succeeded,
        ALERT_RULES.len()
    );
    if succeeded == 0 {
        bail!("No alert rules could be provisioned");
    }
    Ok(())
}
