//! Database schema management for `sensorloop`.
//!
//! Ensures required tables and indexes exist before the producer writes or
//! the worker serves requests. Applied once on startup from each binary.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the append-only `sensor_readings` table and the `alert_actions`
/// table the producer polls for corrective actions. Safe to call on every
/// startup; no-op if objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // One row per simulator tick
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sensor_readings (
            id           BIGSERIAL PRIMARY KEY,
            sensor_name  TEXT             NOT NULL,
            parameter    TEXT             NOT NULL,
            value        DOUBLE PRECISION NOT NULL,
            unit         TEXT             NOT NULL,
            recorded_at  TIMESTAMPTZ      NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // At most one row per alert episode; never updated
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alert_actions (
            id                 BIGSERIAL PRIMARY KEY,
            alert_uid          TEXT             NOT NULL,
            alert_title        TEXT             NOT NULL,
            state              TEXT             NOT NULL,
            threshold          DOUBLE PRECISION,
            current_value      DOUBLE PRECISION,
            started_at         TIMESTAMPTZ      NOT NULL,
            sustained_seconds  BIGINT           NOT NULL,
            action             TEXT             NOT NULL,
            created_at         TIMESTAMPTZ      NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_sensor_readings_sensor_parameter
            ON sensor_readings (sensor_name, parameter, recorded_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alert_actions_created_at
            ON alert_actions (created_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
