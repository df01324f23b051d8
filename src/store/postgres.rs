use std::sync::{PoisonError, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::{ActionQuery, EventStore, StoreError};
use crate::config::DbConfig;
use crate::models::{ActionMatch, NewActionRecord, SensorReading};

// ---

/// Open a pool, retrying up to `db.connect_attempts` times.
///
/// Returns the last connection error once attempts are exhausted.
pub async fn connect_with_retry(db: &DbConfig) -> Result<PgPool> {
    // ---
    let attempts = db.connect_attempts.max(1);
    let mut attempt = 1;
    loop {
        match PgPoolOptions::new()
            .max_connections(db.pool_max)
            .connect(&db.url)
            .await
        {
            Ok(pool) => return Ok(pool),
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    attempt,
                    attempts,
                    "Database not ready: {}. Retrying in {:?}",
                    e,
                    db.connect_wait
                );
                attempt += 1;
                tokio::time::sleep(db.connect_wait).await;
            }
            Err(e) => {
                return Err(anyhow!(
                    "Failed to connect to database after {} attempts: {}",
                    attempts,
                    e
                ));
            }
        }
    }
}

/// PostgreSQL-backed store. The pool sits behind a lock so
/// [`EventStore::reconnect`] can replace it without disturbing callers.
pub struct PgEventStore {
    // ---
    pool: RwLock<PgPool>,
    db: DbConfig,
}

impl PgEventStore {
    // ---
    pub fn new(pool: PgPool, db: DbConfig) -> Self {
        Self {
            pool: RwLock::new(pool),
            db,
        }
    }

    pub fn pool(&self) -> PgPool {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn insert_reading(&self, reading: &SensorReading) -> Result<(), StoreError> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO sensor_readings (sensor_name, parameter, value, unit, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&reading.sensor_name)
        .bind(&reading.parameter)
        .bind(reading.value)
        .bind(&reading.unit)
        .bind(reading.recorded_at)
        .execute(&self.pool())
        .await?;

        Ok(())
    }

    async fn latest_reading(
        &self,
        sensor_name: &str,
        parameter: &str,
    ) -> Result<Option<SensorReading>, StoreError> {
        // ---
        let reading = sqlx::query_as::<_, SensorReading>(
            r#"
            SELECT sensor_name, parameter, value, unit, recorded_at
            FROM sensor_readings
            WHERE sensor_name = $1 AND parameter = $2
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(sensor_name)
        .bind(parameter)
        .fetch_optional(&self.pool())
        .await?;

        Ok(reading)
    }

    async fn clear_readings(&self, sensor_name: &str, parameter: &str) -> Result<u64, StoreError> {
        // ---
        let result =
            sqlx::query("DELETE FROM sensor_readings WHERE sensor_name = $1 AND parameter = $2")
                .bind(sensor_name)
                .bind(parameter)
                .execute(&self.pool())
                .await?;

        Ok(result.rows_affected())
    }

    async fn latest_action(&self, query: &ActionQuery) -> Result<Option<ActionMatch>, StoreError> {
        // ---
        let found = sqlx::query_as::<_, ActionMatch>(
            r#"
            SELECT id, alert_title, action, created_at
            FROM alert_actions
            WHERE alert_title ~* $1
              AND created_at > $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(query.pattern())
        .bind(query.since)
        .fetch_optional(&self.pool())
        .await?;

        Ok(found)
    }

    async fn insert_actions(&self, records: &[NewActionRecord]) -> Result<Vec<i64>, StoreError> {
        // ---
        let pool = self.pool();
        let mut tx = pool.begin().await?;
        let mut ids = Vec::with_capacity(records.len());

        for record in records {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO alert_actions (
                    alert_uid, alert_title, state, threshold, current_value,
                    started_at, sustained_seconds, action
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id
                "#,
            )
            .bind(&record.alert_uid)
            .bind(&record.alert_title)
            .bind(record.state.as_str())
            .bind(record.threshold)
            .bind(record.current_value)
            .bind(record.started_at)
            .bind(record.sustained_seconds)
            .bind(&record.action)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        // ---
        tracing::info!("Reconnecting to database");
        let fresh = connect_with_retry(&self.db)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let stale = {
            let mut pool = self.pool.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *pool, fresh)
        };
        stale.close().await;

        tracing::info!("Database connection re-established");
        Ok(())
    }
}
