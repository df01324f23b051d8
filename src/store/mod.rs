//! Shared event store.
//!
//! The producer and consumer never talk to each other directly; readings
//! and confirmed actions flow only through an [`EventStore`]. Production
//! runs against PostgreSQL ([`PgEventStore`]); tests use
//! [`MemoryEventStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ActionMatch, NewActionRecord, SensorReading};
use crate::spelling;

mod memory;
mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::{connect_with_retry, PgEventStore};

// ---

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid title pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Look up the most recent action whose title mentions a parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionQuery {
    // ---
    /// Accepted spellings of the parameter, see [`spelling::spellings`].
    pub spellings: Vec<String>,

    /// Only actions created strictly after this instant count.
    pub since: DateTime<Utc>,
}

impl ActionQuery {
    // ---
    pub fn for_parameter(parameter: &str, since: DateTime<Utc>) -> Self {
        Self {
            spellings: spelling::spellings(parameter),
            since,
        }
    }

    /// Case-insensitive regex over the accepted spellings.
    pub fn pattern(&self) -> String {
        spelling::title_pattern(&self.spellings)
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one reading.
    async fn insert_reading(&self, reading: &SensorReading) -> Result<(), StoreError>;

    /// Most recent reading for a sensor/parameter, if any.
    async fn latest_reading(
        &self,
        sensor_name: &str,
        parameter: &str,
    ) -> Result<Option<SensorReading>, StoreError>;

    /// Delete every reading for a sensor/parameter. Returns the number removed.
    async fn clear_readings(&self, sensor_name: &str, parameter: &str) -> Result<u64, StoreError>;

    /// Most recent action matching `query`, newest first.
    async fn latest_action(&self, query: &ActionQuery) -> Result<Option<ActionMatch>, StoreError>;

    /// Persist a batch of actions atomically. Returns the new row ids in order.
    async fn insert_actions(&self, records: &[NewActionRecord]) -> Result<Vec<i64>, StoreError>;

    /// Re-establish connectivity after a failed operation.
    async fn reconnect(&self) -> Result<(), StoreError>;
}
