use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::RegexBuilder;

use super::{ActionQuery, EventStore, StoreError};
use crate::clock::Clock;
use crate::models::{ActionMatch, NewActionRecord, SensorReading};

// ---

/// A stored action row, as `alert_actions` would hold it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAction {
    pub id: i64,
    pub record: NewActionRecord,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    readings: Vec<SensorReading>,
    actions: Vec<StoredAction>,
    next_id: i64,
    failing_writes: u32,
    reconnects: u32,
}

/// In-process store used by tests and local experiments.
///
/// `created_at` for actions comes from the injected clock so recency
/// windows behave under simulated time.
pub struct MemoryEventStore {
    // ---
    tables: Mutex<Tables>,
    clock: Arc<dyn Clock>,
}

impl MemoryEventStore {
    // ---
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            clock,
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `n` write operations fail as if the database were down.
    pub fn fail_next_writes(&self, n: u32) {
        self.tables().failing_writes = n;
    }

    pub fn readings(&self) -> Vec<SensorReading> {
        self.tables().readings.clone()
    }

    pub fn actions(&self) -> Vec<StoredAction> {
        self.tables().actions.clone()
    }

    pub fn reconnects(&self) -> u32 {
        self.tables().reconnects
    }

    fn check_writable(tables: &mut Tables) -> Result<(), StoreError> {
        if tables.failing_writes > 0 {
            tables.failing_writes -= 1;
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert_reading(&self, reading: &SensorReading) -> Result<(), StoreError> {
        // ---
        let mut tables = self.tables();
        Self::check_writable(&mut tables)?;
        tables.readings.push(reading.clone());
        Ok(())
    }

    async fn latest_reading(
        &self,
        sensor_name: &str,
        parameter: &str,
    ) -> Result<Option<SensorReading>, StoreError> {
        // ---
        Ok(self
            .tables()
            .readings
            .iter()
            .filter(|r| r.sensor_name == sensor_name && r.parameter == parameter)
            .max_by_key(|r| r.recorded_at)
            .cloned())
    }

    async fn clear_readings(&self, sensor_name: &str, parameter: &str) -> Result<u64, StoreError> {
        // ---
        let mut tables = self.tables();
        let before = tables.readings.len();
        tables
            .readings
            .retain(|r| !(r.sensor_name == sensor_name && r.parameter == parameter));
        Ok((before - tables.readings.len()) as u64)
    }

    async fn latest_action(&self, query: &ActionQuery) -> Result<Option<ActionMatch>, StoreError> {
        // ---
        let pattern = RegexBuilder::new(&query.pattern())
            .case_insensitive(true)
            .build()?;

        Ok(self
            .tables()
            .actions
            .iter()
            .filter(|a| a.created_at > query.since && pattern.is_match(&a.record.alert_title))
            .max_by_key(|a| (a.created_at, a.id))
            .map(|a| ActionMatch {
                id: a.id,
                alert_title: a.record.alert_title.clone(),
                action: a.record.action.clone(),
                created_at: a.created_at,
            }))
    }

    async fn insert_actions(&self, records: &[NewActionRecord]) -> Result<Vec<i64>, StoreError> {
        // ---
        let now = self.clock.now();
        let mut tables = self.tables();
        Self::check_writable(&mut tables)?;

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            tables.next_id += 1;
            let id = tables.next_id;
            tables.actions.push(StoredAction {
                id,
                record: record.clone(),
                created_at: now,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        self.tables().reconnects += 1;
        Ok(())
    }
}
