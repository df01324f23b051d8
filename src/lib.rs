//! Simulated industrial sensor with threshold alerting and a closed
//! feedback loop.
//!
//! Two cooperating state machines share nothing but the [`EventStore`]:
//! - the producer ([`AnomalySimulator`]) drives a parameter through an
//!   excursion and holds it there until a corrective action appears in the
//!   store;
//! - the consumer ([`routes`] + [`AlertDurationManager`]) receives alert
//!   webhooks, confirms breaches that stay firing long enough, and records
//!   exactly one action per episode.
//!
//! Binaries: `sensor` (producer), `worker` (webhook consumer) and
//! `provision` (pushes the alert rules to Grafana).

pub mod actions;
pub mod clock;
pub mod config;
pub mod duration;
pub mod extract;
pub mod grafana;
pub mod models;
pub mod routes;
pub mod rules;
pub mod scheduler;
pub mod schema;
pub mod simulator;
pub mod spelling;
pub mod store;
pub mod telemetry;

// Re-exported so routes/*.rs and the binaries depend on the crate root
// rather than on sibling module paths.
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DbConfig, SensorConfig, SensorIdentity, WorkerConfig};
pub use duration::{AlertDurationManager, AlertState, Decision};
pub use models::{
    ActionMatch, AlertEvent, AlertStatus, NewActionRecord, RawAlert, SensorReading,
    WebhookPayload, WebhookResponse,
};
pub use simulator::{AnomalySimulator, Phase, SimulationConfig};
pub use store::{EventStore, MemoryEventStore, PgEventStore, StoreError};
