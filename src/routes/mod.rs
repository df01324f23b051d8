use std::sync::Arc;

use axum::Router;

use crate::{AlertDurationManager, EventStore};

mod health;
mod webhook;

// ---

/// Shared handler state: the event store and the debounce manager.
pub type AppState = (Arc<dyn EventStore>, Arc<AlertDurationManager>);

pub fn router(store: Arc<dyn EventStore>, manager: Arc<AlertDurationManager>) -> Router {
    // ---
    Router::new()
        .merge(webhook::router())
        .merge(health::router())
        .with_state((store, manager))
}
