//! Sustained-breach confirmation per alert.
//!
//! [`AlertDurationManager::process`] answers one question per event: has
//! this alert been firing continuously for at least the required duration?
//! It keeps no memory of having said "act" before. Every firing event past
//! the threshold answers [`Decision::Act`] again until a `normal` event
//! resets the episode. Exactly-once dispatch is the caller's job, through
//! the per-episode `action_written` flag ([`AlertDurationManager::claim_action`]
//! or [`AlertDurationManager::mark_action_written`]).
//!
//! State lives in a mutex-guarded map so concurrent webhook deliveries for
//! the same uid cannot interleave a read-modify-write. Events are applied
//! in arrival order; nothing reorders late deliveries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::clock::Clock;
use crate::models::AlertStatus;

// ---

/// Debounce state for one alert uid.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertState {
    // ---
    pub uid: String,
    pub title: String,
    pub threshold: Option<f64>,

    /// Set on the first firing event of an episode, cleared on `normal`.
    pub first_trigger_time: Option<DateTime<Utc>>,
    pub last_value: Option<f64>,

    /// Whether an action was recorded for the current episode.
    pub action_written: bool,
}

impl AlertState {
    // ---
    fn new(uid: &str, title: &str, threshold: Option<f64>) -> Self {
        Self {
            uid: uid.to_string(),
            title: title.to_string(),
            threshold,
            first_trigger_time: None,
            last_value: None,
            action_written: false,
        }
    }

    fn observe(&mut self, value: Option<f64>, now: DateTime<Utc>, required: Duration) -> Decision {
        // ---
        self.last_value = value;

        let Some(started_at) = self.first_trigger_time else {
            self.first_trigger_time = Some(now);
            tracing::info!(uid = %self.uid, "Alert '{}' first trigger", self.title);
            return Decision::Pending {
                sustained: Duration::zero(),
            };
        };

        let sustained = now - started_at;
        tracing::debug!(
            uid = %self.uid,
            "Alert '{}' sustained for {:.1}s (need {}s)",
            self.title,
            sustained.num_milliseconds() as f64 / 1000.0,
            required.num_seconds()
        );

        if sustained >= required {
            Decision::Act {
                started_at,
                sustained,
            }
        } else {
            Decision::Pending { sustained }
        }
    }

    fn reset(&mut self) {
        self.first_trigger_time = None;
        self.last_value = None;
        self.action_written = false;
    }
}

/// Outcome of one [`AlertDurationManager::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Status was `normal`; the episode (if any) was reset.
    Cleared,

    /// Firing, but not yet for long enough.
    Pending { sustained: Duration },

    /// Firing for at least the required duration.
    Act {
        started_at: DateTime<Utc>,
        sustained: Duration,
    },
}

impl Decision {
    pub fn should_act(&self) -> bool {
        matches!(self, Decision::Act { .. })
    }
}

pub struct AlertDurationManager {
    // ---
    duration_required: Duration,
    clock: Arc<dyn Clock>,
    states: Mutex<HashMap<String, AlertState>>,
}

impl AlertDurationManager {
    // ---
    pub fn new(duration_required: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            duration_required,
            clock,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn duration_required(&self) -> Duration {
        self.duration_required
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, AlertState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one alert event.
    ///
    /// A `normal` event resets an existing episode and never creates state.
    /// A firing event lazily creates the uid's state, starts the episode
    /// timer on first sight, and returns [`Decision::Act`] whenever the
    /// episode has lasted at least the required duration.
    pub fn process(
        &self,
        uid: &str,
        title: &str,
        threshold: Option<f64>,
        value: Option<f64>,
        status: AlertStatus,
    ) -> Decision {
        // ---
        let now = self.clock.now();
        let mut states = self.states();

        if status != AlertStatus::Firing {
            if let Some(state) = states.get_mut(uid) {
                if state.first_trigger_time.is_some() {
                    tracing::info!(uid, "Alert '{}' back to normal, episode reset", state.title);
                }
                state.reset();
            }
            return Decision::Cleared;
        }

        let state = states
            .entry(uid.to_string())
            .or_insert_with(|| AlertState::new(uid, title, threshold));
        if threshold.is_some() {
            state.threshold = threshold;
        }
        state.observe(value, now, self.duration_required)
    }

    /// Snapshot of a uid's state.
    pub fn alert_state(&self, uid: &str) -> Option<AlertState> {
        self.states().get(uid).cloned()
    }

    /// Unconditionally flag the uid's current episode as actioned.
    pub fn mark_action_written(&self, uid: &str) {
        if let Some(state) = self.states().get_mut(uid) {
            state.action_written = true;
        }
    }

    /// Atomically flag the episode that started at `episode_start` as
    /// actioned. Returns `false` if it was already flagged, or if the
    /// episode was reset (or replaced) in the meantime.
    pub fn claim_action(&self, uid: &str, episode_start: DateTime<Utc>) -> bool {
        // ---
        let mut states = self.states();
        match states.get_mut(uid) {
            Some(state)
                if state.first_trigger_time == Some(episode_start) && !state.action_written =>
            {
                state.action_written = true;
                true
            }
            _ => false,
        }
    }

    /// Undo a [`claim_action`](Self::claim_action) whose write failed, so a
    /// redelivery can act again. No-op if the episode has moved on.
    pub fn release_action(&self, uid: &str, episode_start: DateTime<Utc>) {
        // ---
        if let Some(state) = self.states().get_mut(uid) {
            if state.first_trigger_time == Some(episode_start) {
                state.action_written = false;
            }
        }
    }
}
