//! Anomaly/recovery simulation for one sensor parameter.
//!
//! The value cycles `normal -> buildup -> threshold_violation -> recovery ->
//! normal`. Every phase except `threshold_violation` ends on elapsed time.
//! `threshold_violation` ends only when a corrective action for the
//! parameter shows up in the shared store.
//!
//! [`transition`] is the pure state function: given the current state, the
//! current time and a noise source it returns the next state, the value to
//! report and the phase events worth logging. [`AnomalySimulator`] wraps it
//! with the store I/O: the throttled action check, startup reconciliation
//! and the write loop.

use std::ops::RangeInclusive;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clock::Clock;
use crate::config::SensorIdentity;
use crate::models::SensorReading;
use crate::scheduler::Ticker;
use crate::store::{ActionQuery, EventStore};

// ---

/// Units that cannot go negative; their lower clamp is floored at zero.
const NON_NEGATIVE_UNITS: &[&str] = &["bar", "W", "%"];

/// Margin beyond `[min_value, max_value]` the output may reach.
const CLAMP_MARGIN: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Normal,
    Buildup,
    ThresholdViolation,
    Recovery,
}

impl Phase {
    /// Marker appended to the tick log line.
    pub fn marker(&self) -> &'static str {
        match self {
            Phase::Normal => "",
            Phase::Buildup => " BUILDING UP",
            Phase::ThresholdViolation => " THRESHOLD VIOLATION (waiting for action)",
            Phase::Recovery => " RECOVERING (action triggered)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    High,
    Low,
}

/// Uniform noise amplitudes (half-widths) per phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseProfile {
    pub normal: f64,
    pub ramp: f64,
    pub violation: f64,
}

impl Default for NoiseProfile {
    fn default() -> Self {
        Self {
            normal: 1.5,
            ramp: 0.5,
            violation: 0.8,
        }
    }
}

impl NoiseProfile {
    pub fn silent() -> Self {
        Self {
            normal: 0.0,
            ramp: 0.0,
            violation: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    // ---
    pub unit: String,
    pub min_value: f64,
    pub max_value: f64,
    pub threshold_low: f64,
    pub threshold_high: f64,

    /// Time spent in `normal` before the next excursion starts.
    pub anomaly_cycle: Duration,
    pub buildup: Duration,
    pub recovery: Duration,

    /// How far beyond the threshold an excursion settles.
    pub overshoot: RangeInclusive<f64>,
    pub noise: NoiseProfile,

    /// Minimum spacing between two action queries.
    pub action_poll_interval: Duration,
    /// Actions older than this are ignored while waiting in violation.
    pub action_lookback: Duration,
    /// Actions older than this are ignored by startup reconciliation.
    pub startup_lookback: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            unit: "C".to_string(),
            min_value: 18.0,
            max_value: 30.0,
            threshold_low: 20.0,
            threshold_high: 26.0,
            anomaly_cycle: Duration::minutes(15),
            buildup: Duration::seconds(180),
            recovery: Duration::seconds(120),
            overshoot: 1.0..=3.0,
            noise: NoiseProfile::default(),
            action_poll_interval: Duration::seconds(1),
            action_lookback: Duration::minutes(2),
            startup_lookback: Duration::minutes(5),
        }
    }
}

impl SimulationConfig {
    // ---
    pub fn validate(&self) -> Result<()> {
        // ---
        if !(self.min_value < self.max_value) {
            bail!(
                "MIN_VALUE ({}) must be below MAX_VALUE ({})",
                self.min_value,
                self.max_value
            );
        }
        if !(self.threshold_low < self.threshold_high) {
            bail!(
                "THRESHOLD_LOW ({}) must be below THRESHOLD_HIGH ({})",
                self.threshold_low,
                self.threshold_high
            );
        }
        if !(*self.overshoot.start() > 0.0 && self.overshoot.start() <= self.overshoot.end()) {
            bail!("overshoot range must be positive, got {:?}", self.overshoot);
        }
        Ok(())
    }

    /// Normal operating point.
    pub fn center(&self) -> f64 {
        (self.min_value + self.max_value) / 2.0
    }

    pub fn absolute_min(&self) -> f64 {
        // ---
        let floor = self.min_value - CLAMP_MARGIN;
        if NON_NEGATIVE_UNITS.contains(&self.unit.as_str()) {
            floor.max(0.0)
        } else {
            floor
        }
    }

    pub fn absolute_max(&self) -> f64 {
        self.max_value + CLAMP_MARGIN
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.absolute_min()).min(self.absolute_max())
    }

    pub fn is_out_of_range(&self, value: f64) -> bool {
        value > self.threshold_high || value < self.threshold_low
    }
}

/// Complete simulator state. Transitions go through [`transition`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorState {
    // ---
    pub phase: Phase,
    pub phase_started: DateTime<Utc>,
    pub current_value: f64,

    /// Excursion target while in buildup/violation; recovery start point.
    pub target_value: f64,
    pub anomaly: Option<AnomalyKind>,

    /// Latched by the first matching action; cleared when a cycle starts.
    pub action_detected: bool,
    pub last_action_check: Option<DateTime<Utc>>,
}

impl SimulatorState {
    // ---
    pub fn new(now: DateTime<Utc>, cfg: &SimulationConfig) -> Self {
        Self::seeded(now, cfg, cfg.center())
    }

    /// Start in `normal` at `value` (e.g. the last persisted reading).
    pub fn seeded(now: DateTime<Utc>, cfg: &SimulationConfig, value: f64) -> Self {
        Self {
            phase: Phase::Normal,
            phase_started: now,
            current_value: cfg.clamp(value),
            target_value: cfg.center(),
            anomaly: None,
            action_detected: false,
            last_action_check: None,
        }
    }

    fn enter(&mut self, phase: Phase, now: DateTime<Utc>) {
        self.phase = phase;
        self.phase_started = now;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseEvent {
    AnomalyStarted { kind: AnomalyKind, target: f64 },
    ThresholdReached { target: f64 },
    RecoveryStarted,
    Recovered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: SimulatorState,
    /// Reported value, clamped and rounded to two decimals.
    pub value: f64,
    pub events: Vec<PhaseEvent>,
}

fn noise<R: Rng + ?Sized>(rng: &mut R, amplitude: f64) -> f64 {
    if amplitude > 0.0 {
        rng.gen_range(-amplitude..=amplitude)
    } else {
        0.0
    }
}

/// Linear progress through a phase, in `[0, 1]`. Zero-length phases are
/// complete immediately.
fn progress(elapsed: Duration, total: Duration) -> f64 {
    // ---
    if total <= Duration::zero() {
        return 1.0;
    }
    let ratio = elapsed.num_milliseconds() as f64 / total.num_milliseconds() as f64;
    ratio.clamp(0.0, 1.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Compute the next state and output value.
///
/// `state.action_detected` must already reflect the latest action check;
/// this function performs no I/O.
pub fn transition<R: Rng + ?Sized>(
    state: &SimulatorState,
    now: DateTime<Utc>,
    cfg: &SimulationConfig,
    rng: &mut R,
) -> Transition {
    // ---
    let mut next = state.clone();
    let mut events = Vec::new();
    let elapsed = now - state.phase_started;
    let center = cfg.center();

    let raw = match state.phase {
        Phase::Normal => {
            let value = center + noise(rng, cfg.noise.normal);
            if elapsed >= cfg.anomaly_cycle {
                let kind = if rng.gen_bool(0.5) {
                    AnomalyKind::High
                } else {
                    AnomalyKind::Low
                };
                let overshoot = rng.gen_range(cfg.overshoot.clone());
                next.target_value = match kind {
                    AnomalyKind::High => cfg.threshold_high + overshoot,
                    AnomalyKind::Low => cfg.threshold_low - overshoot,
                };
                next.anomaly = Some(kind);
                next.action_detected = false;
                next.last_action_check = None;
                next.enter(Phase::Buildup, now);
                events.push(PhaseEvent::AnomalyStarted {
                    kind,
                    target: next.target_value,
                });
            }
            value
        }
        Phase::Buildup => {
            let p = progress(elapsed, cfg.buildup);
            let value = center + (state.target_value - center) * p + noise(rng, cfg.noise.ramp);
            if elapsed >= cfg.buildup {
                next.enter(Phase::ThresholdViolation, now);
                events.push(PhaseEvent::ThresholdReached {
                    target: state.target_value,
                });
            }
            value
        }
        Phase::ThresholdViolation => {
            let value = state.target_value + noise(rng, cfg.noise.violation);
            if state.action_detected {
                next.enter(Phase::Recovery, now);
                events.push(PhaseEvent::RecoveryStarted);
            }
            value
        }
        Phase::Recovery => {
            let p = progress(elapsed, cfg.recovery);
            let value = state.target_value
                + (center - state.target_value) * p
                + noise(rng, cfg.noise.ramp);
            if elapsed >= cfg.recovery {
                next.enter(Phase::Normal, now);
                next.target_value = center;
                next.anomaly = None;
                events.push(PhaseEvent::Recovered);
            }
            value
        }
    };

    next.current_value = cfg.clamp(raw);
    Transition {
        value: round2(next.current_value),
        state: next,
        events,
    }
}

/// Drives [`transition`] against a store and a clock.
pub struct AnomalySimulator<R = StdRng> {
    // ---
    cfg: SimulationConfig,
    identity: SensorIdentity,
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    rng: R,
    state: SimulatorState,
}

impl AnomalySimulator<StdRng> {
    pub fn new(
        cfg: SimulationConfig,
        identity: SensorIdentity,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_rng(cfg, identity, store, clock, StdRng::from_entropy())
    }
}

impl<R: Rng + Send> AnomalySimulator<R> {
    // ---
    pub fn with_rng(
        cfg: SimulationConfig,
        identity: SensorIdentity,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        rng: R,
    ) -> Self {
        let state = SimulatorState::new(clock.now(), &cfg);
        Self {
            cfg,
            identity,
            store,
            clock,
            rng,
            state,
        }
    }

    /// Start from a known value instead of the center.
    pub fn seed_value(&mut self, value: f64) {
        self.state = SimulatorState::seeded(self.clock.now(), &self.cfg, value);
    }

    pub fn state(&self) -> &SimulatorState {
        &self.state
    }

    /// Throttled poll for a corrective action on this parameter.
    ///
    /// Queries the store at most once per `action_poll_interval`; between
    /// queries the latched flag is returned. A store error is logged and
    /// treated as "no action yet".
    pub async fn check_for_action(&mut self, now: DateTime<Utc>) -> bool {
        // ---
        if let Some(last) = self.state.last_action_check {
            if now - last < self.cfg.action_poll_interval {
                return self.state.action_detected;
            }
        }
        self.state.last_action_check = Some(now);

        let query =
            ActionQuery::for_parameter(&self.identity.parameter, now - self.cfg.action_lookback);
        match self.store.latest_action(&query).await {
            Ok(Some(found)) if !self.state.action_detected => {
                tracing::info!(
                    action_id = found.id,
                    title = %found.alert_title,
                    "Action detected, starting recovery: {}",
                    found.action
                );
                self.state.action_detected = true;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Error checking for action: {}", e);
            }
        }
        self.state.action_detected
    }

    /// Before the first tick: if a recent action exists and the current value
    /// is out of range, resume directly in `recovery`.
    pub async fn reconcile_on_startup(&mut self) {
        // ---
        let now = self.clock.now();
        let query =
            ActionQuery::for_parameter(&self.identity.parameter, now - self.cfg.startup_lookback);

        let found = match self.store.latest_action(&query).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Could not check for existing action on startup: {}", e);
                return;
            }
        };

        let value = self.state.current_value;
        let Some(found) = found else {
            return;
        };
        if !self.cfg.is_out_of_range(value) {
            tracing::debug!(action_id = found.id, value, "Recent action found, value in range");
            return;
        }

        let kind = if value > self.cfg.threshold_high {
            AnomalyKind::High
        } else {
            AnomalyKind::Low
        };
        tracing::info!(
            action_id = found.id,
            value,
            ?kind,
            "Recent action found and value still out of range, starting in recovery"
        );

        self.state.anomaly = Some(kind);
        self.state.target_value = value;
        self.state.action_detected = true;
        self.state.enter(Phase::Recovery, now);
    }

    /// Advance one tick and produce the reading to persist.
    pub async fn next_reading(&mut self) -> SensorReading {
        // ---
        let now = self.clock.now();
        if self.state.phase == Phase::ThresholdViolation {
            self.check_for_action(now).await;
        }

        let Transition {
            state,
            value,
            events,
        } = transition(&self.state, now, &self.cfg, &mut self.rng);
        self.state = state;

        for event in events {
            log_event(&event);
        }

        SensorReading {
            sensor_name: self.identity.sensor_name.clone(),
            parameter: self.identity.parameter.clone(),
            value,
            unit: self.cfg.unit.clone(),
            recorded_at: now,
        }
    }

    /// Write one reading per tick until the ticker is exhausted.
    ///
    /// A failed write is logged and followed by a reconnect; simulator state
    /// carries over unchanged. Returns the number of readings written.
    pub async fn run<T: Ticker + ?Sized>(&mut self, ticker: &mut T) -> u64 {
        // ---
        let mut written = 0;
        while ticker.tick().await {
            let reading = self.next_reading().await;

            match self.store.insert_reading(&reading).await {
                Ok(()) => {
                    written += 1;
                    tracing::info!(
                        "{} | {}{}{}",
                        reading.recorded_at.format("%H:%M:%S"),
                        reading.value,
                        reading.unit,
                        self.state.phase.marker()
                    );
                }
                Err(e) => {
                    tracing::warn!("Write failed: {}. Reconnecting...", e);
                    if let Err(e) = self.store.reconnect().await {
                        tracing::error!("Reconnect failed, retrying next tick: {}", e);
                    }
                }
            }
        }
        written
    }
}

fn log_event(event: &PhaseEvent) {
    // ---
    match event {
        PhaseEvent::AnomalyStarted { kind, target } => {
            tracing::info!(?kind, "Starting anomaly buildup to {:.1}", target)
        }
        PhaseEvent::ThresholdReached { target } => {
            tracing::warn!("Threshold reached at {:.1}, waiting for action", target)
        }
        PhaseEvent::RecoveryStarted => tracing::info!("Recovery initiated by action"),
        PhaseEvent::Recovered => tracing::info!("Recovered to normal operation"),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 26, 18, 45, 0).unwrap()
    }

    fn cfg() -> SimulationConfig {
        SimulationConfig {
            anomaly_cycle: Duration::zero(),
            buildup: Duration::seconds(10),
            recovery: Duration::seconds(10),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn clamp_respects_unit_floor() {
        // ---
        let temp = SimulationConfig {
            min_value: 2.0,
            ..cfg()
        };
        assert_eq!(temp.absolute_min(), -3.0);

        let pressure = SimulationConfig {
            unit: "bar".into(),
            min_value: 2.0,
            ..cfg()
        };
        assert_eq!(pressure.absolute_min(), 0.0);
        assert_eq!(pressure.clamp(-1.0), 0.0);
        assert_eq!(pressure.clamp(100.0), 35.0);
    }

    #[test]
    fn normal_triggers_buildup_after_cycle() {
        // ---
        let cfg = SimulationConfig {
            anomaly_cycle: Duration::seconds(60),
            ..cfg()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let state = SimulatorState::new(t0(), &cfg);

        let early = transition(&state, t0() + Duration::seconds(59), &cfg, &mut rng);
        assert_eq!(early.state.phase, Phase::Normal);
        assert!((early.value - cfg.center()).abs() <= 1.5 + 1e-9);

        let mut primed = state.clone();
        primed.action_detected = true;
        let due = transition(&primed, t0() + Duration::seconds(60), &cfg, &mut rng);
        assert_eq!(due.state.phase, Phase::Buildup);
        assert!(!due.state.action_detected);
        assert_eq!(due.events.len(), 1);

        let target = due.state.target_value;
        match due.state.anomaly.unwrap() {
            AnomalyKind::High => assert!((27.0..=29.0).contains(&target)),
            AnomalyKind::Low => assert!((17.0..=19.0).contains(&target)),
        }
    }

    #[test]
    fn full_cycle_reaches_violation_beyond_threshold() {
        // ---
        let cfg = cfg();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let state = SimulatorState::new(t0(), &cfg);

            let started = transition(&state, t0(), &cfg, &mut rng);
            assert_eq!(started.state.phase, Phase::Buildup);

            let reached = transition(&started.state, t0() + Duration::seconds(10), &cfg, &mut rng);
            assert_eq!(reached.state.phase, Phase::ThresholdViolation);

            let v = reached.state.current_value;
            match reached.state.anomaly.unwrap() {
                AnomalyKind::High => {
                    let beyond = v - cfg.threshold_high;
                    assert!(beyond > 0.0 && beyond <= 3.5 + 1e-9, "seed {seed}: {v}");
                }
                AnomalyKind::Low => {
                    let beyond = cfg.threshold_low - v;
                    assert!(beyond > 0.0 && beyond <= 3.5 + 1e-9, "seed {seed}: {v}");
                }
            }
        }
    }

    #[test]
    fn violation_holds_without_action() {
        // ---
        let cfg = cfg();
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = SimulatorState::new(t0(), &cfg);
        state.phase = Phase::ThresholdViolation;
        state.target_value = 28.0;
        state.anomaly = Some(AnomalyKind::High);

        let later = transition(&state, t0() + Duration::hours(12), &cfg, &mut rng);
        assert_eq!(later.state.phase, Phase::ThresholdViolation);
        assert!((later.value - 28.0).abs() <= 0.8 + 0.005);

        state.action_detected = true;
        let acted = transition(&state, t0() + Duration::seconds(1), &cfg, &mut rng);
        assert_eq!(acted.state.phase, Phase::Recovery);
        assert_eq!(acted.events, vec![PhaseEvent::RecoveryStarted]);
        assert!(acted.state.action_detected);
    }

    #[test]
    fn recovery_converges_to_center() {
        // ---
        let cfg = SimulationConfig {
            noise: NoiseProfile::silent(),
            ..cfg()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = SimulatorState::new(t0(), &cfg);
        state.phase = Phase::Recovery;
        state.target_value = 28.4;
        state.anomaly = Some(AnomalyKind::High);

        let half = transition(&state, t0() + Duration::seconds(5), &cfg, &mut rng);
        assert_eq!(half.state.phase, Phase::Recovery);
        assert!((half.value - 26.2).abs() < 1e-9);

        let done = transition(&half.state, t0() + Duration::seconds(10), &cfg, &mut rng);
        assert_eq!(done.state.phase, Phase::Normal);
        assert!((done.value - cfg.center()).abs() < 1e-6);
        assert_eq!(done.state.target_value, cfg.center());
        assert_eq!(done.state.anomaly, None);
    }

    #[test]
    fn output_always_within_clamp() {
        // ---
        let cfg = SimulationConfig {
            unit: "bar".into(),
            min_value: 1.5,
            max_value: 3.5,
            threshold_low: 1.8,
            threshold_high: 3.2,
            overshoot: 4.0..=9.0,
            ..cfg()
        };
        let mut rng = StdRng::seed_from_u64(42);
        let mut state = SimulatorState::new(t0(), &cfg);
        let mut now = t0();

        for tick in 0..2_000 {
            now += Duration::seconds(1);
            if state.phase == Phase::ThresholdViolation && tick % 7 == 0 {
                state.action_detected = true;
            }
            let step = transition(&state, now, &cfg, &mut rng);
            assert!(step.value >= cfg.absolute_min() && step.value <= cfg.absolute_max());
            assert!(step.value >= 0.0);
            state = step.state;
        }
    }

    #[test]
    fn target_stays_beyond_threshold_during_excursion() {
        // ---
        let cfg = cfg();
        let mut rng = StdRng::seed_from_u64(9);
        let mut state = SimulatorState::new(t0(), &cfg);
        let mut now = t0();

        for _ in 0..200 {
            now += Duration::seconds(2);
            let step = transition(&state, now, &cfg, &mut rng);
            state = step.state;
            if matches!(state.phase, Phase::Buildup | Phase::ThresholdViolation) {
                match state.anomaly.unwrap() {
                    AnomalyKind::High => assert!(state.target_value > cfg.threshold_high),
                    AnomalyKind::Low => assert!(state.target_value < cfg.threshold_low),
                }
                state.action_detected = state.phase == Phase::ThresholdViolation;
            }
        }
    }

    #[test]
    fn zero_length_phases_complete_immediately() {
        assert_eq!(progress(Duration::zero(), Duration::zero()), 1.0);
        assert_eq!(progress(Duration::seconds(5), Duration::seconds(10)), 0.5);
        assert_eq!(progress(Duration::seconds(50), Duration::seconds(10)), 1.0);
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        // ---
        let inverted = SimulationConfig {
            threshold_low: 27.0,
            ..cfg()
        };
        assert!(inverted.validate().is_err());
        assert!(cfg().validate().is_ok());
    }
}
