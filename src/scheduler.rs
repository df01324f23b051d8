//! Tick sources for the producer loop.
//!
//! [`IntervalTicker`] wraps `tokio::time::interval` for production use.
//! [`ManualTicker`] advances a [`ManualClock`] by a fixed step per tick and
//! stops after a set number of ticks, so a whole anomaly cycle can be
//! replayed in a test without real delays.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{Interval, MissedTickBehavior};

use crate::clock::ManualClock;

// ---

#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick. Returns `false` when the schedule is exhausted.
    async fn tick(&mut self) -> bool;
}

pub struct IntervalTicker {
    // ---
    interval: Interval,
}

impl IntervalTicker {
    // ---
    pub fn new(period: std::time::Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        // A slow store write should push the schedule back, not trigger a burst.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Ticks `remaining` times, advancing `clock` by `step` before every tick
/// except the first (mirroring `Interval`, whose first tick is immediate).
pub struct ManualTicker {
    // ---
    clock: Arc<ManualClock>,
    step: chrono::Duration,
    remaining: u64,
    started: bool,
}

impl ManualTicker {
    // ---
    pub fn new(clock: Arc<ManualClock>, step: chrono::Duration, ticks: u64) -> Self {
        Self {
            clock,
            step,
            remaining: ticks,
            started: false,
        }
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        if self.started {
            self.clock.advance(self.step);
        }
        self.started = true;
        self.remaining -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::clock::Clock;
    use chrono::{TimeZone, Utc};

    #[test]
    fn manual_ticker_advances_between_ticks_and_stops() {
        // ---
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let mut ticker = ManualTicker::new(clock.clone(), chrono::Duration::seconds(5), 3);

        tokio_test::block_on(async {
            assert!(ticker.tick().await);
            assert_eq!(clock.now(), start);
            assert!(ticker.tick().await);
            assert!(ticker.tick().await);
            assert_eq!(clock.now() - start, chrono::Duration::seconds(10));
            assert!(!ticker.tick().await);
        });
        assert_eq!(clock.now() - start, chrono::Duration::seconds(10));
    }
}
