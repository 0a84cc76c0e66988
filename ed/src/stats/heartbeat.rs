//! Heartbeat interval and pause control

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeartbeatError {
    #[error("Heartbeat interval must be -1 (disabled) or greater, got {0}")]
    BadInterval(i64),
}

/// Heartbeat settings shared between the collector loop and its owner
///
/// The interval is stored in ticks, the collector's receive timeout. Zero
/// ticks disables heartbeats.
#[derive(Debug)]
pub struct HeartbeatControl {
    ticks: AtomicU32,
    paused: AtomicBool,
    tick: Duration,
}

impl HeartbeatControl {
    pub fn new(tick: Duration, interval_secs: i64) -> Result<Self, HeartbeatError> {
        let tick = tick.max(Duration::from_millis(1));
        Ok(Self {
            ticks: AtomicU32::new(to_ticks(interval_secs, tick)?),
            paused: AtomicBool::new(false),
            tick,
        })
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Idle ticks before a heartbeat; 0 when disabled
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Set the interval in seconds: -1 disables, 0 is one tick, anything
    /// else rounds up to whole ticks
    pub fn set_interval(&self, secs: i64) -> Result<(), HeartbeatError> {
        let ticks = to_ticks(secs, self.tick)?;
        self.ticks.store(ticks, Ordering::Relaxed);
        Ok(())
    }

    /// The interval in seconds as it is actually applied
    pub fn interval_secs(&self) -> i64 {
        match self.ticks() {
            0 => -1,
            ticks => {
                let millis = u128::from(ticks) * self.tick.as_millis();
                millis.div_ceil(1000).try_into().unwrap_or(i64::MAX)
            }
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Whether `idle` ticks without traffic call for a heartbeat now
    pub fn due(&self, idle: u32) -> bool {
        let ticks = self.ticks();
        ticks > 0 && idle >= ticks && !self.is_paused()
    }
}

fn to_ticks(secs: i64, tick: Duration) -> Result<u32, HeartbeatError> {
    match secs {
        -1 => Ok(0),
        0 => Ok(1),
        s if s > 0 => {
            let millis = u128::from(s.unsigned_abs()) * 1000;
            let ticks = millis.div_ceil(tick.as_millis().max(1));
            Ok(ticks.try_into().unwrap_or(u32::MAX))
        }
        s => Err(HeartbeatError::BadInterval(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_interval_conversion() {
        let control = HeartbeatControl::new(SECOND, 2).unwrap();
        assert_eq!(control.ticks(), 2);
        assert_eq!(control.interval_secs(), 2);

        control.set_interval(-1).unwrap();
        assert_eq!(control.ticks(), 0);
        assert_eq!(control.interval_secs(), -1);

        control.set_interval(0).unwrap();
        assert_eq!(control.ticks(), 1);
        assert_eq!(control.interval_secs(), 1);
    }

    #[test]
    fn test_interval_rounds_up_to_whole_ticks() {
        let control = HeartbeatControl::new(Duration::from_millis(1500), 2).unwrap();
        assert_eq!(control.ticks(), 2);
        assert_eq!(control.interval_secs(), 3);
    }

    #[test]
    fn test_reject_below_disabled() {
        let control = HeartbeatControl::new(SECOND, 5).unwrap();
        assert_eq!(control.set_interval(-2), Err(HeartbeatError::BadInterval(-2)));
        assert_eq!(control.ticks(), 5);
        assert!(HeartbeatControl::new(SECOND, -7).is_err());
    }

    #[test]
    fn test_due_respects_pause_and_disable() {
        let control = HeartbeatControl::new(SECOND, 2).unwrap();
        assert!(!control.due(1));
        assert!(control.due(2));

        control.pause();
        assert!(!control.due(5));
        control.resume();
        assert!(control.due(5));

        control.set_interval(-1).unwrap();
        assert!(!control.due(100));
    }
}
