//! Wall-clock reconstruction across deep sleep
//!
//! The node has no battery-backed real-time clock. Wall-clock time is
//! rebuilt on every wake from a retained `base_time` plus the monotonic
//! seconds elapsed since this wake started. Before each timed sleep the base
//! is advanced to the expected start of the next wake, normally one sampling
//! interval and longer when the wake itself overran it. Every successful time sync
//! re-anchors it to the collector's clock, which removes the drift the sleep
//! timer accumulated.

use embassy_time::Duration;
use log::info;
use serde::{Deserialize, Serialize};

/// Monotonic seconds since the current wake started
pub trait Uptime {
    fn uptime_secs(&self) -> u64;
}

/// Authoritative time as reported by the collector
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSync {
    /// Collector wall-clock time, seconds since epoch
    pub base_time: u64,
    /// When the collector wants to be asked again, seconds since epoch
    pub next_sync: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timebase {
    /// Wall-clock time at uptime zero of the current wake
    base_time: u64,
    /// Zero until the first sync
    next_sync: u64,
}

impl Timebase {
    pub const fn new() -> Self {
        Self {
            base_time: 0,
            next_sync: 0,
        }
    }

    /// Current wall-clock time in seconds since epoch
    pub fn current_time(&self, uptime: &impl Uptime) -> u64 {
        self.base_time.saturating_add(uptime.uptime_secs())
    }

    /// Move the anchor to the expected start of the next wake.
    pub fn advance_base_time_by_interval(&mut self, interval: Duration) {
        self.base_time = self.base_time.saturating_add(interval.as_secs());
    }

    /// Replace the anchor and the sync hint with collector values, so that
    /// [`current_time`](Self::current_time) reads `sync.base_time` right now.
    pub fn apply_sync(&mut self, sync: TimeSync, uptime: &impl Uptime) {
        let previous = self.current_time(uptime);
        self.base_time = sync.base_time.saturating_sub(uptime.uptime_secs());
        self.next_sync = sync.next_sync;

        info!(
            "Time synced: {} (drift {}s), next sync at {}",
            sync.base_time,
            sync.base_time as i64 - previous as i64,
            sync.next_sync
        );
    }

    /// Whether the collector should be asked for the time on this wake.
    /// A node that never synced always asks.
    pub fn needs_sync(&self, uptime: &impl Uptime) -> bool {
        self.next_sync == 0 || self.current_time(uptime) >= self.next_sync
    }

    pub const fn base_time(&self) -> u64 {
        self.base_time
    }

    pub const fn next_sync(&self) -> u64 {
        self.next_sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeUptime;

    fn synced(base_time: u64, next_sync: u64) -> Timebase {
        let mut timebase = Timebase::new();
        timebase.apply_sync(
            TimeSync {
                base_time,
                next_sync,
            },
            &FakeUptime::new(0),
        );
        timebase
    }

    #[test]
    fn current_time_adds_uptime() {
        let timebase = synced(1_000, 2_000);
        assert_eq!(timebase.current_time(&FakeUptime::new(0)), 1_000);
        assert_eq!(timebase.current_time(&FakeUptime::new(7)), 1_007);
    }

    #[test]
    fn advance_adds_exactly_one_interval_each_time() {
        let mut timebase = synced(1_000, 2_000);
        let uptime = FakeUptime::new(3);
        let interval = Duration::from_secs(10);

        for step in 1..=5 {
            let before = timebase.current_time(&uptime);
            timebase.advance_base_time_by_interval(interval);
            assert_eq!(timebase.current_time(&uptime), before + 10, "step {step}");
        }
        assert_eq!(timebase.base_time(), 1_050);
    }

    #[test]
    fn sync_anchors_to_server_time_mid_wake() {
        let mut timebase = synced(1_000, 2_000);
        let uptime = FakeUptime::new(4);

        timebase.apply_sync(
            TimeSync {
                base_time: 5_000,
                next_sync: 8_600,
            },
            &uptime,
        );

        assert_eq!(timebase.current_time(&uptime), 5_000);
        assert_eq!(timebase.base_time(), 4_996);
        assert_eq!(timebase.next_sync(), 8_600);
    }

    #[test]
    fn needs_sync_when_unset_or_due() {
        let uptime = FakeUptime::new(0);
        assert!(Timebase::new().needs_sync(&uptime));

        let mut timebase = synced(1_000, 1_030);
        assert!(!timebase.needs_sync(&uptime));

        timebase.advance_base_time_by_interval(Duration::from_secs(20));
        assert!(!timebase.needs_sync(&uptime));
        timebase.advance_base_time_by_interval(Duration::from_secs(10));
        assert!(timebase.needs_sync(&uptime));
    }
}
