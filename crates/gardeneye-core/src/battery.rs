//! Battery safety cutoff
//!
//! Deep-discharging the cell damages it, so the first reading below the
//! critical voltage latches a flag in retained memory. From then on every
//! wake ends before any sensing or networking. Only a power cycle clears
//! the flag.

use log::error;
use serde::{Deserialize, Serialize};

use crate::controller::SleepPlan;
use crate::storage::Reading;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatteryGuard {
    critical_battery_detected: bool,
}

impl BatteryGuard {
    pub const fn new() -> Self {
        Self {
            critical_battery_detected: false,
        }
    }

    /// Latch the critical flag if `reading` is below `critical_v`.
    pub fn update_status(&mut self, reading: &Reading, critical_v: f32) {
        if reading.battery < critical_v && !self.critical_battery_detected {
            error!(
                "Battery critical: {:.2} V < {:.2} V, halting until power cycle",
                reading.battery, critical_v
            );
            self.critical_battery_detected = true;
        }
    }

    pub const fn is_critical(&self) -> bool {
        self.critical_battery_detected
    }

    /// The sleep to enter instead of running the cycle, if the flag is set
    pub const fn halt_if_critical(&self) -> Option<SleepPlan> {
        if self.critical_battery_detected {
            Some(SleepPlan::Indefinite)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CRITICAL_V;

    fn with_battery(volts: f32) -> Reading {
        Reading::new(0, 50.0, 20.0, volts)
    }

    #[test]
    fn healthy_battery_does_not_halt() {
        let mut guard = BatteryGuard::new();
        guard.update_status(&with_battery(3.7), CRITICAL_V);
        guard.update_status(&with_battery(CRITICAL_V), CRITICAL_V);

        assert!(!guard.is_critical());
        assert_eq!(guard.halt_if_critical(), None);
    }

    #[test]
    fn flag_latches_and_never_clears() {
        let mut guard = BatteryGuard::new();
        guard.update_status(&with_battery(2.95), CRITICAL_V);
        assert_eq!(guard.halt_if_critical(), Some(SleepPlan::Indefinite));

        for volts in [4.2, 3.7, 3.01, 5.0] {
            guard.update_status(&with_battery(volts), CRITICAL_V);
            assert!(guard.is_critical(), "cleared by {volts} V");
        }
    }

    #[test]
    fn implausible_reading_still_evaluated() {
        let mut guard = BatteryGuard::new();
        guard.update_status(&with_battery(-1.0), CRITICAL_V);
        assert!(guard.is_critical());
    }
}
