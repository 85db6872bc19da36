use core::fmt::Display;

use serde::{Deserialize, Serialize};

/// One sample of the three channels, taken on a single wake
///
/// Immutable once created; the [`ReadingStore`](super::ReadingStore) owns it
/// after a push.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// Seconds since epoch, as reconstructed by the timebase
    pub timestamp: u64,
    /// Relative humidity in percent
    pub humidity: f32,
    /// Temperature in degrees Celsius
    pub temperature: f32,
    /// Battery voltage in volts
    pub battery: f32,
}

impl Reading {
    pub const ZERO: Self = Self::new(0, 0.0, 0.0, 0.0);

    pub const fn new(timestamp: u64, humidity: f32, temperature: f32, battery: f32) -> Self {
        Self {
            timestamp,
            humidity,
            temperature,
            battery,
        }
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[Reading] timestamp: {}, humidity: {:.1}%, temperature: {:.1}°C, battery: {:.2} V",
            self.timestamp, self.humidity, self.temperature, self.battery
        )
    }
}
