//! Analog sensing front end
//!
//! The node reads three analog channels. The hardware side (ADC pins, the
//! sensor power switch) sits behind [`AnalogFrontEnd`]; this module owns the
//! averaging and the conversion from raw counts to physical units.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{ANALOG_ACCURACY, DIVIDER_CORRECTIVE_FACTOR, MAX_ANALOG, MAX_V};
use crate::storage::Reading;

/// The three fixed channels of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Humidity,
    Temperature,
    Battery,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Humidity, Channel::Temperature, Channel::Battery];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Humidity => "humidity",
            Self::Temperature => "temperature",
            Self::Battery => "battery",
        }
    }
}

/// Hardware access needed to take one reading.
///
/// A conversion always yields a value; implausible values are passed through
/// and judged by the caller.
pub trait AnalogFrontEnd {
    /// Switch the sensor supply rail.
    fn set_power(&mut self, on: bool) -> impl Future<Output = ()>;

    /// One raw ADC conversion of `channel`, in counts (0..=MAX_ANALOG).
    fn read_raw(&mut self, channel: Channel) -> impl Future<Output = u16>;
}

/// Linear mapping from volts at the pin to the physical unit
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LinearCalibration {
    pub gain: f32,
    pub offset: f32,
}

impl LinearCalibration {
    pub const fn new(gain: f32, offset: f32) -> Self {
        Self { gain, offset }
    }

    pub fn apply(&self, volts: f32) -> f32 {
        self.gain * volts + self.offset
    }
}

/// Per-channel calibration of the node
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Percent relative humidity, ratiometric to the ADC reference
    pub humidity: LinearCalibration,
    /// Degrees Celsius, 10 mV/°C with a 500 mV offset
    pub temperature: LinearCalibration,
    /// Volts at the cell, behind the divider
    pub battery: LinearCalibration,
}

impl Calibration {
    pub const DEFAULT: Self = Self {
        humidity: LinearCalibration::new(100.0 / MAX_V, 0.0),
        temperature: LinearCalibration::new(100.0, -50.0),
        battery: LinearCalibration::new(DIVIDER_CORRECTIVE_FACTOR, 0.0),
    };

    pub const fn for_channel(&self, channel: Channel) -> LinearCalibration {
        match channel {
            Channel::Humidity => self.humidity,
            Channel::Temperature => self.temperature,
            Channel::Battery => self.battery,
        }
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Convert an (averaged) ADC count to volts at the pin.
pub fn raw_to_volts(raw: f32) -> f32 {
    raw / f32::from(MAX_ANALOG) * MAX_V
}

/// Sensor bank bound to a concrete front end
pub struct SensorBank<A> {
    frontend: A,
    calibration: Calibration,
}

impl<A: AnalogFrontEnd> SensorBank<A> {
    pub fn new(frontend: A, calibration: Calibration) -> Self {
        Self {
            frontend,
            calibration,
        }
    }

    /// Power the sensors, read every channel and power them down again.
    pub async fn sample(&mut self, timestamp: u64) -> Reading {
        self.frontend.set_power(true).await;

        let humidity = self.read_channel(Channel::Humidity).await;
        let temperature = self.read_channel(Channel::Temperature).await;
        let battery = self.read_channel(Channel::Battery).await;

        self.frontend.set_power(false).await;

        Reading::new(timestamp, humidity, temperature, battery)
    }

    async fn read_channel(&mut self, channel: Channel) -> f32 {
        let mut total = 0u32;
        for _ in 0..ANALOG_ACCURACY {
            total += u32::from(self.frontend.read_raw(channel).await.min(MAX_ANALOG));
        }
        let average = total as f32 / f32::from(ANALOG_ACCURACY);
        let value = self
            .calibration
            .for_channel(channel)
            .apply(raw_to_volts(average));

        debug!("{}: {} counts -> {}", channel.label(), average, value);
        value
    }

    pub fn frontend(&self) -> &A {
        &self.frontend
    }

    pub fn frontend_mut(&mut self) -> &mut A {
        &mut self.frontend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeFrontEnd;
    use embassy_futures::block_on;

    #[test]
    fn full_scale_is_reference_voltage() {
        assert_eq!(raw_to_volts(f32::from(MAX_ANALOG)), MAX_V);
        assert_eq!(raw_to_volts(0.0), 0.0);
    }

    #[test]
    fn sample_powers_sensors_around_the_reads() {
        let mut bank = SensorBank::new(FakeFrontEnd::new(3.9), Calibration::DEFAULT);

        let reading = block_on(bank.sample(1_000));

        assert_eq!(reading.timestamp, 1_000);
        assert_eq!(bank.frontend().power_events, [true, false]);
        assert!(!bank.frontend().powered);
        assert_eq!(
            bank.frontend().reads,
            3 * usize::from(ANALOG_ACCURACY),
            "every channel is averaged over ANALOG_ACCURACY conversions"
        );
    }

    #[test]
    fn battery_goes_through_the_divider() {
        let mut bank = SensorBank::new(FakeFrontEnd::new(3.6), Calibration::DEFAULT);

        let reading = block_on(bank.sample(0));

        assert!((reading.battery - 3.6).abs() < 0.01, "got {}", reading.battery);
    }

    #[test]
    fn averaging_smooths_alternating_counts() {
        let mut frontend = FakeFrontEnd::new(3.6);
        frontend.jitter = 100;
        let mut bank = SensorBank::new(frontend, Calibration::DEFAULT);

        let reading = block_on(bank.sample(0));

        assert!((reading.battery - 3.6).abs() < 0.01, "got {}", reading.battery);
    }
}
