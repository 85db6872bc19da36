//! ADC1 front end of the sensor board
//!
//! | Signal      | GPIO | Direction |
//! |-------------|------|-----------|
//! | Humidity    | 35   | ADC1      |
//! | Temperature | 33   | ADC1      |
//! | Battery     | 32   | ADC1, behind a 1:2 divider |
//! | Sensor power| 13   | output    |

use embassy_time::{Duration, Timer};
use esp_hal::Blocking;
use esp_hal::analog::adc::{Adc, AdcConfig, AdcPin, Attenuation};
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::peripherals::{ADC1, GPIO13, GPIO32, GPIO33, GPIO35};
use gardeneye_core::sensors::{AnalogFrontEnd, Channel};
use log::warn;

/// Settling time of the sensors after the power pin goes high
const POWER_UP_DELAY: Duration = Duration::from_millis(50);

pub struct AdcFrontEnd<'d> {
    adc: Adc<'d, ADC1<'d>, Blocking>,
    humidity: AdcPin<GPIO35<'d>, ADC1<'d>>,
    temperature: AdcPin<GPIO33<'d>, ADC1<'d>>,
    battery: AdcPin<GPIO32<'d>, ADC1<'d>>,
    power: Output<'d>,
}

impl<'d> AdcFrontEnd<'d> {
    pub fn new(
        adc1: ADC1<'d>,
        humidity: GPIO35<'d>,
        temperature: GPIO33<'d>,
        battery: GPIO32<'d>,
        power: GPIO13<'d>,
    ) -> Self {
        // 11 dB covers the full 0..3.3 V swing
        let mut config = AdcConfig::new();
        let humidity = config.enable_pin(humidity, Attenuation::_11dB);
        let temperature = config.enable_pin(temperature, Attenuation::_11dB);
        let battery = config.enable_pin(battery, Attenuation::_11dB);

        Self {
            adc: Adc::new(adc1, config),
            humidity,
            temperature,
            battery,
            power: Output::new(power, Level::Low, OutputConfig::default()),
        }
    }
}

impl AnalogFrontEnd for AdcFrontEnd<'_> {
    async fn set_power(&mut self, on: bool) {
        self.power.set_level(Level::from(on));
        if on {
            Timer::after(POWER_UP_DELAY).await;
        }
    }

    async fn read_raw(&mut self, channel: Channel) -> u16 {
        let result = match channel {
            Channel::Humidity => nb::block!(self.adc.read_oneshot(&mut self.humidity)),
            Channel::Temperature => nb::block!(self.adc.read_oneshot(&mut self.temperature)),
            Channel::Battery => nb::block!(self.adc.read_oneshot(&mut self.battery)),
        };

        result.unwrap_or_else(|_| {
            warn!("ADC read of {} failed", channel.label());
            0
        })
    }
}
