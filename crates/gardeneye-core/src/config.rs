//! Device configuration
//!
//! Compile-time constants of the node plus the serde-derived runtime
//! configuration assembled by the firmware (from build-time secrets) or the
//! simulator.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::sensors::Calibration;

/// Capacity of the retained reading ring
pub const MAX_SENSOR_READINGS: usize = 24;
/// Seconds between two samples
pub const SAMPLING_INTERVAL_S: u64 = 10;
/// Buffered readings that trigger an upload attempt
pub const MIN_SYNC_SAMPLES: usize = 12;
/// Upper bound for Wi-Fi association and DHCP
pub const MAX_CONNECTION_TIME_S: u64 = 30;
/// Upper bound for one HTTP exchange
pub const HTTP_TIMEOUT_S: u64 = 10;
/// Delay before a failed first-time setup is retried
pub const RETRY_SETUP_S: u64 = 10;

/// Largest JSON document the node will produce or accept
pub const MAX_JSON_SIZE: usize = 4 * 1024;
/// Longest scalar or string token allowed inside a JSON document
pub const MAX_FIELD_LENGTH: usize = 32;

/// Battery voltage below which the node halts for good
pub const CRITICAL_V: f32 = 3.0;

/// ADC reference voltage, equivalent to [`MAX_ANALOG`]
pub const MAX_V: f32 = 3.3;
/// Full-scale reading of the 12-bit ADC
pub const MAX_ANALOG: u16 = 4095;
/// Number of ADC conversions averaged per channel
pub const ANALOG_ACCURACY: u16 = 10;
/// Ratio of the battery voltage divider
pub const DIVIDER_CORRECTIVE_FACTOR: f32 = 2.0;

/// Collector endpoints, relative to the server root
pub const TIME_PATH: &str = "/api/time";
pub const REGISTER_PATH: &str = "/api/register";
pub const READINGS_PATH: &str = "/api/readings";

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    pub internet: InternetConfig<'a>,
    pub server: ServerConfig<'a>,
    #[serde(default)]
    pub sampling: SamplingConfig,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ServerConfig<'a> {
    /// Hostname of the collector, plain HTTP on port 80
    pub hostname: &'a str,
    /// Bearer token expected by the collector
    pub api_key: &'a str,
}

/// Timing and threshold policy of the wake cycle
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SamplingConfig {
    pub interval_s: u64,
    pub sync_threshold: usize,
    pub setup_retry_s: u64,
    pub critical_v: f32,
    pub calibration: Calibration,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_s: SAMPLING_INTERVAL_S,
            sync_threshold: MIN_SYNC_SAMPLES,
            setup_retry_s: RETRY_SETUP_S,
            critical_v: CRITICAL_V,
            calibration: Calibration::DEFAULT,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sampling interval must be at least one second")]
    ZeroInterval,
    #[error("sync threshold {0} must be between 1 and the ring capacity")]
    SyncThreshold(usize),
}

impl SamplingConfig {
    /// Reject policies that would make eviction the normal path instead of
    /// the outage fallback.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_s == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.sync_threshold == 0 || self.sync_threshold >= MAX_SENSOR_READINGS {
            return Err(ConfigError::SyncThreshold(self.sync_threshold));
        }
        Ok(())
    }

    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_s)
    }

    pub const fn setup_retry(&self) -> Duration {
        Duration::from_secs(self.setup_retry_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        let config = SamplingConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.interval(), Duration::from_secs(SAMPLING_INTERVAL_S));
    }

    #[test]
    fn threshold_must_stay_below_capacity() {
        let config = SamplingConfig {
            sync_threshold: MAX_SENSOR_READINGS,
            ..SamplingConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SyncThreshold(MAX_SENSOR_READINGS))
        );

        let config = SamplingConfig {
            interval_s: 0,
            ..SamplingConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));
    }

    #[test]
    fn config_loads_from_json_without_sampling_section() {
        let json = br#"{
            "internet": { "ssid": "garden", "password": "hunter2" },
            "server": { "hostname": "gardeneye.local", "api_key": "secret" }
        }"#;

        let (config, _) = serde_json_core::from_slice::<Config<'_>>(json).unwrap();

        assert_eq!(config.internet.ssid, "garden");
        assert_eq!(config.server.hostname, "gardeneye.local");
        assert_eq!(config.sampling, SamplingConfig::default());
    }
}
