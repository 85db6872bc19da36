//! ESP32 firmware-specific modules for gardeneye
//!
//! This crate contains the hardware side of the node that cannot compile on
//! desktop targets: RTC-retained state placement, the ADC front end, the
//! Wi-Fi link, the HTTP transport and deep sleep.

#![no_std]

pub mod frontend;
pub mod http;
pub mod retained;
pub mod sleep;
pub mod wifi;
pub mod wifi_secrets;
