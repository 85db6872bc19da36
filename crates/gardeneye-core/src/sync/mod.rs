//! Collector protocol
//!
//! The wireless link and the HTTP transport are collaborators provided by
//! the firmware (or the simulator). This module defines their contracts and
//! the [`SyncClient`] that runs the three exchanges on top of them.

pub mod client;

pub use client::*;

use core::fmt::Write;

use heapless::String;
use thiserror_no_std::Error;

use crate::config::{READINGS_PATH, REGISTER_PATH, TIME_PATH};

/// The three request/response exchanges offered by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `GET`, answers with a time-sync document
    Time,
    /// `POST` with an empty body, idempotent on the collector side
    Register,
    /// `POST` with an upload document
    Readings,
}

impl Endpoint {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Time => TIME_PATH,
            Self::Register => REGISTER_PATH,
            Self::Readings => READINGS_PATH,
        }
    }
}

/// HTTP status of a completed exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u16);

impl Status {
    pub const OK: Self = Self(200);

    /// Only a 2xx answer counts as an acknowledgment.
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("could not reach the collector")]
    Unreachable,
    #[error("connection dropped mid-exchange")]
    Io,
    #[error("response does not fit the receive buffer")]
    ResponseTooLarge,
    #[error("response is not valid HTTP")]
    BadResponse,
}

/// Request/response exchanges with the collector
///
/// Implementations attach the device identity and credentials, and bound
/// every exchange by a timeout. A timeout is an error, whatever the
/// collector did with the request.
pub trait Transport {
    /// Fetch `endpoint`; the body lands in `response` and its length is
    /// returned with the status.
    fn get(
        &mut self,
        endpoint: Endpoint,
        response: &mut [u8],
    ) -> impl Future<Output = Result<(Status, usize), TransportError>>;

    /// Send `body` to `endpoint`.
    fn post(
        &mut self,
        endpoint: Endpoint,
        body: &[u8],
    ) -> impl Future<Output = Result<Status, TransportError>>;
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("association did not complete in time")]
    Timeout,
    #[error("access point rejected the station")]
    Rejected,
    #[error("radio failure")]
    Radio,
}

/// Wireless link bring-up and teardown
pub trait WirelessLink {
    /// Associate and obtain an address, bounded by the connection budget.
    fn connect(&mut self) -> impl Future<Output = Result<(), LinkError>>;

    /// Leave the network and power the radio down.
    fn disconnect(&mut self) -> impl Future<Output = ()>;
}

/// Device identity sent with every request: the station MAC address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceId(String<17>);

impl DeviceId {
    pub fn from_mac(mac: [u8; 6]) -> Self {
        let mut text = String::new();
        for (i, byte) in mac.iter().enumerate() {
            if i > 0 {
                let _ = text.push(':');
            }
            // 17 bytes is exactly six octets and five separators
            let _ = write!(text, "{byte:02X}");
        }
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_formats_mac() {
        let id = DeviceId::from_mac([0x24, 0x0a, 0xc4, 0x00, 0xff, 0x1b]);
        assert_eq!(id.as_str(), "24:0A:C4:00:FF:1B");
    }

    #[test]
    fn only_2xx_acknowledges() {
        assert!(Status::OK.is_success());
        assert!(Status(204).is_success());
        assert!(!Status(199).is_success());
        assert!(!Status(301).is_success());
        assert!(!Status(500).is_success());
    }

    #[test]
    fn endpoints_map_to_collector_paths() {
        assert_eq!(Endpoint::Time.path(), "/api/time");
        assert_eq!(Endpoint::Register.path(), "/api/register");
        assert_eq!(Endpoint::Readings.path(), "/api/readings");
    }
}
