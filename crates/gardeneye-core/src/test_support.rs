//! In-memory collaborators for unit and scenario tests

use core::cell::Cell;

use crate::codec::{self, UploadBatch};
use crate::config::{DIVIDER_CORRECTIVE_FACTOR, MAX_ANALOG, MAX_V};
use crate::sensors::{AnalogFrontEnd, Channel};
use crate::sync::{Endpoint, LinkError, Status, Transport, TransportError, WirelessLink};
use crate::timebase::{TimeSync, Uptime};

pub struct FakeUptime(Cell<u64>);

impl FakeUptime {
    pub fn new(secs: u64) -> Self {
        Self(Cell::new(secs))
    }

    pub fn set(&self, secs: u64) {
        self.0.set(secs);
    }
}

impl Uptime for FakeUptime {
    fn uptime_secs(&self) -> u64 {
        self.0.get()
    }
}

/// Front end producing fixed counts; battery counts are derived from a
/// target cell voltage.
pub struct FakeFrontEnd {
    pub battery_volts: f32,
    pub jitter: u16,
    pub powered: bool,
    pub power_events: Vec<bool>,
    pub reads: usize,
}

impl FakeFrontEnd {
    pub fn new(battery_volts: f32) -> Self {
        Self {
            battery_volts,
            jitter: 0,
            powered: false,
            power_events: Vec::new(),
            reads: 0,
        }
    }

    fn battery_counts(&self) -> u16 {
        let pin = self.battery_volts / DIVIDER_CORRECTIVE_FACTOR;
        (pin / MAX_V * f32::from(MAX_ANALOG)).round() as u16
    }
}

impl AnalogFrontEnd for FakeFrontEnd {
    async fn set_power(&mut self, on: bool) {
        self.powered = on;
        self.power_events.push(on);
    }

    async fn read_raw(&mut self, channel: Channel) -> u16 {
        assert!(self.powered, "{} read while sensors unpowered", channel.label());
        let base = match channel {
            Channel::Humidity => 2048,
            Channel::Temperature => 930,
            Channel::Battery => self.battery_counts(),
        };
        let value = if self.reads % 2 == 0 {
            base + self.jitter
        } else {
            base - self.jitter
        };
        self.reads += 1;
        value
    }
}

#[derive(Default)]
pub struct FakeLink {
    pub fail: bool,
    pub connected: bool,
    pub connects: usize,
    pub disconnects: usize,
}

impl WirelessLink for FakeLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        self.connects += 1;
        if self.fail {
            return Err(LinkError::Timeout);
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.disconnects += 1;
        self.connected = false;
    }
}

/// How the fake collector answers one endpoint
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Status(u16),
    Fail(TransportError),
    /// 200 with this body instead of a well-formed document
    Body(&'static [u8]),
}

pub struct FakeCollector {
    pub time: TimeSync,
    pub time_reply: Reply,
    pub register_reply: Reply,
    pub readings_reply: Reply,
    pub requests: Vec<Endpoint>,
    /// Every upload that reached the collector, acknowledged or not
    pub received: Vec<UploadBatch>,
}

impl FakeCollector {
    pub fn new(base_time: u64, next_sync: u64) -> Self {
        Self {
            time: TimeSync {
                base_time,
                next_sync,
            },
            time_reply: Reply::Status(200),
            register_reply: Reply::Status(200),
            readings_reply: Reply::Status(200),
            requests: Vec::new(),
            received: Vec::new(),
        }
    }

    pub fn count(&self, endpoint: Endpoint) -> usize {
        self.requests.iter().filter(|&&e| e == endpoint).count()
    }
}

impl Transport for FakeCollector {
    async fn get(
        &mut self,
        endpoint: Endpoint,
        response: &mut [u8],
    ) -> Result<(Status, usize), TransportError> {
        assert_eq!(endpoint, Endpoint::Time, "only the time endpoint is fetched");
        self.requests.push(endpoint);

        let document = format!(
            r#"{{"base_time":{},"next_sync":{}}}"#,
            self.time.base_time, self.time.next_sync
        );
        let (status, body) = match self.time_reply {
            Reply::Fail(e) => return Err(e),
            Reply::Status(status) => (status, document.as_bytes()),
            Reply::Body(body) => (200, body),
        };

        let slot = response
            .get_mut(..body.len())
            .ok_or(TransportError::ResponseTooLarge)?;
        slot.copy_from_slice(body);
        Ok((Status(status), body.len()))
    }

    async fn post(&mut self, endpoint: Endpoint, body: &[u8]) -> Result<Status, TransportError> {
        self.requests.push(endpoint);

        let reply = match endpoint {
            Endpoint::Register => {
                assert!(body.is_empty());
                self.register_reply
            }
            Endpoint::Readings => {
                let batch = codec::decode_readings(body).expect("node sent a malformed upload");
                self.received.push(batch);
                self.readings_reply
            }
            Endpoint::Time => panic!("time is never posted"),
        };

        match reply {
            Reply::Status(status) => Ok(Status(status)),
            Reply::Fail(e) => Err(e),
            Reply::Body(_) => Ok(Status::OK),
        }
    }
}
