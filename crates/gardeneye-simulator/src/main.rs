//! Desktop simulator for the gardeneye sensor node.
//!
//! Runs the core wake-cycle controller against a simulated sensor board,
//! Wi-Fi link and collector. Retained memory is a raw image carried from one
//! wake to the next, the way RTC memory outlives deep sleep and resets. The
//! simulated sleep timer runs slow, so every time sync has drift to correct.
//!
//! The link and the collector fail on a fixed schedule: some uploads time
//! out after the collector stored them (duplicates on retry), some are
//! rejected, some wakes cannot associate at all. The battery drains a little
//! on every sample until the cutoff halts the node.
//!
//! # Usage
//!
//! ```text
//! gardeneye-simulator [cycles]      # default 150
//! RUST_LOG=debug gardeneye-simulator
//! ```

use std::cell::Cell;
use std::collections::BTreeSet;
use std::f64::consts::TAU;
use std::process::ExitCode;
use std::rc::Rc;

use embassy_futures::block_on;
use log::{error, info, warn};

use gardeneye_core::app_state::{IMAGE_SIZE, RetainedState};
use gardeneye_core::codec;
use gardeneye_core::config::{MAX_ANALOG, MAX_V, SamplingConfig};
use gardeneye_core::controller::{SleepPlan, WakeCycle};
use gardeneye_core::sensors::{AnalogFrontEnd, Calibration, Channel, SensorBank};
use gardeneye_core::sync::{Endpoint, LinkError, Status, Transport, TransportError, WirelessLink};
use gardeneye_core::timebase::Uptime;

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

const DEFAULT_CYCLES: u32 = 150;

/// Wall-clock time at power-on
const START_TIME: u64 = 1_700_000_000;

/// Real seconds that pass per second of requested sleep
const SLEEP_TIMER_SKEW: f64 = 1.02;

const START_BATTERY_V: f32 = 4.2;
const DISCHARGE_PER_SAMPLE_V: f32 = 0.008;

/// Awake time spent by each activity
const SAMPLE_COST_S: u64 = 1;
const CONNECT_COST_S: u64 = 3;
const REQUEST_COST_S: u64 = 1;

/// Sync hint handed out by the collector
const NEXT_SYNC_AFTER_S: u64 = 300;

/// Every n-th association attempt fails
const LINK_FAILURE_PERIOD: u32 = 4;
/// Every n-th request times out after the collector handled it
const TIMEOUT_PERIOD: u32 = 5;
/// Every n-th request is answered with a server error
const SERVER_ERROR_PERIOD: u32 = 7;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ClockState {
    wall: Cell<u64>,
    awake: Cell<u64>,
}

/// True wall-clock time plus the seconds spent in the current wake
#[derive(Clone)]
struct SimClock(Rc<ClockState>);

impl SimClock {
    fn new(start: u64) -> Self {
        let state = ClockState::default();
        state.wall.set(start);
        Self(Rc::new(state))
    }

    fn wall(&self) -> u64 {
        self.0.wall.get()
    }

    fn spend(&self, secs: u64) {
        self.0.wall.set(self.0.wall.get() + secs);
        self.0.awake.set(self.0.awake.get() + secs);
    }

    fn wake(&self) {
        self.0.awake.set(0);
    }

    fn sleep(&self, secs: u64) {
        let real = (secs as f64 * SLEEP_TIMER_SKEW).round() as u64;
        self.0.wall.set(self.0.wall.get() + real);
    }
}

impl Uptime for SimClock {
    fn uptime_secs(&self) -> u64 {
        self.0.awake.get()
    }
}

// ---------------------------------------------------------------------------
// Sensor board
// ---------------------------------------------------------------------------

/// Produces ADC counts for a daily humidity/temperature wave and a slowly
/// discharging cell.
struct SimFrontEnd {
    clock: SimClock,
    calibration: Calibration,
    battery_v: f32,
    powered: bool,
}

impl SimFrontEnd {
    fn new(clock: SimClock, calibration: Calibration) -> Self {
        Self {
            clock,
            calibration,
            battery_v: START_BATTERY_V,
            powered: false,
        }
    }

    fn physical(&self, channel: Channel) -> f32 {
        let day = (self.clock.wall() - START_TIME) as f64 / 86_400.0;
        match channel {
            Channel::Humidity => (55.0 + 15.0 * (TAU * day).sin()) as f32,
            Channel::Temperature => (18.0 + 6.0 * (TAU * (day - 0.25)).sin()) as f32,
            Channel::Battery => self.battery_v,
        }
    }

    /// Invert the calibration to get what the ADC would report
    fn counts(&self, channel: Channel) -> u16 {
        let calibration = self.calibration.for_channel(channel);
        let volts = (self.physical(channel) - calibration.offset) / calibration.gain;
        let full_scale = f32::from(MAX_ANALOG);
        (volts / MAX_V * full_scale).round().clamp(0.0, full_scale) as u16
    }
}

impl AnalogFrontEnd for SimFrontEnd {
    async fn set_power(&mut self, on: bool) {
        if on {
            self.clock.spend(SAMPLE_COST_S);
        } else if self.powered {
            self.battery_v -= DISCHARGE_PER_SAMPLE_V;
        }
        self.powered = on;
    }

    async fn read_raw(&mut self, channel: Channel) -> u16 {
        if self.powered {
            self.counts(channel)
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Wi-Fi link
// ---------------------------------------------------------------------------

struct SimLink {
    clock: SimClock,
    attempts: u32,
}

impl WirelessLink for SimLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        self.attempts += 1;
        self.clock.spend(CONNECT_COST_S);
        if self.attempts % LINK_FAILURE_PERIOD == 0 {
            return Err(LinkError::Timeout);
        }
        Ok(())
    }

    async fn disconnect(&mut self) {}
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

struct SimCollector {
    clock: SimClock,
    requests: u32,
    registrations: u32,
    stored: BTreeSet<u64>,
    duplicates: usize,
    worst_skew: u64,
}

impl SimCollector {
    fn new(clock: SimClock) -> Self {
        Self {
            clock,
            requests: 0,
            registrations: 0,
            stored: BTreeSet::new(),
            duplicates: 0,
            worst_skew: 0,
        }
    }

    /// Scheduled failure for the request being handled, if any.
    fn next_request(&mut self) -> Option<TransportError> {
        self.requests += 1;
        self.clock.spend(REQUEST_COST_S);
        (self.requests % TIMEOUT_PERIOD == 0).then_some(TransportError::Timeout)
    }

    fn server_error(&self) -> bool {
        self.requests % SERVER_ERROR_PERIOD == 0
    }
}

impl Transport for SimCollector {
    async fn get(
        &mut self,
        endpoint: Endpoint,
        response: &mut [u8],
    ) -> Result<(Status, usize), TransportError> {
        if let Some(e) = self.next_request() {
            return Err(e);
        }
        if self.server_error() || endpoint != Endpoint::Time {
            return Ok((Status(500), 0));
        }

        let now = self.clock.wall();
        let body = format!(
            r#"{{"base_time":{},"next_sync":{}}}"#,
            now,
            now + NEXT_SYNC_AFTER_S
        );
        response
            .get_mut(..body.len())
            .ok_or(TransportError::ResponseTooLarge)?
            .copy_from_slice(body.as_bytes());
        Ok((Status::OK, body.len()))
    }

    async fn post(&mut self, endpoint: Endpoint, body: &[u8]) -> Result<Status, TransportError> {
        let failure = self.next_request();
        if self.server_error() {
            return Ok(Status(500));
        }

        match endpoint {
            Endpoint::Register => self.registrations += 1,
            Endpoint::Readings => {
                let Ok(batch) = codec::decode_readings(body) else {
                    return Ok(Status(400));
                };
                for reading in batch.readings() {
                    if !self.stored.insert(reading.timestamp) {
                        self.duplicates += 1;
                    }
                }
                let skew = self.clock.wall().abs_diff(batch.now);
                self.worst_skew = self.worst_skew.max(skew);
            }
            Endpoint::Time => return Ok(Status(405)),
        }

        // A timeout hides a request the collector did handle
        match failure {
            Some(e) => Err(e),
            None => Ok(Status::OK),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cycles = match std::env::args().nth(1).map(|arg| arg.parse::<u32>()) {
        None => DEFAULT_CYCLES,
        Some(Ok(cycles)) => cycles,
        Some(Err(e)) => {
            error!("Invalid cycle count: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = SamplingConfig::default();
    if let Err(e) = config.validate() {
        error!("Invalid sampling policy: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting gardeneye simulator for {} wake cycles", cycles);

    let clock = SimClock::new(START_TIME);
    let mut sensors = SensorBank::new(
        SimFrontEnd::new(clock.clone(), config.calibration),
        config.calibration,
    );
    let mut link = SimLink {
        clock: clock.clone(),
        attempts: 0,
    };
    let mut collector = SimCollector::new(clock.clone());

    // Contents of RTC memory while the node sleeps; noise at power-on
    let mut rtc_memory = [0u8; IMAGE_SIZE];
    let mut acknowledged = 0;
    let mut buffered = 0;

    for cycle in 1..=cycles {
        clock.wake();

        let mut retained = match RetainedState::load_image(&rtc_memory) {
            Ok(state) => state,
            Err(e) => {
                warn!("No retained record ({}), powering on fresh", e);
                RetainedState::new()
            }
        };

        let mut wake = WakeCycle {
            config,
            sensors: &mut sensors,
            link: &mut link,
            transport: &mut collector,
            uptime: &clock,
        };
        let report = block_on(wake.run_cycle(&mut retained));

        if report.uploaded {
            acknowledged += 1;
        }
        buffered = retained.store.len();
        info!(
            "Wake {:>3} at {}: {:?}, {} buffered, battery {:.2} V",
            cycle,
            clock.wall(),
            report.visited.last(),
            buffered,
            sensors.frontend().battery_v
        );

        if let Err(e) = retained.save_image(&mut rtc_memory) {
            error!("Could not persist retained state: {}", e);
        }

        match report.plan {
            SleepPlan::Timed(duration) => clock.sleep(duration.as_secs()),
            SleepPlan::Indefinite => {
                info!("Node halted after {} wake cycles", cycle);
                break;
            }
        }
    }

    info!("Registrations: {}", collector.registrations);
    info!("Acknowledged uploads: {}", acknowledged);
    info!(
        "Readings stored: {} ({} duplicate deliveries)",
        collector.stored.len(),
        collector.duplicates
    );
    info!("Readings still buffered on the node: {}", buffered);
    info!("Worst node clock error seen by the collector: {}s", collector.worst_skew);

    ExitCode::SUCCESS
}
