//! Wake-cycle state machine
//!
//! Every wake, whether after deep sleep or after power-on, runs exactly one
//! cycle from [`entry_state`] to a [`CycleState::Sleep`] state. Nothing runs
//! after the sleep request: the next wake starts over with only the
//! [`RetainedState`] carried across.
//!
//! ```text
//! ColdBoot ──setup ok──▶ CheckBattery ──ok──▶ Sample ──▶ EvaluateSync ──due──▶ Sync
//!    │                        │                              │                 │
//!    ▼ setup failed           ▼ critical                     ▼ not due         ▼
//! Sleep(SetupRetry)     Sleep(CriticalBattery)         Sleep(Interval) ◀───────┘
//! ```

use embassy_time::Duration;
use heapless::Vec;
use log::{debug, info, warn};

use crate::app_state::RetainedState;
use crate::config::SamplingConfig;
use crate::sensors::{AnalogFrontEnd, SensorBank};
use crate::sync::{SyncClient, Transport, WirelessLink};
use crate::timebase::Uptime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// First wake after power-on: reset retained memory, sync and register
    ColdBoot,
    CheckBattery,
    Sample,
    EvaluateSync,
    Sync,
    /// Terminal state of every cycle
    Sleep(SleepReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReason {
    /// Regular sampling interval
    Interval,
    /// Cold-boot setup failed and runs again on the next wake
    SetupRetry,
    /// Battery cutoff latched, never wake again
    CriticalBattery,
}

/// What the platform does once the cycle ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPlan {
    /// Deep sleep with a timer wakeup
    Timed(Duration),
    /// Deep sleep with no wakeup source
    Indefinite,
}

/// Outcome of one wake cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// States in the order they ran, ending with the sleep state
    pub visited: Vec<CycleState, 8>,
    /// The collector acknowledged an upload this cycle
    pub uploaded: bool,
    pub plan: SleepPlan,
}

impl CycleReport {
    pub fn visited(&self, state: CycleState) -> bool {
        self.visited.contains(&state)
    }
}

/// Where this wake starts: setup on power-on, the battery gate otherwise.
pub const fn entry_state(retained: &RetainedState) -> CycleState {
    if retained.is_provisioned() {
        CycleState::CheckBattery
    } else {
        CycleState::ColdBoot
    }
}

/// Collaborators borrowed for the duration of one cycle
pub struct WakeCycle<'a, A, L, T, U> {
    pub config: SamplingConfig,
    pub sensors: &'a mut SensorBank<A>,
    pub link: &'a mut L,
    pub transport: &'a mut T,
    pub uptime: &'a U,
}

impl<A, L, T, U> WakeCycle<'_, A, L, T, U>
where
    A: AnalogFrontEnd,
    L: WirelessLink,
    T: Transport,
    U: Uptime,
{
    /// Run one wake from its entry state to a sleep request.
    pub async fn run_cycle(&mut self, retained: &mut RetainedState) -> CycleReport {
        let mut visited = Vec::new();
        let mut uploaded = false;
        let mut state = entry_state(retained);

        loop {
            debug!("Cycle state: {:?}", state);
            // Longest path is six states
            let _ = visited.push(state);

            state = match state {
                CycleState::ColdBoot => self.cold_boot(retained).await,
                CycleState::CheckBattery => check_battery(retained),
                CycleState::Sample => self.sample(retained).await,
                CycleState::EvaluateSync => self.evaluate_sync(retained),
                CycleState::Sync => {
                    uploaded = self.sync(retained).await;
                    CycleState::Sleep(SleepReason::Interval)
                }
                CycleState::Sleep(reason) => {
                    let plan = self.plan_sleep(reason, retained);
                    info!(
                        "Sleeping ({:?}): {:?}, {} readings buffered",
                        reason,
                        plan,
                        retained.store.len()
                    );
                    return CycleReport {
                        visited,
                        uploaded,
                        plan,
                    };
                }
            };
        }
    }

    async fn cold_boot(&mut self, retained: &mut RetainedState) -> CycleState {
        info!("Cold boot, running first-time setup");
        retained.reset();

        let setup_ok = match self.link.connect().await {
            Ok(()) => {
                let mut client = SyncClient::new(&mut *self.transport);
                client
                    .sync_base_time(&mut retained.timebase, self.uptime)
                    .await
                    && client.register_device().await
            }
            Err(e) => {
                warn!("Setup could not bring up the link: {}", e);
                false
            }
        };
        self.link.disconnect().await;

        if setup_ok {
            retained.mark_provisioned();
            CycleState::CheckBattery
        } else {
            CycleState::Sleep(SleepReason::SetupRetry)
        }
    }

    async fn sample(&mut self, retained: &mut RetainedState) -> CycleState {
        let now = retained.timebase.current_time(self.uptime);
        let reading = self.sensors.sample(now).await;

        retained
            .battery
            .update_status(&reading, self.config.critical_v);
        retained.store.push(reading);

        CycleState::EvaluateSync
    }

    fn evaluate_sync(&self, retained: &RetainedState) -> CycleState {
        if retained.store.needs_upload(self.config.sync_threshold) {
            CycleState::Sync
        } else {
            CycleState::Sleep(SleepReason::Interval)
        }
    }

    /// Returns whether the upload was acknowledged.
    async fn sync(&mut self, retained: &mut RetainedState) -> bool {
        if let Err(e) = self.link.connect().await {
            warn!(
                "Link down ({}), keeping {} readings for the next attempt",
                e,
                retained.store.len()
            );
            self.link.disconnect().await;
            return false;
        }

        let mut client = SyncClient::new(&mut *self.transport);
        if retained.timebase.needs_sync(self.uptime)
            && !client
                .sync_base_time(&mut retained.timebase, self.uptime)
                .await
        {
            warn!(
                "Skipping upload without a fresh time, keeping {} readings",
                retained.store.len()
            );
            self.link.disconnect().await;
            return false;
        }

        let now = retained.timebase.current_time(self.uptime);
        let uploaded = client.upload_readings(&mut retained.store, now).await;

        self.link.disconnect().await;
        uploaded
    }

    fn plan_sleep(&self, reason: SleepReason, retained: &mut RetainedState) -> SleepPlan {
        match reason {
            SleepReason::CriticalBattery => SleepPlan::Indefinite,
            SleepReason::SetupRetry => SleepPlan::Timed(self.config.setup_retry()),
            SleepReason::Interval => {
                // Time already spent awake counts towards the interval
                let awake = self.uptime.uptime_secs();
                let remaining = self.config.interval_s.saturating_sub(awake).max(1);

                retained
                    .timebase
                    .advance_base_time_by_interval(self.config.interval());
                // A wake longer than the interval pushes the next one out
                let overrun = (awake + remaining).saturating_sub(self.config.interval_s);
                if overrun > 0 {
                    debug!("Wake overran the interval by {}s", overrun);
                    retained
                        .timebase
                        .advance_base_time_by_interval(Duration::from_secs(overrun));
                }

                SleepPlan::Timed(Duration::from_secs(remaining))
            }
        }
    }
}

fn check_battery(retained: &RetainedState) -> CycleState {
    match retained.battery.halt_if_critical() {
        Some(_) => CycleState::Sleep(SleepReason::CriticalBattery),
        None => CycleState::Sample,
    }
}
