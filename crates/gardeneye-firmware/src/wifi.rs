//! Station-mode Wi-Fi link, brought up once per sync and torn down before sleep

use embassy_net::{Runner, Stack};
use embassy_time::{Duration, WithTimeout};
use esp_radio::wifi::{WifiController, WifiDevice};
use gardeneye_core::config::MAX_CONNECTION_TIME_S;
use gardeneye_core::sync::{LinkError, WirelessLink};
use log::{info, warn};

/// Drives the network stack. Must be spawned before the first connect.
#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

pub struct WifiLink<'d> {
    controller: WifiController<'d>,
    stack: Stack<'d>,
}

impl<'d> WifiLink<'d> {
    /// `controller` must already hold the client configuration.
    pub fn new(controller: WifiController<'d>, stack: Stack<'d>) -> Self {
        Self { controller, stack }
    }

    async fn bring_up(&mut self) -> Result<(), LinkError> {
        if !self.controller.is_started().unwrap_or(false) {
            self.controller.start_async().await.map_err(|e| {
                warn!("Wi-Fi start failed: {:?}", e);
                LinkError::Radio
            })?;
        }

        self.controller.connect_async().await.map_err(|e| {
            warn!("Wi-Fi association failed: {:?}", e);
            LinkError::Rejected
        })?;

        self.stack.wait_config_up().await;
        if let Some(config) = self.stack.config_v4() {
            info!("Wi-Fi up, address {}", config.address);
        }
        Ok(())
    }
}

impl WirelessLink for WifiLink<'_> {
    async fn connect(&mut self) -> Result<(), LinkError> {
        let budget = Duration::from_secs(MAX_CONNECTION_TIME_S);
        match self.bring_up().with_timeout(budget).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Wi-Fi not up after {}s", MAX_CONNECTION_TIME_S);
                Err(LinkError::Timeout)
            }
        }
    }

    async fn disconnect(&mut self) {
        if matches!(self.controller.is_connected(), Ok(true)) {
            if let Err(e) = self.controller.disconnect_async().await {
                warn!("Wi-Fi disconnect failed: {:?}", e);
            }
        }
        if let Err(e) = self.controller.stop_async().await {
            warn!("Wi-Fi stop failed: {:?}", e);
        }
    }
}
