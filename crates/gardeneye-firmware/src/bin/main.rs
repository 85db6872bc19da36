#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::Instant;
use esp_hal::clock::CpuClock;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::{ClientConfig, ModeConfig};
use gardeneye_core::config::{Config, InternetConfig, ServerConfig};
use gardeneye_core::controller::{SleepPlan, WakeCycle};
use gardeneye_core::sensors::SensorBank;
use gardeneye_core::sync::DeviceId;
use gardeneye_core::timebase::Uptime;
use gardeneye_firmware::frontend::AdcFrontEnd;
use gardeneye_firmware::http::HttpTransport;
use gardeneye_firmware::wifi::{WifiLink, net_task};
use gardeneye_firmware::wifi_secrets::{API_KEY, SERVER_HOSTNAME, WIFI_PASSWORD, WIFI_SSID};
use gardeneye_firmware::{retained, sleep};
use log::{error, info};
use static_cell::StaticCell;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static NET_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
static TRANSPORT: StaticCell<HttpTransport<'static>> = StaticCell::new();

/// Seconds since this wake started
struct BootUptime;

impl Uptime for BootUptime {
    fn uptime_secs(&self) -> u64 {
        Instant::now().as_secs()
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    let mut state = retained::load();
    let mut rtc = Rtc::new(peripherals.LPWR);

    // Nothing else powers up once the cutoff has latched
    if let Some(plan) = state.battery.halt_if_critical() {
        error!("Battery cutoff latched");
        sleep::enter(&mut rtc, plan);
    }

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let config = Config {
        internet: InternetConfig {
            ssid: WIFI_SSID,
            password: WIFI_PASSWORD,
        },
        server: ServerConfig {
            hostname: SERVER_HOSTNAME,
            api_key: API_KEY,
        },
        sampling: Default::default(),
    };
    if let Err(e) = config.sampling.validate() {
        error!("Invalid sampling policy: {}", e);
        sleep::enter(&mut rtc, SleepPlan::Indefinite);
    }

    let mut sensors = SensorBank::new(
        AdcFrontEnd::new(
            peripherals.ADC1,
            peripherals.GPIO35,
            peripherals.GPIO33,
            peripherals.GPIO32,
            peripherals.GPIO13,
        ),
        config.sampling.calibration,
    );

    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (mut controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let client_config = ClientConfig::default()
        .with_ssid(config.internet.ssid.into())
        .with_password(config.internet.password.into());
    controller
        .set_config(&ModeConfig::Client(client_config))
        .expect("Failed to configure Wi-Fi client mode");

    let device = DeviceId::from_mac(interfaces.sta.mac_address());
    info!("Device {}", device);

    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        NET_RESOURCES.init(StackResources::new()),
        u64::from_le_bytes(*b"gardenye"),
    );
    spawner.spawn(net_task(runner).expect("Network task already running"));

    let mut link = WifiLink::new(controller, stack);
    let transport = TRANSPORT.init(HttpTransport::new(
        stack,
        config.server.hostname,
        config.server.api_key,
        device,
    ));

    let report = WakeCycle {
        config: config.sampling,
        sensors: &mut sensors,
        link: &mut link,
        transport,
        uptime: &BootUptime,
    }
    .run_cycle(&mut state)
    .await;
    retained::save(&state);

    info!(
        "Wake done in {}s: {} states, uploaded: {}",
        BootUptime.uptime_secs(),
        report.visited.len(),
        report.uploaded
    );
    sleep::enter(&mut rtc, report.plan)
}
