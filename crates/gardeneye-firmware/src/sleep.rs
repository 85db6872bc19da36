use core::time::Duration;

use esp_hal::rtc_cntl::Rtc;
use esp_hal::rtc_cntl::sleep::TimerWakeupSource;
use gardeneye_core::controller::SleepPlan;
use log::info;

/// Enter deep sleep. Execution resumes at reset, never here.
pub fn enter(rtc: &mut Rtc<'_>, plan: SleepPlan) -> ! {
    match plan {
        SleepPlan::Timed(duration) => {
            info!("Deep sleep for {}s", duration.as_secs());
            let timer = TimerWakeupSource::new(Duration::from_micros(duration.as_micros()));
            rtc.sleep_deep(&[&timer])
        }
        SleepPlan::Indefinite => {
            info!("Deep sleep without wakeup");
            rtc.sleep_deep(&[])
        }
    }
}
