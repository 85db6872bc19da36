//! Retained record image in RTC fast memory
//!
//! The region is `persistent`: startup code never touches it, so it keeps
//! its contents across deep sleep and across watchdog, panic and brownout
//! resets. Only a power loss leaves noise behind, which the image checks
//! reject.

use esp_hal::rtc_cntl::reset_reason;
use esp_hal::system::Cpu;
use gardeneye_core::app_state::{IMAGE_SIZE, RetainedState};
use log::{error, info};

#[esp_hal::ram(unstable(rtc_fast, persistent))]
static mut IMAGE: [u8; IMAGE_SIZE] = [0; IMAGE_SIZE];

/// Restore the record left by the previous wake, or a fresh one after a
/// power-on.
pub fn load() -> RetainedState {
    info!("Reset reason: {:?}", reset_reason(Cpu::ProCpu));

    critical_section::with(|_| {
        // SAFETY: accessed only inside a critical section, no reference escapes.
        let image = unsafe { &*(&raw const IMAGE) };
        match RetainedState::load_image(image) {
            Ok(state) => state,
            Err(e) => {
                info!("No retained record ({}), starting from power-on", e);
                RetainedState::new()
            }
        }
    })
}

/// Persist the record before sleeping. On failure the previous image stays
/// in place, so the next wake repeats work rather than losing it.
pub fn save(state: &RetainedState) {
    critical_section::with(|_| {
        // SAFETY: accessed only inside a critical section, no reference escapes.
        let image = unsafe { &mut *(&raw mut IMAGE) };
        if let Err(e) = state.save_image(image) {
            error!("Could not persist retained record: {}", e);
        }
    })
}
