//! State retained across deep sleep and application error types

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::battery::BatteryGuard;
use crate::storage::ReadingStore;
use crate::timebase::Timebase;

/// Written once the cold-boot setup completed. Any other value means the
/// retained memory holds power-on garbage.
const PROVISIONED: u32 = 0x6A7D_E1E5;

/// Upper bound of an encoded [`RetainedState`] snapshot
pub const SNAPSHOT_SIZE: usize = 1024;

/// Marks a retained-memory image written by [`RetainedState::save_image`]
const IMAGE_MAGIC: u32 = 0x6765_7965;
/// Magic word plus payload length
const IMAGE_HEADER: usize = 8;
/// Size of the raw retained-memory region holding one image
pub const IMAGE_SIZE: usize = IMAGE_HEADER + SNAPSHOT_SIZE;

/// Snapshot checksum, appended by postcard after the payload
const CHECKSUM: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISCSI);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    #[error("snapshot buffer too small")]
    SnapshotTooLarge,
    #[error("snapshot is corrupt")]
    CorruptSnapshot,
    #[error("no image in retained memory")]
    NoImage,
}

/// Everything the node remembers between wakes
///
/// On the device this lives in RTC memory and survives deep sleep but not a
/// power loss. The controller receives it by exclusive reference at the
/// start of each wake and leaves it consistent before requesting sleep.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RetainedState {
    marker: u32,
    pub store: ReadingStore,
    pub timebase: Timebase,
    pub battery: BatteryGuard,
}

impl RetainedState {
    pub const fn new() -> Self {
        Self {
            marker: 0,
            store: ReadingStore::new(),
            timebase: Timebase::new(),
            battery: BatteryGuard::new(),
        }
    }

    /// Forget everything, as after a power-on.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether the cold-boot setup already ran on this power cycle
    pub const fn is_provisioned(&self) -> bool {
        self.marker == PROVISIONED && self.store.is_consistent()
    }

    pub fn mark_provisioned(&mut self) {
        self.marker = PROVISIONED;
    }

    /// Checksummed snapshot into `buf`, returning the used prefix.
    pub fn encode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], AppError> {
        postcard::to_slice_crc32(self, buf, CHECKSUM.digest())
            .map_err(|_| AppError::SnapshotTooLarge)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AppError> {
        postcard::from_bytes_crc32(bytes, CHECKSUM.digest()).map_err(|_| AppError::CorruptSnapshot)
    }

    /// Write this state into a raw retained-memory region.
    ///
    /// The region is untouched when encoding fails.
    pub fn save_image(&self, image: &mut [u8; IMAGE_SIZE]) -> Result<(), AppError> {
        let mut scratch = [0u8; SNAPSHOT_SIZE];
        let encoded = self.encode(&mut scratch)?;

        let (header, payload) = image.split_at_mut(IMAGE_HEADER);
        payload[..encoded.len()].copy_from_slice(encoded);
        header[..4].copy_from_slice(&IMAGE_MAGIC.to_le_bytes());
        header[4..].copy_from_slice(&(encoded.len() as u32).to_le_bytes());
        Ok(())
    }

    /// Read back an image written by [`save_image`](Self::save_image).
    ///
    /// Retained memory survives every reset except a power loss, so the
    /// region holds either a previous image or power-on noise. Noise never
    /// passes the magic word, the length bound and the checksum together.
    pub fn load_image(image: &[u8; IMAGE_SIZE]) -> Result<Self, AppError> {
        let (header, payload) = image.split_at(IMAGE_HEADER);
        if word(header, 0) != Some(IMAGE_MAGIC) {
            return Err(AppError::NoImage);
        }
        let len = word(header, 4).ok_or(AppError::NoImage)? as usize;
        let bytes = payload.get(..len).ok_or(AppError::CorruptSnapshot)?;
        Self::decode(bytes)
    }
}

fn word(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    raw.try_into().ok().map(u32::from_le_bytes)
}

impl Default for RetainedState {
    fn default() -> Self {
        Self::new()
    }
}
