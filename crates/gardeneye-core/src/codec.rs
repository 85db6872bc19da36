//! JSON wire format between the node and the collector
//!
//! Pure data mapping with fixed memory bounds: documents larger than
//! [`MAX_JSON_SIZE`] or holding a token longer than [`MAX_FIELD_LENGTH`] are
//! rejected, never truncated.
//!
//! Upload (node → collector), parallel arrays oldest to newest:
//!
//! ```json
//! { "temperature": [21.5, ...], "humidity": [48.0, ...], "battery": [3.91, ...],
//!   "timestamps": [1700000000, ...], "now": 1700000120 }
//! ```
//!
//! Time sync (collector → node):
//!
//! ```json
//! { "base_time": 1700000000, "next_sync": 1700003600 }
//! ```

use heapless::Vec;
use serde::{Deserialize, Serialize, Serializer};
use thiserror_no_std::Error;

use crate::config::{MAX_FIELD_LENGTH, MAX_JSON_SIZE};
use crate::storage::{CAPACITY, Reading, ReadingStore};
use crate::timebase::TimeSync;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload exceeds the JSON size limit")]
    PayloadTooLarge,
    #[error("field exceeds the JSON field length limit")]
    FieldTooLong,
    #[error("malformed or incomplete payload")]
    Malformed,
    #[error("upload arrays differ in length")]
    LengthMismatch,
}

/// Fixed-capacity output buffer for encoded documents
pub struct JsonBuffer {
    bytes: [u8; MAX_JSON_SIZE],
    len: usize,
}

impl JsonBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; MAX_JSON_SIZE],
            len: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// The whole backing storage, for receiving a document
    pub fn space(&mut self) -> &mut [u8] {
        self.len = 0;
        &mut self.bytes
    }

    pub const fn capacity(&self) -> usize {
        MAX_JSON_SIZE
    }
}

impl Default for JsonBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// One channel of the store, serialized lazily as a JSON array
struct Column<'a, T> {
    store: &'a ReadingStore,
    field: fn(&Reading) -> T,
}

impl<T: Serialize> Serialize for Column<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.store.iter().map(self.field))
    }
}

#[derive(Serialize)]
struct UploadPayload<'a> {
    temperature: Column<'a, f32>,
    humidity: Column<'a, f32>,
    battery: Column<'a, f32>,
    timestamps: Column<'a, u64>,
    now: u64,
}

/// Upload document as received by the collector
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UploadBatch {
    pub temperature: Vec<f32, CAPACITY>,
    pub humidity: Vec<f32, CAPACITY>,
    pub battery: Vec<f32, CAPACITY>,
    pub timestamps: Vec<u64, CAPACITY>,
    pub now: u64,
}

impl UploadBatch {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Rebuild the readings, oldest first.
    pub fn readings(&self) -> impl Iterator<Item = Reading> + '_ {
        self.timestamps
            .iter()
            .zip(&self.humidity)
            .zip(&self.temperature)
            .zip(&self.battery)
            .map(|(((&timestamp, &humidity), &temperature), &battery)| {
                Reading::new(timestamp, humidity, temperature, battery)
            })
    }
}

/// Serialize every buffered reading plus `now` into `out`.
pub fn encode_readings<'b>(
    store: &ReadingStore,
    now: u64,
    out: &'b mut JsonBuffer,
) -> Result<&'b [u8], CodecError> {
    let payload = UploadPayload {
        temperature: Column {
            store,
            field: |r| r.temperature,
        },
        humidity: Column {
            store,
            field: |r| r.humidity,
        },
        battery: Column {
            store,
            field: |r| r.battery,
        },
        timestamps: Column {
            store,
            field: |r| r.timestamp,
        },
        now,
    };

    out.len = 0;
    let len = serde_json_core::to_slice(&payload, &mut out.bytes).map_err(|e| match e {
        serde_json_core::ser::Error::BufferFull => CodecError::PayloadTooLarge,
        _ => CodecError::Malformed,
    })?;
    check_field_lengths(&out.bytes[..len])?;

    out.len = len;
    Ok(out.as_bytes())
}

/// Parse an upload document, rejecting arrays of unequal length.
pub fn decode_readings(bytes: &[u8]) -> Result<UploadBatch, CodecError> {
    let batch: UploadBatch = decode(bytes)?;
    let len = batch.timestamps.len();
    if batch.temperature.len() != len || batch.humidity.len() != len || batch.battery.len() != len
    {
        return Err(CodecError::LengthMismatch);
    }
    Ok(batch)
}

/// Parse a time-sync response. Both fields are required.
pub fn decode_time_sync(bytes: &[u8]) -> Result<TimeSync, CodecError> {
    decode(bytes)
}

fn decode<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T, CodecError> {
    if bytes.len() > MAX_JSON_SIZE {
        return Err(CodecError::PayloadTooLarge);
    }
    check_field_lengths(bytes)?;

    serde_json_core::from_slice::<T>(bytes)
        .map(|(value, _)| value)
        .map_err(|_| CodecError::Malformed)
}

/// Reject documents holding a string or scalar token longer than
/// [`MAX_FIELD_LENGTH`].
pub fn check_field_lengths(bytes: &[u8]) -> Result<(), CodecError> {
    let mut run = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for &byte in bytes {
        if in_string {
            match byte {
                _ if escaped => {
                    escaped = false;
                    run += 1;
                }
                b'\\' => escaped = true,
                b'"' => {
                    in_string = false;
                    run = 0;
                }
                _ => run += 1,
            }
        } else {
            match byte {
                b'"' => {
                    in_string = true;
                    run = 0;
                }
                b'{' | b'}' | b'[' | b']' | b',' | b':' | b' ' | b'\t' | b'\r' | b'\n' => run = 0,
                _ => run += 1,
            }
        }

        if run > MAX_FIELD_LENGTH {
            return Err(CodecError::FieldTooLong);
        }
    }

    Ok(())
}
