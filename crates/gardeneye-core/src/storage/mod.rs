//! Retained reading storage
//!
//! Readings are kept in a fixed-capacity ring that lives in memory retained
//! across deep sleep. The ring is only ever cleared after the collector has
//! acknowledged an upload.

pub mod reading;
pub mod ring;

pub use reading::*;
pub use ring::*;

pub use crate::config::MAX_SENSOR_READINGS as CAPACITY;
