//! Hardware-independent core library for the gardeneye sensor node
//!
//! This crate contains the persistent sampling state machine of the node:
//! the retained reading ring, the drift-corrected timebase, the battery
//! safety cutoff, the wire codec, the collector protocol client and the
//! wake-cycle controller that sequences them.
//!
//! It is `#![no_std]` so it compiles on the ESP32 target and on desktop hosts
//! (for the simulator and tests). Hardware and network access happen through
//! the collaborator traits in [`sensors`] and [`sync`].

#![cfg_attr(not(test), no_std)]

pub mod app_state;
pub mod battery;
pub mod codec;
pub mod config;
pub mod controller;
pub mod sensors;
pub mod storage;
pub mod sync;
pub mod timebase;

#[cfg(test)]
pub(crate) mod test_support;
