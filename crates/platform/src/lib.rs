//! Hardware Abstraction Layer (HAL) for the tide logger
//!
//! This crate provides trait-based abstractions for every device the logger
//! talks to, enabling the orchestration core to be developed and tested
//! without physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Orchestration core (firmware crate: tasks, rendezvous, watchdog)
//!         ↓
//! Protocol layer (bluetooth: checksum, manifest, status codes)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Board support (receiver, SD card, fuel gauge, radar, BLE stack)
//! ```
//!
//! # Devices
//!
//! - [`TimeSource`] - Satellite time/position receiver with raw-capture buffer
//! - [`InternalClock`] - Fallback real-time clock that keeps running in deep sleep
//! - [`StorageMedium`] - Removable storage with a small file-system surface
//! - [`FuelGauge`] - Battery cell voltage and state of charge
//! - [`RangingSensor`] - Distance sensor reporting echo peaks
//! - [`WirelessStack`] - Short-range wireless GATT service
//! - [`PowerControl`] - Deep-sleep entry and full system reset
//! - [`RetainedRegion`] - Memory preserved across deep sleep
//!
//! # Features
//!
//! - `std`: Enable standard library support (mocks, local-directory storage)
//! - `defmt`: Enable defmt derives on platform types
//!
//! # Example
//!
//! ```no_run
//! use platform::{OpenMode, StorageMedium};
//!
//! async fn append<S: StorageMedium>(storage: &mut S) -> Result<(), S::Error> {
//!     let mut handle = storage.open("/logFile.txt", OpenMode::Append).await?;
//!     storage.write(&mut handle, b"1, 1700000000\n").await?;
//!     storage.close(handle).await
//! }
//! ```

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)] // hardware accessors: callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod bluetooth;
pub mod clock;
pub mod config;
pub mod power;
pub mod ranging;
pub mod retained;
pub mod storage;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

#[cfg(any(test, feature = "std"))]
pub mod storage_local;

// Re-export main device traits
pub use bluetooth::{
    Characteristic, CharacteristicValue, PeerAddress, WirelessStack, CHARACTERISTIC_CAPACITY,
};
pub use clock::{AcquisitionMode, InternalClock, TimeSource};
pub use power::{FuelGauge, PowerControl};
pub use ranging::{RangingSensor, RangingStatus};
pub use retained::{RetainedRegion, RETAINED_REGION_BYTES};
pub use storage::{DirEntry, FileName, OpenMode, StorageMedium, MAX_NAME_LEN};
