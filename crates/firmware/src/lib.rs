//! Tide logger orchestration core
//!
//! Cooperative task set for a battery/solar water-level logger. One wake
//! cycle acquires time (satellite receiver or internal clock), samples the
//! ranging sensor and the battery, stores readings and raw receiver data on
//! removable storage, serves files over short-range wireless, and ends in a
//! rendezvous that puts the whole device into timed deep sleep.
//!
//! # Architecture
//!
//! ```text
//! runtime::run_cycle (one wake cycle)
//!         ↓
//! Tasks (clock, storage, transfer, measure, voltage) + sleep + watchdog
//!         ↓
//! ProcessContext (shared cells, alive/readiness flags)
//!         ↓
//! Protocol (bluetooth crate) + Platform HAL (platform crate)
//! ```
//!
//! # Features
//!
//! - `hardware` - no_std build with defmt logging; the board crate supplies
//!   the time driver, critical-section implementation and device drivers
//! - `emulator` - desktop build (tokio, tracing, local-directory storage)
//! - `std` - Enable standard library (mocks, tests)
//!
//! # Examples
//!
//! ## Emulator
//!
//! ```bash
//! CARD_PATH=./card RUST_LOG=firmware=debug cargo run -p firmware --example emulator --features emulator
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Critical correctness: deny these
#![deny(clippy::await_holding_lock)] // holding a blocking Mutex across .await is a bug
#![deny(unsafe_op_in_unsafe_fn)]
// Logging discipline
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)]
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::similar_names)]
#![allow(clippy::unused_self)]
#![allow(clippy::unused_async)]
#![allow(async_fn_in_trait)] // single-threaded executor, Send bounds not needed

pub(crate) mod fmt;

pub mod config;
pub mod context;
pub mod retained;
pub mod runtime;
pub mod shared;
pub mod sleep;
pub mod tasks;
pub mod watchdog;

// Re-export key types
pub use config::{Capabilities, DutyLevel, LoggerConfig, SensorKind, SurveyMode};
pub use context::{ProcessContext, TaskFlags, TaskId};
pub use retained::{BootKind, ClockMode, RetainedState, RetainedStore};
pub use runtime::{run_cycle, CycleOutcome, TaskSet};
pub use shared::{Flag, SharedCell};
pub use sleep::{SleepController, SleepState};
pub use tasks::{
    ClockTask, ControlLoop, MeasurementTask, StorageTask, TransferTask, VoltageTask,
};
pub use watchdog::{Watchdog, WatchdogState, WatchdogVerdict};
