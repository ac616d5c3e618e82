//! Cooperative tasks of the wake cycle.
//!
//! Each task is a state machine advanced one step per control-loop pass.
//! The runtime calls [`ControlLoop::step`], sets the task's alive flag, and
//! waits [`ControlLoop::period`] before the next pass.

use embassy_time::{Duration, Instant};

use crate::context::{ProcessContext, TaskId};

pub mod clock;
pub mod measure;
pub mod storage;
pub mod transfer;
pub mod voltage;

pub use clock::{ClockState, ClockTask};
pub use measure::{MeasureState, MeasurementTask};
pub use storage::{StorageError, StorageState, StorageTask};
pub use transfer::{TransferState, TransferTask};
pub use voltage::VoltageTask;

/// A task driven by a periodic control loop.
pub trait ControlLoop {
    /// Slot in the alive and readiness flag groups.
    const ID: TaskId;

    /// Delay before the next pass.
    fn period(&self, ctx: &ProcessContext) -> Duration;

    /// Advance the state machine by one step.
    async fn step(&mut self, ctx: &ProcessContext, now: Instant);
}
