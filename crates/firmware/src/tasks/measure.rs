//! Measurement task: ranging sensor sampling.

use embassy_time::{Duration, Instant};
use platform::{RangingSensor, RangingStatus};

use super::ControlLoop;
use crate::context::{ProcessContext, TaskId};
use crate::fmt::{debug, info, warn};

/// Measurement task state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MeasureState {
    /// Waiting for device-ready.
    WaitReady = 0,
    /// Triggering a sweep each pass.
    Sampling = 1,
    /// Sensor stopped for sleep.
    Stopped = 2,
}

impl MeasureState {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitReady => "wait-ready",
            Self::Sampling => "sampling",
            Self::Stopped => "stopped",
        }
    }
}

/// Furthest peak inside `[min_mm, max_mm]`.
fn furthest_in_window<R: RangingSensor>(sensor: &mut R, min_mm: u32, max_mm: u32) -> Option<u32> {
    let count = sensor.peak_count();
    (0..count)
        .filter_map(|i| sensor.peak_distance(i))
        .filter(|d| (min_mm..=max_mm).contains(d))
        .max()
}

/// Ranging sensor loop.
pub struct MeasurementTask<R> {
    sensor: R,
    state: MeasureState,
    published: u32,
}

impl<R: RangingSensor> MeasurementTask<R> {
    /// Task sampling `sensor`.
    pub fn new(sensor: R) -> Self {
        Self {
            sensor,
            state: MeasureState::WaitReady,
            published: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> MeasureState {
        self.state
    }

    /// Readings published this wake.
    pub fn published(&self) -> u32 {
        self.published
    }

    /// The sensor.
    pub fn sensor(&self) -> &R {
        &self.sensor
    }

    fn transition(&mut self, next: MeasureState) {
        if next != self.state {
            debug!(
                "measure: {} ({}) -> {} ({})",
                self.state.as_str(),
                self.state as u8,
                next.as_str(),
                next as u8
            );
            self.state = next;
        }
    }

    fn sample(&mut self, ctx: &ProcessContext) -> MeasureState {
        if ctx.sleep_request.get() {
            self.sensor.stop();
            ctx.ready.set(TaskId::Measurement);
            info!("measure: stopped after {} readings", self.published);
            return MeasureState::Stopped;
        }
        if ctx.transfer_active.get() {
            return MeasureState::Sampling;
        }
        if ctx.data_ready.get() {
            // Previous reading not taken yet.
            return MeasureState::Sampling;
        }
        match self.sensor.trigger_reading() {
            RangingStatus::Ok => {
                let window = (ctx.config.ranging_min_mm, ctx.config.ranging_max_mm);
                match furthest_in_window(&mut self.sensor, window.0, window.1) {
                    Some(distance) => {
                        ctx.distance_mm.put(distance);
                        ctx.data_ready.set();
                        self.published = self.published.saturating_add(1);
                        debug!("measure: {} mm", distance);
                    }
                    None => debug!("measure: no peak between {} and {} mm", window.0, window.1),
                }
            }
            RangingStatus::Busy => debug!("measure: sensor busy"),
            RangingStatus::Error => warn!("measure: sensor reported {}", RangingStatus::Error.as_str()),
        }
        MeasureState::Sampling
    }
}

impl<R: RangingSensor> ControlLoop for MeasurementTask<R> {
    const ID: TaskId = TaskId::Measurement;

    fn period(&self, ctx: &ProcessContext) -> Duration {
        ctx.config.periods.measurement
    }

    async fn step(&mut self, ctx: &ProcessContext, _now: Instant) {
        let next = match self.state {
            MeasureState::WaitReady if ctx.device_ready.get() => MeasureState::Sampling,
            MeasureState::WaitReady => MeasureState::WaitReady,
            MeasureState::Sampling => self.sample(ctx),
            MeasureState::Stopped => MeasureState::Stopped,
        };
        self.transition(next);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::{Capabilities, LoggerConfig};
    use crate::retained::RetainedState;
    use platform::mocks::MockRanging;

    fn ctx() -> ProcessContext {
        let ctx = ProcessContext::new(
            LoggerConfig::default(),
            Capabilities::default(),
            RetainedState::default(),
        );
        ctx.device_ready.set();
        ctx
    }

    async fn steps(task: &mut MeasurementTask<MockRanging>, ctx: &ProcessContext, n: usize) {
        for _ in 0..n {
            task.step(ctx, Instant::from_millis(0)).await;
        }
    }

    #[tokio::test]
    async fn publishes_furthest_peak_in_window() {
        let ctx = ctx();
        let mut task = MeasurementTask::new(MockRanging::with_peaks(&[400, 2450, 2100, 15_000]));
        steps(&mut task, &ctx, 2).await;
        assert_eq!(ctx.distance_mm.get(), 2450);
        assert!(ctx.data_ready.get());
        assert_eq!(task.published(), 1);
    }

    #[tokio::test]
    async fn waits_for_previous_reading_to_be_taken() {
        let ctx = ctx();
        let mut task = MeasurementTask::new(MockRanging::with_peaks(&[2450]));
        steps(&mut task, &ctx, 4).await;
        assert_eq!(task.sensor().triggers, 1);
        ctx.data_ready.clear();
        steps(&mut task, &ctx, 1).await;
        assert_eq!(task.sensor().triggers, 2);
    }

    #[tokio::test]
    async fn no_peak_in_window_publishes_nothing() {
        let ctx = ctx();
        let mut task = MeasurementTask::new(MockRanging::with_peaks(&[200, 14_000]));
        steps(&mut task, &ctx, 3).await;
        assert!(!ctx.data_ready.get());
        assert_eq!(task.sensor().triggers, 2);
    }

    #[tokio::test]
    async fn skips_while_transfer_active() {
        let ctx = ctx();
        ctx.transfer_active.set();
        let mut task = MeasurementTask::new(MockRanging::with_peaks(&[2450]));
        steps(&mut task, &ctx, 5).await;
        assert_eq!(task.sensor().triggers, 0);
        assert!(!ctx.ready.get(TaskId::Measurement));
    }

    #[tokio::test]
    async fn stops_on_sleep_request() {
        let ctx = ctx();
        let mut task = MeasurementTask::new(MockRanging::with_peaks(&[2450]));
        steps(&mut task, &ctx, 2).await;
        ctx.sleep_request.set();
        steps(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), MeasureState::Stopped);
        assert!(task.sensor().stopped);
        assert!(ctx.ready.get(TaskId::Measurement));
        steps(&mut task, &ctx, 3).await;
        assert_eq!(task.sensor().triggers, 1);
    }
}
