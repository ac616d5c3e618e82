//! Voltage task: battery readings and duty-cycle selection.

use embassy_time::{Duration, Instant};
use platform::FuelGauge;

use super::ControlLoop;
use crate::config::DutyLevel;
use crate::context::{BatteryReading, ProcessContext, TaskId};
use crate::fmt::{info, warn};

/// Fuel-gauge loop. Also picks the duty profile when variable duty is on.
pub struct VoltageTask<F> {
    gauge: F,
    duty: Option<DutyLevel>,
    started: bool,
}

impl<F: FuelGauge> VoltageTask<F> {
    /// Task reading `gauge`.
    pub fn new(gauge: F) -> Self {
        Self {
            gauge,
            duty: None,
            started: false,
        }
    }

    /// Duty profile in effect, once one has been chosen.
    pub fn duty(&self) -> Option<DutyLevel> {
        self.duty
    }

    fn select_duty(&mut self, ctx: &ProcessContext, volts: f32) {
        let level = DutyLevel::for_voltage(volts, &ctx.config.duty);
        if self.duty == Some(level) {
            return;
        }
        ctx.read_interval_s.put(level.read_interval_s());
        ctx.align_minutes.put(level.align_minutes());
        info!(
            "voltage: duty {} at {} V ({} s reads, {} min alignment)",
            level.as_str(),
            volts,
            level.read_interval_s(),
            level.align_minutes()
        );
        self.duty = Some(level);
    }
}

impl<F: FuelGauge> ControlLoop for VoltageTask<F> {
    const ID: TaskId = TaskId::Voltage;

    fn period(&self, ctx: &ProcessContext) -> Duration {
        ctx.config.periods.voltage
    }

    async fn step(&mut self, ctx: &ProcessContext, _now: Instant) {
        if !ctx.device_ready.get() {
            return;
        }
        let volts = self.gauge.cell_voltage();
        let percent = self.gauge.cell_percent();
        if volts.is_nan() || percent.is_nan() || volts < 0.0 || percent < 0.0 {
            warn!("voltage: unusable reading {} V {} %, skipped", volts, percent);
            return;
        }
        ctx.battery.put(Some(BatteryReading { volts, percent }));
        if !self.started {
            info!("voltage: {} V, {} %", volts, percent);
            self.started = true;
        }
        if ctx.caps.variable_duty {
            self.select_duty(ctx, volts);
        }
    }
}
