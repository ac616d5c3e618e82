//! Power management abstraction
//!
//! Provides the deep-sleep/reset entry points and the battery fuel gauge.

use embassy_time::Duration;

/// Platform power control.
///
/// On hardware neither method returns: deep sleep ends in a fresh boot with
/// only the [`RetainedRegion`](crate::RetainedRegion) preserved, and a reset
/// is a cold restart. Host implementations record the request and return so
/// the caller can end its wake cycle.
pub trait PowerControl {
    /// Enter deep sleep and wake again after `duration`.
    fn enter_deep_sleep(&mut self, duration: Duration);

    /// Force a full system reset.
    fn system_reset(&mut self);
}

/// Battery fuel gauge.
///
/// Readings may be `NaN` when the gauge is not responding.
pub trait FuelGauge {
    /// Cell voltage in volts.
    fn cell_voltage(&mut self) -> f32;

    /// State of charge in percent (0-100).
    fn cell_percent(&mut self) -> f32;
}
