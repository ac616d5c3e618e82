//! Time sources: the satellite receiver and the internal fallback clock

use embassy_time::Duration;

/// How the receiver should be started for this wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionMode {
    /// Navigation solution only; raw message output disabled.
    Standard,
    /// Survey window: navigation plus raw protocol messages streamed into
    /// the receiver's buffer for capture.
    Survey,
}

/// Satellite time/position receiver.
///
/// All calls are bounded by the driver. None of them wait for a fix; the
/// caller polls [`has_fix`](TimeSource::has_fix) from its own control loop.
pub trait TimeSource {
    /// Power up and configure the receiver. Returns `false` if the receiver
    /// did not acknowledge; the caller retries on a later pass.
    fn begin_acquisition(&mut self, mode: AcquisitionMode) -> bool;

    /// Whether the receiver currently reports a valid time/position fix.
    fn has_fix(&mut self) -> bool;

    /// UTC time of the current solution in seconds since the Unix epoch.
    fn epoch_seconds(&mut self) -> u32;

    /// Latitude in units of 1e-7 degrees.
    fn latitude(&mut self) -> i32;

    /// Longitude in units of 1e-7 degrees.
    fn longitude(&mut self) -> i32;

    /// Altitude above mean sea level in millimetres.
    fn altitude(&mut self) -> i32;

    /// Number of raw-capture bytes waiting in the receiver's buffer.
    fn buffered_byte_count(&mut self) -> u16;

    /// Move up to `buf.len()` buffered raw bytes into `buf`; returns the
    /// number of bytes written.
    fn extract(&mut self, buf: &mut [u8]) -> usize;

    /// Request power-down for roughly `duration_hint`. Returns `true` once
    /// the receiver has confirmed it is off; poll until it does.
    fn power_off(&mut self, duration_hint: Duration) -> bool;
}

/// Real-time clock that keeps counting through deep sleep.
pub trait InternalClock {
    /// Current time in seconds since the Unix epoch.
    fn epoch_seconds(&self) -> u32;

    /// Set the clock, usually from a receiver fix.
    fn set_epoch_seconds(&mut self, seconds: u32);
}
