//! Ranging sensor abstraction

/// Outcome of a triggered measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangingStatus {
    /// A new set of peaks is available.
    Ok,
    /// The sensor has not finished the previous sweep.
    Busy,
    /// The sensor reported a fault.
    Error,
}

impl RangingStatus {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Busy => "busy",
            Self::Error => "error",
        }
    }
}

/// Distance sensor that reports one or more echo peaks per sweep.
pub trait RangingSensor {
    /// Start a sweep and wait (bounded by the driver) for its result.
    fn trigger_reading(&mut self) -> RangingStatus;

    /// Number of peaks found by the last successful sweep.
    fn peak_count(&mut self) -> u32;

    /// Distance of peak `index` in millimetres, or `None` if the index is
    /// out of range or the value could not be read.
    fn peak_distance(&mut self, index: u32) -> Option<u32>;

    /// Stop sweeping and enter the sensor's low-power state.
    fn stop(&mut self);
}
