//! Build-time configuration and capability resolution.
//!
//! [`LoggerConfig`] holds every tunable with the defaults the field units
//! ship with. [`Capabilities`] holds the optional features a build enables;
//! [`Capabilities::resolve`] applies the precedence rules between them once
//! at startup, so no task ever has to reason about conflicting options.

use embassy_time::Duration;

// ── Tunables ────────────────────────────────────────────────────────────────

/// Longest manifest line: a full card path, the comma, a 20-digit size and
/// the newline.
const MAX_MANIFEST_LINE: usize = 150;

/// Per-task control-loop periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPeriods {
    /// Clock task.
    pub clock: Duration,
    /// Storage task.
    pub storage: Duration,
    /// Sleep controller.
    pub sleep: Duration,
    /// Watchdog.
    pub watchdog: Duration,
    /// Measurement task.
    pub measurement: Duration,
    /// Voltage task.
    pub voltage: Duration,
    /// Transfer task while idle or connected. Chunk streaming uses
    /// [`LoggerConfig::chunk_delay`].
    pub transfer: Duration,
}

impl Default for TaskPeriods {
    fn default() -> Self {
        Self {
            clock: Duration::from_millis(100),
            storage: Duration::from_millis(10),
            sleep: Duration::from_millis(100),
            watchdog: Duration::from_millis(100),
            measurement: Duration::from_millis(100),
            voltage: Duration::from_millis(1000),
            transfer: Duration::from_millis(15),
        }
    }
}

/// Battery voltages at which the variable duty cycle changes level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DutyThresholds {
    /// At or above: [`DutyLevel::Frequent`].
    pub frequent_volts: f32,
    /// At or above (and below `frequent_volts`): [`DutyLevel::Normal`].
    pub normal_volts: f32,
}

/// Every tunable of the logger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoggerConfig {
    /// Awake window and nominal sleep length of a normal cycle, seconds.
    pub read_interval_s: u32,
    /// Wake-up alignment boundary, minutes.
    pub align_minutes: u32,
    /// Awake window while a survey is running, seconds.
    pub survey_read_s: u32,
    /// Sleep length between standalone survey cycles, seconds.
    pub standalone_sleep_s: u32,
    /// How long the clock task waits for a fix before falling back.
    pub fix_delay: Duration,
    /// Re-acquire from the receiver every this many wakes.
    pub wake_cycles: u32,
    /// Seconds between monthly survey windows.
    pub survey_period_s: u32,
    /// Liveness deadline before the watchdog resets the device.
    pub watchdog_deadline: Duration,
    /// Control-loop periods.
    pub periods: TaskPeriods,
    /// Data file rotation threshold, bytes.
    pub data_file_cap: u64,
    /// Raw capture file rotation threshold, bytes.
    pub raw_file_cap: u64,
    /// Raw capture block size, bytes. At most
    /// [`RAW_BLOCK_CAPACITY`](crate::context::RAW_BLOCK_CAPACITY).
    pub raw_block_bytes: usize,
    /// Receiver buffer size, bytes.
    pub receiver_buffer_bytes: u32,
    /// Fill level that triggers the overflow warning, percent.
    pub receiver_warn_percent: u8,
    /// Largest file served over the wireless link, bytes.
    pub transfer_ceiling: usize,
    /// Payload bytes per notified chunk.
    pub chunk_bytes: usize,
    /// Pause between chunks.
    pub chunk_delay: Duration,
    /// Upper bound on one manifest chunk file, bytes.
    pub manifest_chunk_bytes: usize,
    /// How long each advertising window stays open.
    pub advertise_window: Duration,
    /// Time between the start of advertising windows.
    pub advertise_interval: Duration,
    /// Dwell in the transfer error state.
    pub error_dwell: Duration,
    /// Nearest accepted ranging peak, millimetres.
    pub ranging_min_mm: u32,
    /// Farthest accepted ranging peak, millimetres.
    pub ranging_max_mm: u32,
    /// Variable duty cycle thresholds.
    pub duty: DutyThresholds,
    /// Name the wireless service advertises under.
    pub device_name: &'static str,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            read_interval_s: 60,
            align_minutes: 60,
            survey_read_s: 7200,
            standalone_sleep_s: 60,
            fix_delay: Duration::from_secs(120),
            wake_cycles: 15,
            survey_period_s: 2_592_000,
            watchdog_deadline: Duration::from_secs(30),
            periods: TaskPeriods::default(),
            data_file_cap: 51_200,
            raw_file_cap: 51_200,
            raw_block_bytes: 8192,
            receiver_buffer_bytes: 32_768,
            receiver_warn_percent: 80,
            transfer_ceiling: 65_536,
            chunk_bytes: 100,
            chunk_delay: Duration::from_millis(100),
            manifest_chunk_bytes: 4096,
            advertise_window: Duration::from_millis(100),
            advertise_interval: Duration::from_secs(10),
            error_dwell: Duration::from_secs(1),
            ranging_min_mm: 1000,
            ranging_max_mm: 13_000,
            duty: DutyThresholds {
                frequent_volts: 3.9,
                normal_volts: 3.6,
            },
            device_name: platform::config::DEVICE_NAME,
        }
    }
}

/// A tunable outside the range the tasks can work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Awake window or sleep length is zero.
    ZeroInterval,
    /// Raw block is empty or larger than the hand-off slot.
    RawBlockSize,
    /// Chunk is empty or larger than a characteristic value.
    ChunkSize,
    /// Ranging window is empty.
    RangingWindow,
    /// Warning level above 100 percent.
    WarnPercent,
    /// A control-loop period is zero.
    ZeroPeriod,
    /// Manifest chunk bound cannot hold the longest manifest line.
    ManifestBound,
}

impl ConfigError {
    /// Short description for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ZeroInterval => "read interval or sleep length is zero",
            Self::RawBlockSize => "raw block size out of range",
            Self::ChunkSize => "chunk size out of range",
            Self::RangingWindow => "ranging window is empty",
            Self::WarnPercent => "receiver warning level above 100%",
            Self::ZeroPeriod => "control-loop period is zero",
            Self::ManifestBound => "manifest chunk bound below one manifest line",
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

impl LoggerConfig {
    /// Check that every tunable is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_interval_s == 0 || self.survey_read_s == 0 || self.standalone_sleep_s == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.raw_block_bytes == 0 || self.raw_block_bytes > crate::context::RAW_BLOCK_CAPACITY {
            return Err(ConfigError::RawBlockSize);
        }
        if self.chunk_bytes == 0 || self.chunk_bytes > platform::CHARACTERISTIC_CAPACITY {
            return Err(ConfigError::ChunkSize);
        }
        if self.ranging_min_mm >= self.ranging_max_mm {
            return Err(ConfigError::RangingWindow);
        }
        if self.receiver_warn_percent > 100 {
            return Err(ConfigError::WarnPercent);
        }
        if self.manifest_chunk_bytes < MAX_MANIFEST_LINE {
            return Err(ConfigError::ManifestBound);
        }
        let p = &self.periods;
        let periods = [
            p.clock,
            p.storage,
            p.sleep,
            p.watchdog,
            p.measurement,
            p.voltage,
            p.transfer,
        ];
        if periods.iter().any(|d| d.as_ticks() == 0) {
            return Err(ConfigError::ZeroPeriod);
        }
        Ok(())
    }

    /// Receiver fill level, in bytes, that triggers the overflow warning.
    pub fn receiver_warn_bytes(&self) -> u32 {
        let scaled = u64::from(self.receiver_buffer_bytes)
            .saturating_mul(u64::from(self.receiver_warn_percent))
            .checked_div(100)
            .unwrap_or(0);
        u32::try_from(scaled).unwrap_or(u32::MAX)
    }
}

// ── Capabilities ────────────────────────────────────────────────────────────

/// Survey behaviour of the clock task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SurveyMode {
    /// Never capture raw receiver data.
    Off,
    /// Every cycle is a survey; the ranging sensor is not used.
    Standalone,
    /// A long survey window once per survey period.
    Monthly,
}

impl SurveyMode {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Standalone => "standalone",
            Self::Monthly => "monthly",
        }
    }
}

/// Which distance sensor is fitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorKind {
    /// Echo-peak ranging sensor.
    Ranging,
    /// No sensor; no measurement task.
    None,
}

/// Optional features of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capabilities {
    /// Survey behaviour.
    pub survey: SurveyMode,
    /// Never really sleep; re-enter the cycle immediately.
    pub continuous: bool,
    /// Older receiver: trust the internal clock once a fix has set it.
    pub legacy_clock: bool,
    /// Fitted distance sensor.
    pub sensor: SensorKind,
    /// Short-range wireless file transfer.
    pub wireless: bool,
    /// Pick read interval and alignment from the battery voltage.
    pub variable_duty: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            survey: SurveyMode::Off,
            continuous: false,
            legacy_clock: false,
            sensor: SensorKind::Ranging,
            wireless: true,
            variable_duty: false,
        }
    }
}

/// A change [`Capabilities::resolve`] made to the requested set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Adjustment {
    /// Standalone survey runs without the ranging sensor.
    SensorDisabledForStandalone,
    /// Standalone survey needs the newer receiver.
    LegacyClockDroppedForStandalone,
    /// Monthly survey needs the newer receiver.
    LegacyClockDroppedForMonthly,
}

impl Adjustment {
    /// Short description for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SensorDisabledForStandalone => "standalone survey: ranging sensor disabled",
            Self::LegacyClockDroppedForStandalone => "standalone survey: legacy clock dropped",
            Self::LegacyClockDroppedForMonthly => "monthly survey: legacy clock dropped",
        }
    }
}

/// Adjustments made by one resolution pass.
pub type Adjustments = heapless::Vec<Adjustment, 4>;

impl Capabilities {
    /// Apply the precedence rules and report what changed.
    ///
    /// Survey modes need the newer receiver, so they win over the legacy
    /// clock. Standalone survey owns the whole cycle and also disables the
    /// ranging sensor.
    pub fn resolve(self) -> (Self, Adjustments) {
        let mut caps = self;
        let mut adjustments = Adjustments::new();
        match caps.survey {
            SurveyMode::Standalone => {
                if caps.sensor != SensorKind::None {
                    caps.sensor = SensorKind::None;
                    let _ = adjustments.push(Adjustment::SensorDisabledForStandalone);
                }
                if caps.legacy_clock {
                    caps.legacy_clock = false;
                    let _ = adjustments.push(Adjustment::LegacyClockDroppedForStandalone);
                }
            }
            SurveyMode::Monthly => {
                if caps.legacy_clock {
                    caps.legacy_clock = false;
                    let _ = adjustments.push(Adjustment::LegacyClockDroppedForMonthly);
                }
            }
            SurveyMode::Off => {}
        }
        (caps, adjustments)
    }

    /// Whether the measurement task takes part in this build.
    pub fn measures(&self) -> bool {
        self.sensor == SensorKind::Ranging
    }
}

// ── Duty cycle ──────────────────────────────────────────────────────────────

/// Read interval and alignment profile chosen from the battery voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyLevel {
    /// Healthy battery: read every minute, align to the hour.
    Frequent,
    /// Read every two minutes, align to half hours.
    Normal,
    /// Low battery: read every five minutes, align to ten minutes.
    Conserve,
}

impl DutyLevel {
    /// Level for a cell voltage. Unreadable voltages conserve.
    pub fn for_voltage(volts: f32, thresholds: &DutyThresholds) -> Self {
        if volts.is_nan() {
            Self::Conserve
        } else if volts >= thresholds.frequent_volts {
            Self::Frequent
        } else if volts >= thresholds.normal_volts {
            Self::Normal
        } else {
            Self::Conserve
        }
    }

    /// Read interval in seconds.
    pub fn read_interval_s(self) -> u32 {
        match self {
            Self::Frequent => 60,
            Self::Normal => 120,
            Self::Conserve => 300,
        }
    }

    /// Alignment boundary in minutes.
    pub fn align_minutes(self) -> u32 {
        match self {
            Self::Frequent => 60,
            Self::Normal => 30,
            Self::Conserve => 10,
        }
    }

    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Frequent => "frequent",
            Self::Normal => "normal",
            Self::Conserve => "conserve",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(LoggerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_unusable_values() {
        let cfg = LoggerConfig {
            read_interval_s: 0,
            ..LoggerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroInterval));

        let cfg = LoggerConfig {
            raw_block_bytes: 100_000,
            ..LoggerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::RawBlockSize));

        let cfg = LoggerConfig {
            chunk_bytes: 200,
            ..LoggerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ChunkSize));

        let cfg = LoggerConfig {
            ranging_min_mm: 5000,
            ranging_max_mm: 5000,
            ..LoggerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::RangingWindow));

        let cfg = LoggerConfig {
            manifest_chunk_bytes: 100,
            ..LoggerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ManifestBound));

        let mut cfg = LoggerConfig::default();
        cfg.periods.storage = Duration::from_ticks(0);
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroPeriod));
    }

    #[test]
    fn receiver_warning_is_eighty_percent_of_buffer() {
        assert_eq!(LoggerConfig::default().receiver_warn_bytes(), 26_214);
    }

    #[test]
    fn standalone_wins_over_sensor_and_legacy_clock() {
        let requested = Capabilities {
            survey: SurveyMode::Standalone,
            legacy_clock: true,
            ..Capabilities::default()
        };
        let (caps, adjustments) = requested.resolve();
        assert_eq!(caps.sensor, SensorKind::None);
        assert!(!caps.legacy_clock);
        assert!(!caps.measures());
        assert_eq!(
            adjustments.as_slice(),
            &[
                Adjustment::SensorDisabledForStandalone,
                Adjustment::LegacyClockDroppedForStandalone
            ]
        );
    }

    #[test]
    fn monthly_survey_needs_new_receiver() {
        let requested = Capabilities {
            survey: SurveyMode::Monthly,
            legacy_clock: true,
            ..Capabilities::default()
        };
        let (caps, adjustments) = requested.resolve();
        assert!(!caps.legacy_clock);
        assert_eq!(caps.sensor, SensorKind::Ranging);
        assert_eq!(adjustments.as_slice(), &[Adjustment::LegacyClockDroppedForMonthly]);
    }

    #[test]
    fn consistent_set_resolves_unchanged() {
        let requested = Capabilities {
            legacy_clock: true,
            variable_duty: true,
            ..Capabilities::default()
        };
        let (caps, adjustments) = requested.resolve();
        assert_eq!(caps, requested);
        assert!(adjustments.is_empty());
    }

    #[test]
    fn duty_level_follows_voltage() {
        let t = LoggerConfig::default().duty;
        assert_eq!(DutyLevel::for_voltage(4.1, &t), DutyLevel::Frequent);
        assert_eq!(DutyLevel::for_voltage(3.9, &t), DutyLevel::Frequent);
        assert_eq!(DutyLevel::for_voltage(3.75, &t), DutyLevel::Normal);
        assert_eq!(DutyLevel::for_voltage(3.4, &t), DutyLevel::Conserve);
        assert_eq!(DutyLevel::for_voltage(f32::NAN, &t), DutyLevel::Conserve);
        assert_eq!(DutyLevel::Conserve.read_interval_s(), 300);
        assert_eq!(DutyLevel::Conserve.align_minutes(), 10);
    }
}
