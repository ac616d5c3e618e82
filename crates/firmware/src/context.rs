//! Process context shared by every task of one wake cycle.
//!
//! Built once at process start from the resolved configuration and the
//! restored retained state, then handed to every task by reference. Tasks
//! communicate only through the cells and flags here.

use embassy_time::Duration;

use crate::config::{Capabilities, LoggerConfig};
use crate::retained::RetainedState;
use crate::shared::{Flag, SharedCell};

/// Largest raw capture block the hand-off slot holds.
pub const RAW_BLOCK_CAPACITY: usize = 8192;

/// One block of raw receiver output.
pub type RawBlock = heapless::Vec<u8, RAW_BLOCK_CAPACITY>;

// ── Task identity ───────────────────────────────────────────────────────────

/// Every participant in the wake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskId {
    /// Time source and raw capture.
    Clock,
    /// Removable storage writer.
    Storage,
    /// Sleep controller.
    Sleep,
    /// Battery monitor.
    Voltage,
    /// Ranging sensor.
    Measurement,
    /// Wireless file transfer.
    Transfer,
}

impl TaskId {
    /// Every task, in flag-slot order.
    pub const ALL: [Self; 6] = [
        Self::Clock,
        Self::Storage,
        Self::Sleep,
        Self::Voltage,
        Self::Measurement,
        Self::Transfer,
    ];

    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Clock => "clock",
            Self::Storage => "storage",
            Self::Sleep => "sleep",
            Self::Voltage => "voltage",
            Self::Measurement => "measurement",
            Self::Transfer => "transfer",
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Clock => 0,
            Self::Storage => 1,
            Self::Sleep => 2,
            Self::Voltage => 3,
            Self::Measurement => 4,
            Self::Transfer => 5,
        }
    }
}

/// One flag per task plus the set of tasks that take part.
///
/// Tasks outside the active set are ignored by [`all_active_set`]
/// (they count as permanently set).
///
/// [`all_active_set`]: TaskFlags::all_active_set
pub struct TaskFlags {
    group: &'static str,
    flags: [Flag; 6],
    active: [bool; 6],
}

impl TaskFlags {
    const fn new(group: &'static str, names: [&'static str; 6], active: [bool; 6]) -> Self {
        let [a, b, c, d, e, f] = names;
        Self {
            group,
            flags: [
                Flag::new(a, false),
                Flag::new(b, false),
                Flag::new(c, false),
                Flag::new(d, false),
                Flag::new(e, false),
                Flag::new(f, false),
            ],
            active,
        }
    }

    /// Group name used in log output.
    pub fn group(&self) -> &'static str {
        self.group
    }

    fn flag(&self, id: TaskId) -> Option<&Flag> {
        self.flags.get(id.slot())
    }

    /// Whether `id` takes part in this group.
    pub fn is_active(&self, id: TaskId) -> bool {
        self.active.get(id.slot()).copied().unwrap_or(false)
    }

    /// Current value of `id`'s flag.
    pub fn get(&self, id: TaskId) -> bool {
        self.flag(id).is_some_and(Flag::get)
    }

    /// Set `id`'s flag.
    pub fn set(&self, id: TaskId) {
        if let Some(flag) = self.flag(id) {
            flag.set();
        }
    }

    /// Clear `id`'s flag.
    pub fn clear(&self, id: TaskId) {
        if let Some(flag) = self.flag(id) {
            flag.clear();
        }
    }

    /// Every active task's flag is set.
    pub fn all_active_set(&self) -> bool {
        TaskId::ALL
            .iter()
            .all(|&id| !self.is_active(id) || self.get(id))
    }

    /// Clear every active task's flag.
    pub fn clear_active(&self) {
        for id in TaskId::ALL {
            if self.is_active(id) {
                self.clear(id);
            }
        }
    }

    /// First active task whose flag is clear.
    pub fn first_clear(&self) -> Option<TaskId> {
        TaskId::ALL
            .into_iter()
            .find(|&id| self.is_active(id) && !self.get(id))
    }

    /// `(task, flag)` for every active task.
    pub fn snapshot(&self) -> heapless::Vec<(TaskId, bool), 6> {
        TaskId::ALL
            .into_iter()
            .filter(|&id| self.is_active(id))
            .map(|id| (id, self.get(id)))
            .collect()
    }
}

// ── Shared values ───────────────────────────────────────────────────────────

/// Last published position fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Position {
    /// Latitude in 1e-7 degrees.
    pub latitude: i32,
    /// Longitude in 1e-7 degrees.
    pub longitude: i32,
    /// Altitude above mean sea level in millimetres.
    pub altitude_mm: i32,
    /// Set once a fix has been published this wake.
    pub valid: bool,
}

/// Last battery reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryReading {
    /// Cell voltage in volts.
    pub volts: f32,
    /// State of charge in percent.
    pub percent: f32,
}

/// Everything the tasks of one wake cycle share.
pub struct ProcessContext {
    /// Tunables.
    pub config: LoggerConfig,
    /// Resolved capabilities.
    pub caps: Capabilities,
    /// State that will be written to retained memory before sleeping.
    pub retained: SharedCell<RetainedState>,

    /// Per-task liveness, consumed by the watchdog.
    pub alive: TaskFlags,
    /// Per-task readiness to sleep, consumed by the sleep controller.
    pub ready: TaskFlags,

    /// A trusted time is available; dependent tasks may start.
    pub device_ready: Flag,
    /// The awake window is over; tasks wind down.
    pub sleep_request: Flag,
    /// A new distance reading waits to be stored.
    pub data_ready: Flag,
    /// The raw block slot holds a block for storage.
    pub raw_ready: Flag,
    /// A wireless client is connected and owns the medium.
    pub transfer_active: Flag,
    /// Storage has closed its handles and suspended.
    pub write_finished: Flag,
    /// This wake is a survey window.
    pub in_long_survey: Flag,
    /// The receiver produced a fix this wake.
    pub fix_this_wake: Flag,

    /// Current epoch seconds (0 while no trusted time exists).
    pub unix_time: SharedCell<u32>,
    /// Last published position.
    pub position: SharedCell<Position>,
    /// Last distance reading in millimetres.
    pub distance_mm: SharedCell<u32>,
    /// Last battery reading, `None` until the fuel gauge has produced a
    /// usable one this wake.
    pub battery: SharedCell<Option<BatteryReading>>,
    /// Read interval in effect, seconds.
    pub read_interval_s: SharedCell<u32>,
    /// Alignment boundary in effect, minutes.
    pub align_minutes: SharedCell<u32>,
    /// Sleep length computed by the clock task (zero until computed).
    pub sleep_interval: SharedCell<Duration>,
    /// Raw capture hand-off slot, paired with [`raw_ready`](Self::raw_ready).
    pub raw_block: SharedCell<Option<RawBlock>>,
}

impl ProcessContext {
    /// Context for one wake cycle.
    pub fn new(config: LoggerConfig, caps: Capabilities, retained: RetainedState) -> Self {
        let measures = caps.measures();
        let wireless = caps.wireless;
        Self {
            config,
            caps,
            retained: SharedCell::new("retained", retained),
            alive: TaskFlags::new(
                "alive",
                [
                    "clock_alive",
                    "storage_alive",
                    "sleep_alive",
                    "voltage_alive",
                    "measurement_alive",
                    "transfer_alive",
                ],
                [true, true, true, true, measures, wireless],
            ),
            ready: TaskFlags::new(
                "ready",
                [
                    "clock_ready",
                    "storage_ready",
                    "sleep_ready",
                    "voltage_ready",
                    "measurement_ready",
                    "transfer_ready",
                ],
                [true, true, false, false, measures, wireless],
            ),
            device_ready: Flag::new("device_ready", false),
            sleep_request: Flag::new("sleep_request", false),
            data_ready: Flag::new("data_ready", false),
            raw_ready: Flag::new("raw_ready", false),
            transfer_active: Flag::new("transfer_active", false),
            write_finished: Flag::new("write_finished", false),
            in_long_survey: Flag::new("in_long_survey", false),
            fix_this_wake: Flag::new("fix_this_wake", false),
            unix_time: SharedCell::new("unix_time", 0),
            position: SharedCell::new("position", Position {
                latitude: 0,
                longitude: 0,
                altitude_mm: 0,
                valid: false,
            }),
            distance_mm: SharedCell::new("distance_mm", 0),
            battery: SharedCell::new("battery", None),
            read_interval_s: SharedCell::new("read_interval_s", config.read_interval_s),
            align_minutes: SharedCell::new("align_minutes", config.align_minutes),
            sleep_interval: SharedCell::new("sleep_interval", Duration::from_ticks(0)),
            raw_block: SharedCell::new("raw_block", None),
        }
    }
}
