//! Storage task: files on the removable medium.
//!
//! Owns every write to the card. Each write opens, appends and closes, so no
//! handle outlives a pass. A connected wireless client takes the card over
//! through the `transfer_active` / `write_finished` handshake:
//!
//! 1. transfer sets `transfer_active`;
//! 2. storage finishes the write in progress, enters `Suspended` and sets
//!    `write_finished`;
//! 3. transfer serves requests only after seeing `write_finished`;
//! 4. transfer clears `transfer_active`; storage clears `write_finished`,
//!    re-checks `transfer_active`, and only then resumes.
//!
//! The medium itself sits behind an async mutex held for one operation, so
//! the two tasks never touch it at the same instant even if the handshake is
//! mid-flight.

use core::fmt::Write as _;

use bluetooth::CardPath;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant};
use platform::config::{APP_NAME, APP_VERSION};
use platform::{OpenMode, StorageMedium};

use super::ControlLoop;
use crate::context::{ProcessContext, RawBlock, TaskId};
use crate::fmt::{debug, error, info, warn, Dbg};

/// Reading files.
pub const DATA_DIR: &str = "/Data";
/// Raw receiver capture files.
pub const RAW_DIR: &str = "/GNSS_Data";
/// Column legend for the card's reader.
pub const README_PATH: &str = "/README.txt";
/// One line per wake with a position fix.
pub const LOG_PATH: &str = "/logFile.txt";

const LOG_HEADER: &str = "Wake Count, Unix Time, Latitude, Longitude, Altitude\n";

/// Attempts at one write before its data is dropped.
const WRITE_ATTEMPTS: u8 = 3;

/// Highest `_n` suffix tried when looking for a free name.
const MAX_SUFFIX: u32 = 9999;

/// Storage task state. Discriminants match the state codes in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum StorageState {
    /// Create directories, header and this wake's files.
    Init = 0,
    /// Pick the next piece of work.
    Dispatch = 1,
    /// Append one reading.
    WriteReading = 2,
    /// Append this wake's log entry.
    WriteLogEntry = 3,
    /// Idle and ready to sleep.
    Sleep = 4,
    /// Append one raw block.
    WriteRawBlock = 5,
    /// Card handed to the transfer task.
    Suspended = 6,
}

impl StorageState {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Dispatch => "dispatch",
            Self::WriteReading => "write-reading",
            Self::WriteLogEntry => "write-log-entry",
            Self::Sleep => "sleep",
            Self::WriteRawBlock => "write-raw-block",
            Self::Suspended => "suspended",
        }
    }
}

/// Storage failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError<E> {
    /// The medium refused to open a file.
    Open(E),
    /// A read, write, size or close failed.
    Io(E),
    /// Every `_n` suffix up to the limit is taken.
    NoFreeName,
    /// A path or line did not fit its buffer.
    TooLong,
}

impl<E> core::fmt::Display for StorageError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Open(_) => f.write_str("open failed"),
            Self::Io(_) => f.write_str("I/O failed"),
            Self::NoFreeName => f.write_str("no free file name"),
            Self::TooLong => f.write_str("path or line too long"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> std::error::Error for StorageError<E> {}

// ── Files ───────────────────────────────────────────────────────────────────

/// Decimal with a fixed number of fraction digits from a scaled integer.
struct Fixed {
    value: i64,
    digits: u32,
}

impl core::fmt::Display for Fixed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let scale = 10u64.checked_pow(self.digits).unwrap_or(1);
        let abs = self.value.unsigned_abs();
        let whole = abs.checked_div(scale).unwrap_or(0);
        let frac = abs.checked_rem(scale).unwrap_or(0);
        let sign = if self.value < 0 { "-" } else { "" };
        let width = usize::try_from(self.digits).unwrap_or(0);
        write!(f, "{sign}{whole}.{frac:0width$}")
    }
}

/// `dir/stem.ext`, or `dir/stem_seq.ext` for `seq > 0`.
fn file_path(dir: &str, stem: &str, ext: &str, seq: u32) -> Option<CardPath> {
    let mut path = CardPath::new();
    if seq == 0 {
        write!(path, "{dir}/{stem}.{ext}").ok()?;
    } else {
        write!(path, "{dir}/{stem}_{seq}.{ext}").ok()?;
    }
    Some(path)
}

/// A file this task appends to, with its rotation threshold.
#[derive(Debug, Clone)]
pub struct StoredFile {
    dir: &'static str,
    stem: heapless::String<32>,
    ext: &'static str,
    seq: u32,
    path: CardPath,
    cap: u64,
}

impl StoredFile {
    /// Create the first free `dir/stem[_n].ext` on the medium.
    pub async fn create<S: StorageMedium>(
        medium: &mut S,
        dir: &'static str,
        stem: &str,
        ext: &'static str,
        cap: u64,
    ) -> Result<Self, StorageError<S::Error>> {
        let stem = heapless::String::try_from(stem).map_err(|_| StorageError::TooLong)?;
        let mut file = Self {
            dir,
            stem,
            ext,
            seq: 0,
            path: CardPath::new(),
            cap,
        };
        file.claim_free_name(medium, 0).await?;
        Ok(file)
    }

    /// Current path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Rotation threshold in bytes.
    pub fn cap(&self) -> u64 {
        self.cap
    }

    async fn claim_free_name<S: StorageMedium>(
        &mut self,
        medium: &mut S,
        first_seq: u32,
    ) -> Result<(), StorageError<S::Error>> {
        for seq in first_seq..=MAX_SUFFIX {
            let path = file_path(self.dir, &self.stem, self.ext, seq).ok_or(StorageError::TooLong)?;
            if medium.exists(&path).await.map_err(StorageError::Io)? {
                continue;
            }
            let handle = medium
                .open(&path, OpenMode::Append)
                .await
                .map_err(StorageError::Open)?;
            medium.close(handle).await.map_err(StorageError::Io)?;
            self.seq = seq;
            self.path = path;
            return Ok(());
        }
        Err(StorageError::NoFreeName)
    }

    /// Append `bytes`, rotating first if the file has reached its cap.
    /// Returns the file size after the write.
    pub async fn append<S: StorageMedium>(
        &mut self,
        medium: &mut S,
        bytes: &[u8],
    ) -> Result<u64, StorageError<S::Error>> {
        let mut handle = medium
            .open(&self.path, OpenMode::Append)
            .await
            .map_err(StorageError::Open)?;
        let size = match medium.size(&handle).await {
            Ok(size) => size,
            Err(e) => {
                let _ = medium.close(handle).await;
                return Err(StorageError::Io(e));
            }
        };
        let size = if size >= self.cap {
            medium.close(handle).await.map_err(StorageError::Io)?;
            let old_seq = self.seq;
            self.claim_free_name(medium, old_seq.saturating_add(1)).await?;
            info!("storage: rotated to {} at {} bytes", self.path.as_str(), size);
            handle = medium
                .open(&self.path, OpenMode::Append)
                .await
                .map_err(StorageError::Open)?;
            0
        } else {
            size
        };
        let written = medium.write(&mut handle, bytes).await;
        let closed = medium.close(handle).await;
        written.map_err(StorageError::Io)?;
        closed.map_err(StorageError::Io)?;
        let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        Ok(size.saturating_add(len))
    }
}

/// One reading waiting to be written.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Reading {
    unix: u32,
    distance_mm: u32,
    volts: f32,
    percent: f32,
}

// ── Task ────────────────────────────────────────────────────────────────────

/// Storage task over the shared medium `S`.
pub struct StorageTask<'m, S> {
    medium: &'m Mutex<CriticalSectionRawMutex, S>,
    state: StorageState,
    resume: StorageState,
    data_file: Option<StoredFile>,
    raw_file: Option<StoredFile>,
    pending_reading: Option<Reading>,
    pending_block: Option<RawBlock>,
    failures: u8,
    log_done: bool,
}

impl<'m, S: StorageMedium> StorageTask<'m, S> {
    /// Task writing to `medium`.
    pub fn new(medium: &'m Mutex<CriticalSectionRawMutex, S>) -> Self {
        Self {
            medium,
            state: StorageState::Init,
            resume: StorageState::Dispatch,
            data_file: None,
            raw_file: None,
            pending_reading: None,
            pending_block: None,
            failures: 0,
            log_done: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> StorageState {
        self.state
    }

    /// Path of this wake's data file.
    pub fn data_path(&self) -> Option<&str> {
        self.data_file.as_ref().map(StoredFile::path)
    }

    /// Path of this wake's raw capture file.
    pub fn raw_path(&self) -> Option<&str> {
        self.raw_file.as_ref().map(StoredFile::path)
    }

    fn transition(&mut self, next: StorageState) {
        if next != self.state {
            debug!(
                "storage: {} ({}) -> {} ({})",
                self.state.as_str(),
                self.state as u8,
                next.as_str(),
                next as u8
            );
            self.state = next;
        }
    }

    /// Count a failed write. Returns `true` while the data should be kept
    /// for another attempt.
    fn retry_after<E: core::fmt::Debug>(&mut self, what: &str, e: &StorageError<E>) -> bool {
        self.failures = self.failures.saturating_add(1);
        if self.failures < WRITE_ATTEMPTS {
            warn!(
                "storage: {} failed, attempt {}: {}",
                what,
                self.failures,
                Dbg(e)
            );
            true
        } else {
            error!(
                "storage: {} failed {} times, dropping: {}",
                what,
                self.failures,
                Dbg(e)
            );
            self.failures = 0;
            false
        }
    }

    fn enter_suspend(&mut self, resume: StorageState) -> StorageState {
        self.resume = resume;
        StorageState::Suspended
    }

    async fn prepare(&mut self, ctx: &ProcessContext) -> Result<(), StorageError<S::Error>> {
        let mut medium = self.medium.lock().await;
        let medium = &mut *medium;
        medium.mkdir(DATA_DIR).await.map_err(StorageError::Io)?;
        medium.mkdir(RAW_DIR).await.map_err(StorageError::Io)?;

        if !medium.exists(README_PATH).await.map_err(StorageError::Io)? {
            let mut text = heapless::String::<512>::new();
            write!(
                text,
                "{APP_NAME} {APP_VERSION}\n\
                 Data files ({DATA_DIR}/<start time, hex>.txt): unix time, distance (mm), battery (V), battery (%)\n\
                 Log file ({LOG_PATH}): wake count, unix time, latitude (deg), longitude (deg), altitude (m)\n\
                 Raw capture ({RAW_DIR}/<wake, hex>_<start time>.ubx): receiver output during survey windows\n"
            )
            .map_err(|_| StorageError::TooLong)?;
            let mut handle = medium
                .open(README_PATH, OpenMode::Truncate)
                .await
                .map_err(StorageError::Open)?;
            let written = medium.write(&mut handle, text.as_bytes()).await;
            let closed = medium.close(handle).await;
            written.map_err(StorageError::Io)?;
            closed.map_err(StorageError::Io)?;
            info!("storage: wrote {}", README_PATH);
        }

        let unix = ctx.unix_time.get();
        if ctx.caps.measures() && self.data_file.is_none() {
            let mut stem = heapless::String::<32>::new();
            write!(stem, "{unix:X}").map_err(|_| StorageError::TooLong)?;
            let file =
                StoredFile::create(medium, DATA_DIR, &stem, "txt", ctx.config.data_file_cap).await?;
            info!("storage: data file {}", file.path());
            self.data_file = Some(file);
        }
        if ctx.in_long_survey.get() && self.raw_file.is_none() {
            self.raw_file = Some(Self::create_raw_file(medium, ctx).await?);
        }
        Ok(())
    }

    async fn create_raw_file(
        medium: &mut S,
        ctx: &ProcessContext,
    ) -> Result<StoredFile, StorageError<S::Error>> {
        let wake = ctx.retained.read(|r| r.wake_count);
        let unix = ctx.unix_time.get();
        let mut stem = heapless::String::<32>::new();
        write!(stem, "{wake:X}_{unix}").map_err(|_| StorageError::TooLong)?;
        let file = StoredFile::create(medium, RAW_DIR, &stem, "ubx", ctx.config.raw_file_cap).await?;
        info!("storage: raw capture file {}", file.path());
        Ok(file)
    }

    // ── States ──────────────────────────────────────────────────────────────

    async fn init(&mut self, ctx: &ProcessContext) -> StorageState {
        if ctx.transfer_active.get() {
            return self.enter_suspend(StorageState::Init);
        }
        if !ctx.device_ready.get() {
            return StorageState::Init;
        }
        match self.prepare(ctx).await {
            Ok(()) => {
                self.failures = 0;
                StorageState::Dispatch
            }
            Err(e) if ctx.sleep_request.get() => {
                // Give the card up for this wake; the next wake starts in Init.
                error!("storage: card unusable this wake, sleeping: {}", Dbg(&e));
                self.failures = 0;
                self.log_done = true;
                StorageState::Sleep
            }
            Err(e) => {
                if self.failures == 0 {
                    error!("storage: init failed, retrying: {}", Dbg(&e));
                } else {
                    debug!("storage: init attempt {} failed", self.failures);
                }
                self.failures = self.failures.saturating_add(1);
                StorageState::Init
            }
        }
    }

    fn dispatch(&mut self, ctx: &ProcessContext) -> StorageState {
        if ctx.transfer_active.get() {
            return self.enter_suspend(StorageState::Dispatch);
        }
        self.resume = StorageState::Dispatch;
        if self.pending_block.is_some() || ctx.raw_ready.get() {
            return StorageState::WriteRawBlock;
        }
        if self.take_reading(ctx) {
            return StorageState::WriteReading;
        }
        if ctx.sleep_request.get() && ctx.ready.get(TaskId::Clock) {
            return StorageState::WriteLogEntry;
        }
        StorageState::Dispatch
    }

    /// Latch the current reading if one is waiting. A distance stays
    /// unlatched until the voltage task has published a battery reading.
    fn take_reading(&mut self, ctx: &ProcessContext) -> bool {
        if self.pending_reading.is_some() {
            return true;
        }
        if !ctx.data_ready.get() {
            return false;
        }
        let Some(battery) = ctx.battery.get() else {
            return false;
        };
        ctx.data_ready.clear();
        self.pending_reading = Some(Reading {
            unix: ctx.unix_time.get(),
            distance_mm: ctx.distance_mm.get(),
            volts: battery.volts,
            percent: battery.percent,
        });
        true
    }

    async fn write_reading(&mut self) -> StorageState {
        let Some(reading) = self.pending_reading else {
            return self.resume;
        };
        let Some(file) = self.data_file.as_mut() else {
            warn!("storage: reading without a data file, dropped");
            self.pending_reading = None;
            return self.resume;
        };
        let mut line = heapless::String::<96>::new();
        if write!(
            line,
            "{}, {}, {:.3}, {:.1}\n",
            reading.unix, reading.distance_mm, reading.volts, reading.percent
        )
        .is_err()
        {
            self.pending_reading = None;
            return self.resume;
        }
        let mut medium = self.medium.lock().await;
        match file.append(&mut *medium, line.as_bytes()).await {
            Ok(size) => {
                debug!("storage: reading at {}, file {} bytes", reading.unix, size);
                self.pending_reading = None;
                self.failures = 0;
            }
            Err(e) => {
                drop(medium);
                if !self.retry_after("reading", &e) {
                    self.pending_reading = None;
                }
            }
        }
        self.resume
    }

    async fn write_log_entry(&mut self, ctx: &ProcessContext) -> StorageState {
        if self.log_done {
            return StorageState::Sleep;
        }
        let position = ctx.position.get();
        if !(ctx.fix_this_wake.get() && position.valid) {
            info!("storage: no fix this wake, log entry skipped");
            self.log_done = true;
            return StorageState::Sleep;
        }
        let mut line = heapless::String::<96>::new();
        let formatted = write!(
            line,
            "{}, {}, {}, {}, {}\n",
            ctx.retained.read(|r| r.wake_count),
            ctx.unix_time.get(),
            Fixed {
                value: i64::from(position.latitude),
                digits: 7
            },
            Fixed {
                value: i64::from(position.longitude),
                digits: 7
            },
            Fixed {
                value: i64::from(position.altitude_mm),
                digits: 3
            },
        );
        if formatted.is_err() {
            self.log_done = true;
            return StorageState::Sleep;
        }
        let result = {
            let mut medium = self.medium.lock().await;
            append_log_line(&mut *medium, line.as_bytes()).await
        };
        match result {
            Ok(()) => {
                info!("storage: log entry written");
                self.log_done = true;
                self.failures = 0;
                StorageState::Sleep
            }
            Err(e) => {
                if self.retry_after("log entry", &e) {
                    StorageState::WriteLogEntry
                } else {
                    self.log_done = true;
                    StorageState::Sleep
                }
            }
        }
    }

    fn sleep(&mut self, ctx: &ProcessContext) -> StorageState {
        if ctx.transfer_active.get() {
            return self.enter_suspend(StorageState::Sleep);
        }
        self.resume = StorageState::Sleep;
        if self.pending_block.is_some() || ctx.raw_ready.get() {
            // Not ready while a block is in flight.
            ctx.ready.clear(TaskId::Storage);
            return StorageState::WriteRawBlock;
        }
        if self.take_reading(ctx) {
            ctx.ready.clear(TaskId::Storage);
            return StorageState::WriteReading;
        }
        if !ctx.ready.get(TaskId::Storage) {
            ctx.ready.set(TaskId::Storage);
            info!("storage: ready to sleep");
        }
        StorageState::Sleep
    }

    async fn write_raw_block(&mut self, ctx: &ProcessContext) -> StorageState {
        let block = match self.pending_block.take() {
            Some(block) => block,
            None => {
                let taken = ctx.raw_block.take();
                ctx.raw_ready.clear();
                match taken {
                    Some(block) => block,
                    None => return self.resume,
                }
            }
        };

        let mut medium = self.medium.lock().await;
        if self.raw_file.is_none() {
            match Self::create_raw_file(&mut *medium, ctx).await {
                Ok(file) => self.raw_file = Some(file),
                Err(e) => {
                    drop(medium);
                    if self.retry_after("raw file", &e) {
                        self.pending_block = Some(block);
                    }
                    return self.resume;
                }
            }
        }
        let Some(file) = self.raw_file.as_mut() else {
            return self.resume;
        };
        match file.append(&mut *medium, &block).await {
            Ok(size) => {
                debug!("storage: {} raw bytes, file {} bytes", block.len(), size);
                self.failures = 0;
            }
            Err(e) => {
                drop(medium);
                if self.retry_after("raw block", &e) {
                    self.pending_block = Some(block);
                }
            }
        }
        self.resume
    }

    fn suspended(&mut self, ctx: &ProcessContext) -> StorageState {
        if ctx.transfer_active.get() {
            if !ctx.write_finished.get() {
                // Every handle is closed at the end of each write.
                ctx.write_finished.set();
                ctx.ready.set(TaskId::Storage);
                info!("storage: suspended for transfer");
            }
            return StorageState::Suspended;
        }
        ctx.write_finished.clear();
        if ctx.transfer_active.get() {
            // A new session started between the two reads.
            ctx.write_finished.set();
            return StorageState::Suspended;
        }
        if self.resume != StorageState::Sleep {
            ctx.ready.clear(TaskId::Storage);
        }
        info!("storage: resuming to {}", self.resume.as_str());
        self.resume
    }
}

async fn append_log_line<S: StorageMedium>(
    medium: &mut S,
    line: &[u8],
) -> Result<(), StorageError<S::Error>> {
    let mut handle = medium
        .open(LOG_PATH, OpenMode::Append)
        .await
        .map_err(StorageError::Open)?;
    let written = async {
        if medium.size(&handle).await? == 0 {
            medium.write(&mut handle, LOG_HEADER.as_bytes()).await?;
        }
        medium.write(&mut handle, line).await
    }
    .await;
    let closed = medium.close(handle).await;
    written.map_err(StorageError::Io)?;
    closed.map_err(StorageError::Io)
}

impl<S: StorageMedium> ControlLoop for StorageTask<'_, S> {
    const ID: TaskId = TaskId::Storage;

    fn period(&self, ctx: &ProcessContext) -> Duration {
        ctx.config.periods.storage
    }

    async fn step(&mut self, ctx: &ProcessContext, _now: Instant) {
        let next = match self.state {
            StorageState::Init => self.init(ctx).await,
            StorageState::Dispatch => self.dispatch(ctx),
            StorageState::WriteReading => self.write_reading().await,
            StorageState::WriteLogEntry => self.write_log_entry(ctx).await,
            StorageState::Sleep => self.sleep(ctx),
            StorageState::WriteRawBlock => self.write_raw_block(ctx).await,
            StorageState::Suspended => self.suspended(ctx),
        };
        self.transition(next);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::config::{Capabilities, LoggerConfig, SensorKind, SurveyMode};
    use crate::context::{BatteryReading, Position};
    use crate::retained::RetainedState;
    use platform::mocks::MemoryStorage;

    const EPOCH: u32 = 1_700_000_000; // 0x6553F100

    type Medium = Mutex<CriticalSectionRawMutex, MemoryStorage>;

    fn ready_ctx(config: LoggerConfig, caps: Capabilities) -> ProcessContext {
        let ctx = ProcessContext::new(config, caps, RetainedState::default());
        ctx.unix_time.put(EPOCH);
        ctx.device_ready.set();
        ctx
    }

    async fn steps(task: &mut StorageTask<'_, MemoryStorage>, ctx: &ProcessContext, n: usize) {
        for _ in 0..n {
            task.step(ctx, Instant::from_millis(0)).await;
        }
    }

    fn publish_reading(ctx: &ProcessContext, distance: u32) {
        ctx.distance_mm.put(distance);
        ctx.battery.put(Some(BatteryReading {
            volts: 3.912,
            percent: 81.04,
        }));
        ctx.data_ready.set();
    }

    #[test]
    fn fixed_point_formatting() {
        let mut s = heapless::String::<32>::new();
        write!(s, "{}", Fixed { value: 473_977_418, digits: 7 }).unwrap();
        assert_eq!(s.as_str(), "47.3977418");
        s.clear();
        write!(s, "{}", Fixed { value: -1_223_456, digits: 7 }).unwrap();
        assert_eq!(s.as_str(), "-0.1223456");
        s.clear();
        write!(s, "{}", Fixed { value: 12_005, digits: 3 }).unwrap();
        assert_eq!(s.as_str(), "12.005");
    }

    #[tokio::test]
    async fn init_waits_for_device_ready() {
        let medium = Medium::new(MemoryStorage::new());
        let ctx = ProcessContext::new(
            LoggerConfig::default(),
            Capabilities::default(),
            RetainedState::default(),
        );
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 3).await;
        assert_eq!(task.state(), StorageState::Init);
        assert!(medium.lock().await.paths().is_empty());
    }

    #[tokio::test]
    async fn init_creates_layout_and_data_file() {
        let medium = Medium::new(MemoryStorage::new());
        let ctx = ready_ctx(LoggerConfig::default(), Capabilities::default());
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), StorageState::Dispatch);
        assert_eq!(task.data_path(), Some("/Data/6553F100.txt"));
        let card = medium.lock().await;
        assert!(card.text(README_PATH).unwrap().contains("distance (mm)"));
        assert_eq!(card.file("/Data/6553F100.txt"), Some(&b""[..]));
    }

    #[tokio::test]
    async fn name_collision_takes_next_suffix() {
        let mut card = MemoryStorage::new();
        card.insert_file("/Data/6553F100.txt", b"older wake\n");
        card.insert_file("/Data/6553F100_1.txt", b"older wake\n");
        let medium = Medium::new(card);
        let ctx = ready_ctx(LoggerConfig::default(), Capabilities::default());
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 1).await;
        assert_eq!(task.data_path(), Some("/Data/6553F100_2.txt"));
    }

    #[tokio::test]
    async fn reading_is_written_as_one_line() {
        let medium = Medium::new(MemoryStorage::new());
        let ctx = ready_ctx(LoggerConfig::default(), Capabilities::default());
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 1).await;
        publish_reading(&ctx, 2450);
        steps(&mut task, &ctx, 2).await;
        assert!(!ctx.data_ready.get());
        let card = medium.lock().await;
        assert_eq!(
            card.text("/Data/6553F100.txt").unwrap(),
            "1700000000, 2450, 3.912, 81.0\n"
        );
        assert_eq!(card.open_handle_count(), 0);
    }

    #[tokio::test]
    async fn reading_waits_for_first_battery_value() {
        let medium = Medium::new(MemoryStorage::new());
        let ctx = ready_ctx(LoggerConfig::default(), Capabilities::default());
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 1).await;
        ctx.distance_mm.put(2450);
        ctx.data_ready.set();
        steps(&mut task, &ctx, 4).await;
        assert!(ctx.data_ready.get());
        assert_eq!(medium.lock().await.file("/Data/6553F100.txt"), Some(&b""[..]));

        ctx.battery.put(Some(BatteryReading {
            volts: 3.95,
            percent: 87.5,
        }));
        steps(&mut task, &ctx, 2).await;
        assert!(!ctx.data_ready.get());
        assert_eq!(
            medium.lock().await.text("/Data/6553F100.txt").unwrap(),
            "1700000000, 2450, 3.950, 87.5\n"
        );
    }

    #[tokio::test]
    async fn full_file_rotates_before_the_next_write() {
        let config = LoggerConfig {
            data_file_cap: 64,
            ..LoggerConfig::default()
        };
        let medium = Medium::new(MemoryStorage::new());
        let ctx = ready_ctx(config, Capabilities::default());
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 1).await;
        for d in 0..7 {
            publish_reading(&ctx, 2000 + d);
            steps(&mut task, &ctx, 2).await;
        }
        let card = medium.lock().await;
        let files = card.paths_in(DATA_DIR);
        assert_eq!(
            files,
            vec!["/Data/6553F100.txt", "/Data/6553F100_1.txt", "/Data/6553F100_2.txt"]
        );
        // Each line is 30 bytes: a file takes writes until it reaches 64.
        for f in &files {
            assert!(card.file(f).unwrap().len() <= 64 + 30);
        }
        assert_eq!(task.data_path(), Some("/Data/6553F100_2.txt"));
    }

    #[tokio::test]
    async fn raw_block_clears_readiness_until_written() {
        let caps = Capabilities {
            survey: SurveyMode::Standalone,
            sensor: SensorKind::None,
            ..Capabilities::default()
        };
        let medium = Medium::new(MemoryStorage::new());
        let ctx = ready_ctx(LoggerConfig::default(), caps);
        ctx.in_long_survey.set();
        ctx.retained.update(|r| r.wake_count = 26);
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 1).await;
        assert_eq!(task.raw_path(), Some("/GNSS_Data/1A_1700000000.ubx"));
        assert_eq!(task.data_path(), None);

        // Move to Sleep with clock already done.
        ctx.sleep_request.set();
        ctx.ready.set(TaskId::Clock);
        steps(&mut task, &ctx, 3).await;
        assert_eq!(task.state(), StorageState::Sleep);
        assert!(ctx.ready.get(TaskId::Storage));

        let block = RawBlock::from_slice(&[0xB5, 0x62, 0x02, 0x15]).unwrap();
        ctx.raw_block.put(Some(block));
        ctx.raw_ready.set();
        steps(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), StorageState::WriteRawBlock);
        assert!(!ctx.ready.get(TaskId::Storage));
        steps(&mut task, &ctx, 1).await;
        assert!(!ctx.raw_ready.get());
        assert!(!ctx.ready.get(TaskId::Storage));
        steps(&mut task, &ctx, 1).await;
        assert!(ctx.ready.get(TaskId::Storage));
        assert_eq!(
            medium.lock().await.file("/GNSS_Data/1A_1700000000.ubx"),
            Some(&[0xB5, 0x62, 0x02, 0x15][..])
        );
    }

    #[tokio::test]
    async fn log_entry_only_with_fix() {
        let medium = Medium::new(MemoryStorage::new());
        let ctx = ready_ctx(LoggerConfig::default(), Capabilities::default());
        ctx.retained.update(|r| r.wake_count = 4);
        ctx.fix_this_wake.set();
        ctx.position.put(Position {
            latitude: 473_977_418,
            longitude: -1_223_456_789,
            altitude_mm: 12_345,
            valid: true,
        });
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 1).await;
        ctx.sleep_request.set();
        ctx.ready.set(TaskId::Clock);
        steps(&mut task, &ctx, 3).await;
        assert!(ctx.ready.get(TaskId::Storage));
        assert_eq!(
            medium.lock().await.text(LOG_PATH).unwrap(),
            "Wake Count, Unix Time, Latitude, Longitude, Altitude\n\
             4, 1700000000, 47.3977418, -122.3456789, 12.345\n"
        );
    }

    #[tokio::test]
    async fn log_entry_waits_for_clock() {
        let medium = Medium::new(MemoryStorage::new());
        let ctx = ready_ctx(LoggerConfig::default(), Capabilities::default());
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 1).await;
        ctx.sleep_request.set();
        steps(&mut task, &ctx, 5).await;
        assert_eq!(task.state(), StorageState::Dispatch);
        assert!(!ctx.ready.get(TaskId::Storage));
        ctx.ready.set(TaskId::Clock);
        steps(&mut task, &ctx, 3).await;
        assert!(ctx.ready.get(TaskId::Storage));
        assert!(medium.lock().await.file(LOG_PATH).is_none());
    }

    #[tokio::test]
    async fn suspend_handshake() {
        let medium = Medium::new(MemoryStorage::new());
        let ctx = ready_ctx(LoggerConfig::default(), Capabilities::default());
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 1).await;

        ctx.transfer_active.set();
        steps(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), StorageState::Suspended);
        assert!(!ctx.write_finished.get());
        steps(&mut task, &ctx, 1).await;
        assert!(ctx.write_finished.get());
        assert!(ctx.ready.get(TaskId::Storage));

        // Readings published during the session wait.
        publish_reading(&ctx, 3000);
        steps(&mut task, &ctx, 5).await;
        assert!(ctx.data_ready.get());

        ctx.transfer_active.clear();
        steps(&mut task, &ctx, 1).await;
        assert!(!ctx.write_finished.get());
        assert!(!ctx.ready.get(TaskId::Storage));
        assert_eq!(task.state(), StorageState::Dispatch);
        steps(&mut task, &ctx, 2).await;
        assert!(medium
            .lock()
            .await
            .text("/Data/6553F100.txt")
            .unwrap()
            .starts_with("1700000000, 3000,"));
    }

    #[tokio::test]
    async fn unusable_card_is_given_up_at_sleep_request() {
        let mut card = MemoryStorage::new();
        card.fail_open(README_PATH);
        let medium = Medium::new(card);
        let ctx = ready_ctx(LoggerConfig::default(), Capabilities::default());
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 5).await;
        assert_eq!(task.state(), StorageState::Init);
        assert!(!ctx.ready.get(TaskId::Storage));

        ctx.sleep_request.set();
        ctx.ready.set(TaskId::Clock);
        steps(&mut task, &ctx, 2).await;
        assert_eq!(task.state(), StorageState::Sleep);
        assert!(ctx.ready.get(TaskId::Storage));
        assert_eq!(task.data_path(), None);
        assert_eq!(medium.lock().await.open_handle_count(), 0);
    }

    #[tokio::test]
    async fn failed_open_is_retried_then_dropped() {
        let mut card = MemoryStorage::new();
        card.fail_open("/Data/6553F100.txt");
        let medium = Medium::new(card);
        let ctx = ready_ctx(LoggerConfig::default(), Capabilities::default());
        let mut task = StorageTask::new(&medium);
        steps(&mut task, &ctx, 3).await;
        // Creation keeps failing: init retries and never dispatches.
        assert_eq!(task.state(), StorageState::Init);

        medium.lock().await.heal("/Data/6553F100.txt");
        steps(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), StorageState::Dispatch);
        assert_eq!(task.failures, 0);

        medium.lock().await.fail_open("/Data/6553F100.txt");
        publish_reading(&ctx, 2450);
        steps(&mut task, &ctx, 2).await; // dispatch, first failure
        assert_eq!(task.state(), StorageState::Dispatch);
        steps(&mut task, &ctx, 4).await; // second and third failures
        assert!(task.pending_reading.is_none());
        medium.lock().await.heal("/Data/6553F100.txt");
        assert_eq!(medium.lock().await.file("/Data/6553F100.txt"), Some(&b""[..]));
    }
}
