//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits
//! for use in unit and integration tests and in the desktop emulator.
//! Every mock exposes its recorded interactions as public fields or
//! accessors so tests can assert on them after a task has driven it.

#![cfg(any(test, feature = "std"))]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::string::String;
use std::vec::Vec;

use embassy_time::Duration;

use crate::*;

// ── Receiver ────────────────────────────────────────────────────────────────

/// Mock satellite receiver.
///
/// The fix appears after a scripted number of [`TimeSource::has_fix`] polls;
/// raw bytes are queued with [`MockTimeSource::push_raw`].
pub struct MockTimeSource {
    /// `Some(n)`: polls `n` and later report a fix. `None`: never.
    pub fix_after_polls: Option<u32>,
    /// Epoch reported while a fix is held.
    pub epoch: u32,
    /// Latitude in 1e-7 degrees.
    pub latitude: i32,
    /// Longitude in 1e-7 degrees.
    pub longitude: i32,
    /// Altitude in millimetres.
    pub altitude: i32,
    /// Whether `begin_acquisition` acknowledges.
    pub begin_succeeds: bool,
    /// Number of `begin_acquisition` calls.
    pub begin_calls: u32,
    /// Mode of the last `begin_acquisition` call.
    pub last_mode: Option<AcquisitionMode>,
    /// `power_off` polls needed before the receiver confirms.
    pub power_off_polls_needed: u32,
    /// Set once power-off has been confirmed.
    pub powered_off: bool,
    /// Duration hint of the last `power_off` call.
    pub power_off_hint: Option<Duration>,
    polls: u32,
    power_off_polls: u32,
    raw: VecDeque<u8>,
}

impl MockTimeSource {
    /// Receiver that reports a fix on the first poll.
    pub fn with_fix(epoch: u32) -> Self {
        Self {
            fix_after_polls: Some(0),
            epoch,
            ..Self::without_fix()
        }
    }

    /// Receiver that never reports a fix.
    pub fn without_fix() -> Self {
        Self {
            fix_after_polls: None,
            epoch: 0,
            latitude: 0,
            longitude: 0,
            altitude: 0,
            begin_succeeds: true,
            begin_calls: 0,
            last_mode: None,
            power_off_polls_needed: 1,
            powered_off: false,
            power_off_hint: None,
            polls: 0,
            power_off_polls: 0,
            raw: VecDeque::new(),
        }
    }

    /// Queue raw-capture bytes in the receiver buffer.
    pub fn push_raw(&mut self, bytes: &[u8]) {
        self.raw.extend(bytes.iter().copied());
    }

    /// Bytes still waiting in the receiver buffer.
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    /// Drop the fix from the next poll on.
    pub fn lose_fix(&mut self) {
        self.fix_after_polls = None;
    }
}

impl TimeSource for MockTimeSource {
    fn begin_acquisition(&mut self, mode: AcquisitionMode) -> bool {
        self.begin_calls = self.begin_calls.saturating_add(1);
        self.last_mode = Some(mode);
        self.powered_off = false;
        self.begin_succeeds
    }

    fn has_fix(&mut self) -> bool {
        let fix = matches!(self.fix_after_polls, Some(n) if self.polls >= n);
        self.polls = self.polls.saturating_add(1);
        fix
    }

    fn epoch_seconds(&mut self) -> u32 {
        self.epoch
    }

    fn latitude(&mut self) -> i32 {
        self.latitude
    }

    fn longitude(&mut self) -> i32 {
        self.longitude
    }

    fn altitude(&mut self) -> i32 {
        self.altitude
    }

    fn buffered_byte_count(&mut self) -> u16 {
        u16::try_from(self.raw.len()).unwrap_or(u16::MAX)
    }

    fn extract(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0usize;
        for slot in buf.iter_mut() {
            let Some(byte) = self.raw.pop_front() else {
                break;
            };
            *slot = byte;
            n = n.saturating_add(1);
        }
        n
    }

    fn power_off(&mut self, duration_hint: Duration) -> bool {
        self.power_off_hint = Some(duration_hint);
        self.power_off_polls = self.power_off_polls.saturating_add(1);
        if self.power_off_polls >= self.power_off_polls_needed {
            self.powered_off = true;
        }
        self.powered_off
    }
}

/// Mock internal clock; advance it by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockInternalClock {
    /// Current epoch seconds.
    pub epoch: u32,
}

impl MockInternalClock {
    /// Clock reading `epoch`.
    pub fn at(epoch: u32) -> Self {
        Self { epoch }
    }

    /// Move the clock forward.
    pub fn advance(&mut self, seconds: u32) {
        self.epoch = self.epoch.saturating_add(seconds);
    }
}

impl InternalClock for MockInternalClock {
    fn epoch_seconds(&self) -> u32 {
        self.epoch
    }

    fn set_epoch_seconds(&mut self, seconds: u32) {
        self.epoch = seconds;
    }
}

// ── Power ───────────────────────────────────────────────────────────────────

/// Mock fuel gauge returning fixed readings.
#[derive(Debug, Clone, Copy)]
pub struct MockFuelGauge {
    /// Cell voltage in volts.
    pub voltage: f32,
    /// State of charge in percent.
    pub percent: f32,
}

impl MockFuelGauge {
    /// Gauge reporting `voltage` and `percent`.
    pub fn new(voltage: f32, percent: f32) -> Self {
        Self { voltage, percent }
    }
}

impl Default for MockFuelGauge {
    fn default() -> Self {
        Self::new(3.95, 87.5)
    }
}

impl FuelGauge for MockFuelGauge {
    fn cell_voltage(&mut self) -> f32 {
        self.voltage
    }

    fn cell_percent(&mut self) -> f32 {
        self.percent
    }
}

/// Mock power control recording every request.
#[derive(Debug, Default)]
pub struct MockPower {
    /// Durations passed to `enter_deep_sleep`, in call order.
    pub sleeps: Vec<Duration>,
    /// Number of `system_reset` calls.
    pub resets: u32,
}

impl PowerControl for MockPower {
    fn enter_deep_sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }

    fn system_reset(&mut self) {
        self.resets = self.resets.saturating_add(1);
    }
}

/// Mock retained region; survives as long as the value does.
#[derive(Debug, Clone)]
pub struct MockRetainedRegion {
    image: [u8; RETAINED_REGION_BYTES],
}

impl MockRetainedRegion {
    /// Zeroed region, as after a cold boot.
    pub fn new() -> Self {
        Self {
            image: [0; RETAINED_REGION_BYTES],
        }
    }

    /// Flip every bit of the stored image.
    pub fn corrupt(&mut self) {
        for byte in &mut self.image {
            *byte = !*byte;
        }
    }
}

impl Default for MockRetainedRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl RetainedRegion for MockRetainedRegion {
    fn load(&mut self, buf: &mut [u8]) {
        for (dst, src) in buf.iter_mut().zip(self.image.iter()) {
            *dst = *src;
        }
    }

    fn store(&mut self, bytes: &[u8]) {
        for (dst, src) in self.image.iter_mut().zip(bytes.iter()) {
            *dst = *src;
        }
    }
}

// ── Ranging ─────────────────────────────────────────────────────────────────

/// Mock ranging sensor with scripted peaks.
#[derive(Debug)]
pub struct MockRanging {
    /// Status returned by every trigger.
    pub status: RangingStatus,
    /// Peak distances in millimetres.
    pub peaks: Vec<u32>,
    /// Number of triggered sweeps.
    pub triggers: u32,
    /// Set by `stop`.
    pub stopped: bool,
}

impl MockRanging {
    /// Sensor reporting `peaks` on every sweep.
    pub fn with_peaks(peaks: &[u32]) -> Self {
        Self {
            status: RangingStatus::Ok,
            peaks: peaks.to_vec(),
            triggers: 0,
            stopped: false,
        }
    }
}

impl RangingSensor for MockRanging {
    fn trigger_reading(&mut self) -> RangingStatus {
        self.triggers = self.triggers.saturating_add(1);
        self.stopped = false;
        self.status
    }

    fn peak_count(&mut self) -> u32 {
        u32::try_from(self.peaks.len()).unwrap_or(u32::MAX)
    }

    fn peak_distance(&mut self, index: u32) -> Option<u32> {
        self.peaks.get(usize::try_from(index).ok()?).copied()
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

// ── Wireless ────────────────────────────────────────────────────────────────

fn slot(characteristic: Characteristic) -> usize {
    match characteristic {
        Characteristic::FileRequest => 0,
        Characteristic::FileChunk => 1,
        Characteristic::Checksum => 2,
        Characteristic::Status => 3,
    }
}

/// Mock wireless stack driven by the test as if it were the client.
#[derive(Debug, Default)]
pub struct MockRadio {
    /// Whether the service is currently advertised.
    pub advertising: bool,
    /// Number of `advertise` calls.
    pub advertise_calls: u32,
    /// Name passed to the last `advertise` call.
    pub advertised_name: Option<String>,
    /// Every device-side write, in order.
    pub device_writes: Vec<(Characteristic, Vec<u8>)>,
    peer: Option<PeerAddress>,
    values: [CharacteristicValue; 4],
    written: [bool; 4],
}

impl MockRadio {
    /// Radio with no central connected.
    pub fn new() -> Self {
        Self::default()
    }

    /// A central connects.
    pub fn connect(&mut self, address: PeerAddress) {
        self.peer = Some(address);
    }

    /// The central goes away.
    pub fn disconnect(&mut self) {
        self.peer = None;
    }

    /// The client writes `bytes` to `characteristic`. Returns `false` if
    /// the value does not fit the characteristic.
    pub fn client_write(&mut self, characteristic: Characteristic, bytes: &[u8]) -> bool {
        let Ok(value) = CharacteristicValue::from_slice(bytes) else {
            return false;
        };
        if let Some(v) = self.values.get_mut(slot(characteristic)) {
            *v = value;
        }
        if let Some(w) = self.written.get_mut(slot(characteristic)) {
            *w = true;
        }
        true
    }

    /// Device writes to `characteristic`, oldest first.
    pub fn writes_to(&self, characteristic: Characteristic) -> Vec<Vec<u8>> {
        self.device_writes
            .iter()
            .filter(|(c, _)| *c == characteristic)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Status strings the device published, oldest first.
    pub fn statuses(&self) -> Vec<String> {
        self.writes_to(Characteristic::Status)
            .into_iter()
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .collect()
    }

    /// Concatenation of every notified file chunk.
    pub fn received_file(&self) -> Vec<u8> {
        self.writes_to(Characteristic::FileChunk).concat()
    }
}

impl WirelessStack for MockRadio {
    type Error = core::convert::Infallible;

    async fn advertise(&mut self, name: &str) -> Result<(), Self::Error> {
        self.advertising = true;
        self.advertised_name = Some(name.to_owned());
        self.advertise_calls = self.advertise_calls.saturating_add(1);
        Ok(())
    }

    async fn stop_advertise(&mut self) -> Result<(), Self::Error> {
        self.advertising = false;
        Ok(())
    }

    fn central(&mut self) -> Option<PeerAddress> {
        self.peer
    }

    fn written(&mut self, characteristic: Characteristic) -> bool {
        self.written
            .get_mut(slot(characteristic))
            .is_some_and(|w| core::mem::replace(w, false))
    }

    fn value(&mut self, characteristic: Characteristic) -> CharacteristicValue {
        self.values
            .get(slot(characteristic))
            .cloned()
            .unwrap_or_default()
    }

    async fn write_value(
        &mut self,
        characteristic: Characteristic,
        bytes: &[u8],
    ) -> Result<(), Self::Error> {
        if let (Some(v), Ok(value)) = (
            self.values.get_mut(slot(characteristic)),
            CharacteristicValue::from_slice(bytes),
        ) {
            *v = value;
        }
        self.device_writes.push((characteristic, bytes.to_vec()));
        Ok(())
    }
}

// ── Storage ─────────────────────────────────────────────────────────────────

/// Error type for [`MemoryStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryStorageError {
    /// No such file or parent directory.
    NotFound,
    /// Write attempted on a handle opened for reading.
    ReadOnly,
    /// Failure injected with [`MemoryStorage::fail_open`].
    Injected,
}

impl core::fmt::Display for MemoryStorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::ReadOnly => f.write_str("handle is read-only"),
            Self::Injected => f.write_str("injected failure"),
        }
    }
}

/// Open handle into [`MemoryStorage`].
#[derive(Debug)]
pub struct MemoryHandle {
    path: String,
    mode: OpenMode,
    pos: usize,
}

/// In-memory storage medium with a flat map of absolute paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    failing: BTreeSet<String>,
    open_handles: usize,
    /// Number of successful `write` calls.
    pub writes: usize,
}

fn parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((dir, name)) => (dir, name),
        None => ("/", path),
    }
}

impl MemoryStorage {
    /// Empty medium.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a file on the medium, creating its parent directory.
    pub fn insert_file(&mut self, path: &str, contents: &[u8]) {
        let (dir, _) = parent(path);
        if dir != "/" {
            self.dirs.insert(dir.to_owned());
        }
        self.files.insert(path.to_owned(), contents.to_vec());
    }

    /// Contents of the file at `path`.
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Contents of the file at `path` as text.
    pub fn text(&self, path: &str) -> Option<String> {
        self.file(path).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Every file path, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Every file path inside `dir`, sorted.
    pub fn paths_in(&self, dir: &str) -> Vec<String> {
        self.files
            .keys()
            .filter(|p| parent(p).0 == dir)
            .cloned()
            .collect()
    }

    /// Make every future `open` of `path` fail.
    pub fn fail_open(&mut self, path: &str) {
        self.failing.insert(path.to_owned());
    }

    /// Undo [`fail_open`](Self::fail_open).
    pub fn heal(&mut self, path: &str) {
        self.failing.remove(path);
    }

    /// Handles opened and not yet closed.
    pub fn open_handle_count(&self) -> usize {
        self.open_handles
    }

    fn dir_exists(&self, dir: &str) -> bool {
        dir == "/" || self.dirs.contains(dir)
    }
}

impl StorageMedium for MemoryStorage {
    type Error = MemoryStorageError;
    type Handle = MemoryHandle;

    async fn open(&mut self, path: &str, mode: OpenMode) -> Result<Self::Handle, Self::Error> {
        if self.failing.contains(path) {
            return Err(MemoryStorageError::Injected);
        }
        let (dir, _) = parent(path);
        if !self.dir_exists(dir) {
            return Err(MemoryStorageError::NotFound);
        }
        match mode {
            OpenMode::Read => {
                if !self.files.contains_key(path) {
                    return Err(MemoryStorageError::NotFound);
                }
            }
            OpenMode::Append => {
                self.files.entry(path.to_owned()).or_default();
            }
            OpenMode::Truncate => {
                self.files.insert(path.to_owned(), Vec::new());
            }
        }
        self.open_handles = self.open_handles.saturating_add(1);
        Ok(MemoryHandle {
            path: path.to_owned(),
            mode,
            pos: 0,
        })
    }

    async fn exists(&mut self, path: &str) -> Result<bool, Self::Error> {
        Ok(self.files.contains_key(path) || self.dir_exists(path))
    }

    async fn mkdir(&mut self, path: &str) -> Result<(), Self::Error> {
        self.dirs.insert(path.to_owned());
        Ok(())
    }

    async fn remove(&mut self, path: &str) -> Result<(), Self::Error> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or(MemoryStorageError::NotFound)
    }

    async fn size(&mut self, handle: &Self::Handle) -> Result<u64, Self::Error> {
        self.files
            .get(&handle.path)
            .map(|f| f.len() as u64)
            .ok_or(MemoryStorageError::NotFound)
    }

    async fn write(&mut self, handle: &mut Self::Handle, bytes: &[u8]) -> Result<(), Self::Error> {
        if handle.mode == OpenMode::Read {
            return Err(MemoryStorageError::ReadOnly);
        }
        let file = self
            .files
            .get_mut(&handle.path)
            .ok_or(MemoryStorageError::NotFound)?;
        file.extend_from_slice(bytes);
        self.writes = self.writes.saturating_add(1);
        Ok(())
    }

    async fn read(
        &mut self,
        handle: &mut Self::Handle,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let file = self
            .files
            .get(&handle.path)
            .ok_or(MemoryStorageError::NotFound)?;
        let rest = file.get(handle.pos..).unwrap_or_default();
        let n = rest.len().min(buf.len());
        if let (Some(dst), Some(src)) = (buf.get_mut(..n), rest.get(..n)) {
            dst.copy_from_slice(src);
        }
        handle.pos = handle.pos.saturating_add(n);
        Ok(n)
    }

    async fn close(&mut self, _handle: Self::Handle) -> Result<(), Self::Error> {
        self.open_handles = self.open_handles.saturating_sub(1);
        Ok(())
    }

    async fn dir_entry(&mut self, dir: &str, index: usize) -> Result<Option<DirEntry>, Self::Error> {
        if !self.dir_exists(dir) {
            return Err(MemoryStorageError::NotFound);
        }
        let dirs = self
            .dirs
            .iter()
            .filter(|d| parent(d).0 == dir && d.as_str() != "/")
            .map(|d| (parent(d).1, true, 0u64));
        let files = self
            .files
            .iter()
            .filter(|(p, _)| parent(p).0 == dir)
            .map(|(p, f)| (parent(p).1, false, f.len() as u64));
        let mut entries: Vec<_> = dirs.chain(files).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Ok(entries.get(index).and_then(|(name, is_dir, size)| {
            Some(DirEntry {
                name: FileName::try_from(*name).ok()?,
                is_dir: *is_dir,
                size: *size,
            })
        }))
    }
}
