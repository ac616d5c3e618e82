//! Wireless transfer task.
//!
//! Serves files from the card to a short-range wireless client. The client
//! writes a file name to the request characteristic and receives the file
//! as a stream of notifications, followed by a completion status and the
//! checksum. It then writes back the checksum it computed and the device
//! reports success or asks for a retry.
//!
//! While a client is connected the task holds `transfer_active`, which
//! suspends the storage task; no request touches the card before storage
//! answers with `write_finished`.

use bluetooth::{
    is_manifest_request, render_checksum, CardPath, LinkState, ManifestBuilder, Status,
    TransferSession, Verdict,
};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant};
use platform::{
    Characteristic, OpenMode, StorageMedium, WirelessStack, CHARACTERISTIC_CAPACITY,
};

use super::ControlLoop;
use crate::context::{ProcessContext, TaskId};
use crate::fmt::{debug, error, info, warn, Dbg};

/// Transfer task state. Discriminants match the state codes in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TransferState {
    /// First pass.
    Init = 0,
    /// Advertising in short windows, waiting for a central.
    Advertise = 1,
    /// Central connected; waiting for a request.
    Connected = 2,
    /// Sending chunks.
    Transfer = 3,
    /// Waiting for the client's checksum.
    Verify = 4,
    /// Error reported; dwelling before the next request.
    Error = 5,
}

impl TransferState {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Advertise => "advertise",
            Self::Connected => "connected",
            Self::Transfer => "transfer",
            Self::Verify => "verify",
            Self::Error => "error",
        }
    }
}

/// Why a requested file could not be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError<E> {
    /// Missing file or unreadable medium.
    Open(E),
    /// Size or read failed.
    Io(E),
    /// File larger than the transfer ceiling.
    TooLarge(u64),
}

impl<E> core::fmt::Display for LoadError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Open(_) => f.write_str("open failed"),
            Self::Io(_) => f.write_str("read failed"),
            Self::TooLarge(size) => write!(f, "{size} bytes is over the transfer ceiling"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> std::error::Error for LoadError<E> {}

/// Name the client wrote, without padding.
fn requested_name(raw: &[u8]) -> Option<&str> {
    let text = core::str::from_utf8(raw).ok()?;
    let name = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!name.is_empty()).then_some(name)
}

/// Absolute card path for a requested name.
fn card_path(name: &str) -> Option<CardPath> {
    let mut path = CardPath::new();
    if !name.starts_with('/') {
        path.push('/').ok()?;
    }
    path.push_str(name).ok()?;
    Some(path)
}

/// Read the whole file at `path` into `buffer`, refusing anything larger
/// than `limit`. Returns the number of bytes loaded.
async fn load_file<S: StorageMedium>(
    medium: &mut S,
    path: &str,
    buffer: &mut [u8],
    limit: usize,
) -> Result<usize, LoadError<S::Error>> {
    let mut handle = medium
        .open(path, OpenMode::Read)
        .await
        .map_err(LoadError::Open)?;
    let loaded = read_all(medium, &mut handle, buffer, limit).await;
    let closed = medium.close(handle).await;
    let len = loaded?;
    closed.map_err(LoadError::Io)?;
    Ok(len)
}

async fn read_all<S: StorageMedium>(
    medium: &mut S,
    handle: &mut S::Handle,
    buffer: &mut [u8],
    limit: usize,
) -> Result<usize, LoadError<S::Error>> {
    let size = medium.size(handle).await.map_err(LoadError::Io)?;
    let len = usize::try_from(size)
        .ok()
        .filter(|len| *len <= limit)
        .ok_or(LoadError::TooLarge(size))?;
    let dst = buffer.get_mut(..len).ok_or(LoadError::TooLarge(size))?;
    let mut filled = 0usize;
    while let Some(rest) = dst.get_mut(filled..).filter(|rest| !rest.is_empty()) {
        let n = medium.read(handle, rest).await.map_err(LoadError::Io)?;
        if n == 0 {
            // Shrunk since `size`; send what is there.
            break;
        }
        filled = filled.saturating_add(n);
    }
    Ok(filled)
}

async fn publish<W: WirelessStack>(radio: &mut W, status: Status) -> bool {
    let text = status.render();
    match radio
        .write_value(Characteristic::Status, text.as_bytes())
        .await
    {
        Ok(()) => {
            info!("transfer: status {}", text.as_str());
            true
        }
        Err(e) => {
            warn!("transfer: status write failed: {}", Dbg(&e));
            false
        }
    }
}

/// Wireless transfer task over radio `W` and the shared medium `S`. File
/// contents are loaded into `buffer`, which bounds the largest file served
/// together with the configured ceiling.
pub struct TransferTask<'m, 'b, W, S> {
    radio: W,
    medium: &'m Mutex<CriticalSectionRawMutex, S>,
    buffer: &'b mut [u8],
    link: LinkState,
    session: Option<TransferSession>,
    state: TransferState,
    next_advertise: Option<Instant>,
    advertise_until: Option<Instant>,
    error_since: Option<Instant>,
}

impl<'m, 'b, W: WirelessStack, S: StorageMedium> TransferTask<'m, 'b, W, S> {
    /// Task serving files from `medium` over `radio`.
    pub fn new(radio: W, medium: &'m Mutex<CriticalSectionRawMutex, S>, buffer: &'b mut [u8]) -> Self {
        Self {
            radio,
            medium,
            buffer,
            link: LinkState::new(),
            session: None,
            state: TransferState::Init,
            next_advertise: None,
            advertise_until: None,
            error_since: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Connection bookkeeping.
    pub fn link(&self) -> &LinkState {
        &self.link
    }

    /// Session in progress.
    pub fn session(&self) -> Option<&TransferSession> {
        self.session.as_ref()
    }

    /// The radio.
    pub fn radio(&self) -> &W {
        &self.radio
    }

    /// The radio, mutably.
    pub fn radio_mut(&mut self) -> &mut W {
        &mut self.radio
    }

    fn transition(&mut self, next: TransferState) {
        if next != self.state {
            debug!(
                "transfer: {} ({}) -> {} ({})",
                self.state.as_str(),
                self.state as u8,
                next.as_str(),
                next as u8
            );
            self.state = next;
        }
    }

    /// Drop the session and give the card back to storage.
    fn disconnect(&mut self, ctx: &ProcessContext) -> TransferState {
        if let Some(session) = self.session.take() {
            warn!(
                "transfer: link lost at {} of {} bytes of {}",
                session.offset(),
                session.len(),
                session.path()
            );
        }
        self.link.on_disconnected();
        self.next_advertise = None;
        self.advertise_until = None;
        self.error_since = None;
        ctx.transfer_active.clear();
        ctx.ready.set(TaskId::Transfer);
        info!("transfer: disconnected, card released");
        TransferState::Advertise
    }

    // ── States ──────────────────────────────────────────────────────────────

    async fn advertise(&mut self, ctx: &ProcessContext, now: Instant) -> TransferState {
        if let Some(address) = self.radio.central() {
            if self.advertise_until.take().is_some() {
                if let Err(e) = self.radio.stop_advertise().await {
                    warn!("transfer: stop advertising failed: {}", Dbg(&e));
                }
            }
            self.link.on_connected(address);
            ctx.ready.clear(TaskId::Transfer);
            ctx.transfer_active.set();
            info!(
                "transfer: central connected (connection {}), suspending storage",
                self.link.connections()
            );
            return TransferState::Connected;
        }

        match self.advertise_until {
            Some(until) if now >= until => {
                if let Err(e) = self.radio.stop_advertise().await {
                    warn!("transfer: stop advertising failed: {}", Dbg(&e));
                }
                self.advertise_until = None;
                self.next_advertise = Some(
                    now.checked_add(ctx.config.advertise_interval)
                        .unwrap_or(Instant::MAX),
                );
            }
            Some(_) => {}
            None => {
                if self.next_advertise.map_or(true, |at| now >= at) {
                    match self.radio.advertise(ctx.config.device_name).await {
                        Ok(()) => {
                            self.advertise_until = Some(
                                now.checked_add(ctx.config.advertise_window)
                                    .unwrap_or(Instant::MAX),
                            );
                        }
                        Err(e) => {
                            warn!("transfer: advertising failed: {}", Dbg(&e));
                            self.next_advertise = Some(
                                now.checked_add(ctx.config.advertise_interval)
                                    .unwrap_or(Instant::MAX),
                            );
                        }
                    }
                }
            }
        }
        TransferState::Advertise
    }

    async fn connected(&mut self, ctx: &ProcessContext) -> TransferState {
        if self.radio.central().is_none() {
            return self.disconnect(ctx);
        }
        if !self.link.ready_to_serve() {
            if !ctx.write_finished.get() {
                return TransferState::Connected;
            }
            self.link.on_storage_released();
            info!("transfer: storage suspended, serving requests");
        }
        if !self.radio.written(Characteristic::FileRequest) {
            return TransferState::Connected;
        }

        let raw = self.radio.value(Characteristic::FileRequest);
        let Some(request) = requested_name(&raw).and_then(card_path) else {
            warn!("transfer: unusable request of {} bytes", raw.len());
            publish(&mut self.radio, Status::FileLoadFailed).await;
            return TransferState::Error;
        };
        if is_manifest_request(&request) {
            self.build_manifest(ctx).await
        } else {
            self.load(ctx, request).await
        }
    }

    async fn build_manifest(&mut self, ctx: &ProcessContext) -> TransferState {
        let built = {
            let mut medium = self.medium.lock().await;
            ManifestBuilder::new(ctx.config.manifest_chunk_bytes)
                .build(&mut *medium)
                .await
        };
        match built {
            Ok(chunks) => {
                info!("transfer: manifest written as {} chunk files", chunks);
                publish(&mut self.radio, Status::FileListsMade(chunks)).await;
                TransferState::Connected
            }
            Err(e) => {
                error!("transfer: manifest failed: {}", Dbg(&e));
                publish(&mut self.radio, Status::FileListsFailed).await;
                TransferState::Error
            }
        }
    }

    async fn load(&mut self, ctx: &ProcessContext, path: CardPath) -> TransferState {
        let limit = ctx.config.transfer_ceiling.min(self.buffer.len());
        let loaded = {
            let mut medium = self.medium.lock().await;
            load_file(&mut *medium, &path, &mut *self.buffer, limit).await
        };
        let len = match loaded {
            Ok(len) => len,
            Err(e) => {
                warn!("transfer: cannot load {}: {}", path.as_str(), Dbg(&e));
                publish(&mut self.radio, Status::FileLoadFailed).await;
                return TransferState::Error;
            }
        };
        let Some(contents) = self.buffer.get(..len) else {
            publish(&mut self.radio, Status::FileLoadFailed).await;
            return TransferState::Error;
        };
        let session = TransferSession::new(path, contents);
        info!(
            "transfer: sending {} ({} bytes, checksum {})",
            session.path(),
            session.len(),
            session.expected()
        );
        self.session = Some(session);
        // A checksum written before this session is stale.
        let _ = self.radio.written(Characteristic::Checksum);
        TransferState::Transfer
    }

    async fn transfer(&mut self, ctx: &ProcessContext) -> TransferState {
        if self.radio.central().is_none() {
            return self.disconnect(ctx);
        }
        let Some(session) = self.session.as_mut() else {
            return TransferState::Connected;
        };
        let chunk = ctx.config.chunk_bytes.min(CHARACTERISTIC_CAPACITY);
        let expected = session.expected();
        match session.next_chunk(chunk) {
            Some(range) => {
                let Some(bytes) = self.buffer.get(range) else {
                    return TransferState::Error;
                };
                match self.radio.write_value(Characteristic::FileChunk, bytes).await {
                    Ok(()) => TransferState::Transfer,
                    Err(e) => {
                        warn!("transfer: chunk notify failed: {}", Dbg(&e));
                        self.session = None;
                        TransferState::Error
                    }
                }
            }
            None => {
                publish(&mut self.radio, Status::TransferComplete).await;
                let rendered = render_checksum(expected);
                if let Err(e) = self
                    .radio
                    .write_value(Characteristic::Checksum, rendered.as_bytes())
                    .await
                {
                    warn!("transfer: checksum write failed: {}", Dbg(&e));
                }
                TransferState::Verify
            }
        }
    }

    async fn verify(&mut self, ctx: &ProcessContext) -> TransferState {
        if self.radio.central().is_none() {
            return self.disconnect(ctx);
        }
        if !self.radio.written(Characteristic::Checksum) {
            return TransferState::Verify;
        }
        let raw = self.radio.value(Characteristic::Checksum);
        let Some(mut session) = self.session.take() else {
            return TransferState::Connected;
        };
        let status = match session.verify(&raw) {
            Verdict::Match => {
                info!("transfer: {} verified", session.path());
                Status::TransferSuccess
            }
            Verdict::Mismatch { received } => {
                warn!(
                    "transfer: checksum mismatch for {}: sent {}, client {}",
                    session.path(),
                    session.expected(),
                    received
                );
                Status::RetryTransfer
            }
            Verdict::Malformed(e) => {
                warn!("transfer: malformed client checksum: {}", Dbg(&e));
                Status::RetryTransfer
            }
        };
        publish(&mut self.radio, status).await;
        TransferState::Connected
    }

    async fn error(&mut self, ctx: &ProcessContext, now: Instant) -> TransferState {
        let since = match self.error_since {
            Some(since) => since,
            None => {
                publish(&mut self.radio, Status::Error).await;
                self.error_since = Some(now);
                now
            }
        };
        if now.saturating_duration_since(since) < ctx.config.error_dwell {
            return TransferState::Error;
        }
        self.error_since = None;
        self.session = None;
        if self.radio.central().is_none() {
            self.disconnect(ctx)
        } else {
            TransferState::Connected
        }
    }
}

impl<W: WirelessStack, S: StorageMedium> ControlLoop for TransferTask<'_, '_, W, S> {
    const ID: TaskId = TaskId::Transfer;

    fn period(&self, ctx: &ProcessContext) -> Duration {
        match self.state {
            TransferState::Transfer => ctx.config.chunk_delay,
            _ => ctx.config.periods.transfer,
        }
    }

    async fn step(&mut self, ctx: &ProcessContext, now: Instant) {
        let next = match self.state {
            TransferState::Init => {
                ctx.ready.set(TaskId::Transfer);
                TransferState::Advertise
            }
            TransferState::Advertise => self.advertise(ctx, now).await,
            TransferState::Connected => self.connected(ctx).await,
            TransferState::Transfer => self.transfer(ctx).await,
            TransferState::Verify => self.verify(ctx).await,
            TransferState::Error => self.error(ctx, now).await,
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
    use crate::config::{Capabilities, LoggerConfig};
    use crate::retained::RetainedState;
    use bluetooth::checksum;
    use platform::mocks::{MemoryStorage, MockRadio};

    const PEER: [u8; 6] = [0xC0, 0xFF, 0xEE, 0x00, 0x00, 0x01];

    type Medium = Mutex<CriticalSectionRawMutex, MemoryStorage>;

    fn file_bytes() -> Vec<u8> {
        (0..250u32).map(|i| (i * 7) as u8).collect()
    }

    fn card() -> Medium {
        let mut card = MemoryStorage::new();
        card.insert_file("/Data/6553F100.txt", &file_bytes());
        card.insert_file("/README.txt", b"legend\n");
        Medium::new(card)
    }

    fn ctx_with(config: LoggerConfig) -> ProcessContext {
        ProcessContext::new(config, Capabilities::default(), RetainedState::default())
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    /// Drive to Connected with storage already released.
    async fn connect(task: &mut TransferTask<'_, '_, MockRadio, MemoryStorage>, ctx: &ProcessContext) {
        task.step(ctx, at(0)).await;
        task.radio_mut().connect(PEER);
        task.step(ctx, at(15)).await;
        assert_eq!(task.state(), TransferState::Connected);
        ctx.write_finished.set();
    }

    async fn run(
        task: &mut TransferTask<'_, '_, MockRadio, MemoryStorage>,
        ctx: &ProcessContext,
        passes: usize,
    ) {
        for _ in 0..passes {
            task.step(ctx, at(100)).await;
        }
    }

    #[test]
    fn request_names_are_trimmed_and_rooted() {
        assert_eq!(requested_name(b" Data/1.txt\0\0"), Some("Data/1.txt"));
        assert_eq!(requested_name(b"\0\0"), None);
        assert_eq!(requested_name(&[0xFF, 0xFE]), None);
        assert_eq!(card_path("Data/1.txt").unwrap().as_str(), "/Data/1.txt");
        assert_eq!(card_path("/logFile.txt").unwrap().as_str(), "/logFile.txt");
    }

    #[tokio::test]
    async fn advertises_in_short_windows() {
        let medium = card();
        let ctx = ctx_with(LoggerConfig::default());
        let mut buf = vec![0u8; 1024];
        let mut task = TransferTask::new(MockRadio::new(), &medium, &mut buf);
        task.step(&ctx, at(0)).await;
        assert!(ctx.ready.get(TaskId::Transfer));
        task.step(&ctx, at(15)).await;
        assert!(task.radio().advertising);
        assert_eq!(task.radio().advertised_name.as_deref(), Some("WaterSense"));
        task.step(&ctx, at(100)).await;
        assert!(task.radio().advertising);
        task.step(&ctx, at(120)).await;
        assert!(!task.radio().advertising);
        task.step(&ctx, at(5_000)).await;
        assert_eq!(task.radio().advertise_calls, 1);
        task.step(&ctx, at(10_120)).await;
        assert!(task.radio().advertising);
        assert_eq!(task.radio().advertise_calls, 2);
    }

    #[tokio::test]
    async fn requests_wait_for_storage_to_suspend() {
        let medium = card();
        let ctx = ctx_with(LoggerConfig::default());
        let mut buf = vec![0u8; 1024];
        let mut task = TransferTask::new(MockRadio::new(), &medium, &mut buf);
        task.step(&ctx, at(0)).await;
        task.radio_mut().connect(PEER);
        task.step(&ctx, at(15)).await;
        assert!(ctx.transfer_active.get());
        assert!(!ctx.ready.get(TaskId::Transfer));

        task.radio_mut()
            .client_write(Characteristic::FileRequest, b"Data/6553F100.txt");
        run(&mut task, &ctx, 5).await;
        assert_eq!(task.state(), TransferState::Connected);
        assert!(task.session().is_none());

        ctx.write_finished.set();
        run(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), TransferState::Transfer);
    }

    #[tokio::test]
    async fn file_is_sent_in_chunks_and_verified() {
        let medium = card();
        let ctx = ctx_with(LoggerConfig::default());
        let mut buf = vec![0u8; 1024];
        let mut task = TransferTask::new(MockRadio::new(), &medium, &mut buf);
        connect(&mut task, &ctx).await;
        task.radio_mut()
            .client_write(Characteristic::FileRequest, b"Data/6553F100.txt");
        run(&mut task, &ctx, 1).await;
        assert_eq!(task.period(&ctx), Duration::from_millis(100));

        run(&mut task, &ctx, 4).await;
        assert_eq!(task.state(), TransferState::Verify);
        let expected = checksum(&file_bytes());
        assert_eq!(task.radio().received_file(), file_bytes());
        assert_eq!(task.radio().writes_to(Characteristic::FileChunk).len(), 3);
        assert_eq!(task.radio().statuses(), vec!["TRANSFER_COMPLETE"]);
        assert_eq!(
            task.radio().writes_to(Characteristic::Checksum),
            vec![expected.to_string().into_bytes()]
        );

        run(&mut task, &ctx, 3).await;
        assert_eq!(task.state(), TransferState::Verify);
        let reply = format!("{expected}\0");
        task.radio_mut()
            .client_write(Characteristic::Checksum, reply.as_bytes());
        run(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), TransferState::Connected);
        assert_eq!(
            task.radio().statuses(),
            vec!["TRANSFER_COMPLETE", "TRANSFER_SUCCESS"]
        );
        assert!(ctx.transfer_active.get());
    }

    #[tokio::test]
    async fn wrong_or_garbled_checksum_asks_for_retry() {
        let medium = card();
        let ctx = ctx_with(LoggerConfig::default());
        let mut buf = vec![0u8; 1024];
        let mut task = TransferTask::new(MockRadio::new(), &medium, &mut buf);
        connect(&mut task, &ctx).await;

        for reply in [&b"12345"[..], &b"abc"[..]] {
            task.radio_mut()
                .client_write(Characteristic::FileRequest, b"/README.txt");
            run(&mut task, &ctx, 3).await;
            assert_eq!(task.state(), TransferState::Verify);
            task.radio_mut().client_write(Characteristic::Checksum, reply);
            run(&mut task, &ctx, 1).await;
            assert_eq!(task.state(), TransferState::Connected);
            assert_eq!(task.radio().statuses().last().unwrap(), "RETRY_TRANSFER");
        }
    }

    #[tokio::test]
    async fn manifest_request_reports_chunk_count() {
        let medium = card();
        let ctx = ctx_with(LoggerConfig::default());
        let mut buf = vec![0u8; 1024];
        let mut task = TransferTask::new(MockRadio::new(), &medium, &mut buf);
        connect(&mut task, &ctx).await;
        task.radio_mut()
            .client_write(Characteristic::FileRequest, b"filelist.txt");
        run(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), TransferState::Connected);
        assert_eq!(task.radio().statuses(), vec!["FILELISTS_MADE 1"]);
        assert_eq!(
            medium.lock().await.text("/filelist0.txt").unwrap(),
            "/Data/6553F100.txt,250\n/README.txt,7\n"
        );
    }

    #[tokio::test]
    async fn missing_file_reports_failure_then_dwells() {
        let medium = card();
        let ctx = ctx_with(LoggerConfig::default());
        let mut buf = vec![0u8; 1024];
        let mut task = TransferTask::new(MockRadio::new(), &medium, &mut buf);
        connect(&mut task, &ctx).await;
        task.radio_mut()
            .client_write(Characteristic::FileRequest, b"nope.txt");
        run(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), TransferState::Error);

        task.step(&ctx, at(1_000)).await;
        assert_eq!(task.radio().statuses(), vec!["FILE_LOAD_FAILED", "BLE_ERR"]);
        task.step(&ctx, at(1_900)).await;
        assert_eq!(task.state(), TransferState::Error);
        task.step(&ctx, at(2_000)).await;
        assert_eq!(task.state(), TransferState::Connected);
    }

    #[tokio::test]
    async fn file_over_ceiling_is_refused() {
        let medium = card();
        let config = LoggerConfig {
            transfer_ceiling: 200,
            ..LoggerConfig::default()
        };
        let ctx = ctx_with(config);
        let mut buf = vec![0u8; 1024];
        let mut task = TransferTask::new(MockRadio::new(), &medium, &mut buf);
        connect(&mut task, &ctx).await;
        task.radio_mut()
            .client_write(Characteristic::FileRequest, b"Data/6553F100.txt");
        run(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), TransferState::Error);
        assert_eq!(task.radio().statuses(), vec!["FILE_LOAD_FAILED"]);
        assert!(task.radio().writes_to(Characteristic::FileChunk).is_empty());
    }

    #[tokio::test]
    async fn disconnect_mid_file_restarts_from_zero() {
        let medium = card();
        let ctx = ctx_with(LoggerConfig::default());
        let mut buf = vec![0u8; 1024];
        let mut task = TransferTask::new(MockRadio::new(), &medium, &mut buf);
        connect(&mut task, &ctx).await;
        task.radio_mut()
            .client_write(Characteristic::FileRequest, b"Data/6553F100.txt");
        run(&mut task, &ctx, 2).await;
        assert_eq!(task.session().unwrap().offset(), 100);

        task.radio_mut().disconnect();
        run(&mut task, &ctx, 1).await;
        assert_eq!(task.state(), TransferState::Advertise);
        assert!(task.session().is_none());
        assert!(!ctx.transfer_active.get());
        assert!(ctx.ready.get(TaskId::Transfer));

        // Storage resumes and acknowledges the next connection afresh.
        ctx.write_finished.clear();
        task.radio_mut().device_writes.clear();
        task.radio_mut().connect(PEER);
        run(&mut task, &ctx, 1).await;
        assert_eq!(task.link().connections(), 2);
        ctx.write_finished.set();
        task.radio_mut()
            .client_write(Characteristic::FileRequest, b"Data/6553F100.txt");
        run(&mut task, &ctx, 2).await;
        let chunks = task.radio().writes_to(Characteristic::FileChunk);
        assert_eq!(chunks[0], file_bytes()[..100].to_vec());
    }
}
