//! Wake-cycle scenario tests
//!
//! Drives every task, the sleep controller and the watchdog on a simulated
//! millisecond clock, against mock devices and an in-memory card. Each task
//! is stepped whenever its period has elapsed, the way the runtime loops do,
//! but without real timers.
//!
//! Run with: cargo test -p firmware --test wake_cycle

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    missing_docs
)]

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{Duration, Instant};
use firmware::sleep::SleepAction;
use firmware::tasks::TransferState;
use firmware::{
    Capabilities, ClockMode, ClockTask, ControlLoop, LoggerConfig, MeasurementTask,
    ProcessContext, RetainedState, SleepController, StorageTask, TaskId, TransferTask,
    VoltageTask, Watchdog, WatchdogVerdict,
};
use platform::mocks::{
    MemoryStorage, MockFuelGauge, MockInternalClock, MockRadio, MockRanging, MockTimeSource,
};
use platform::Characteristic;

/// One minute past the hour.
const EPOCH: u32 = 1_699_999_260;
const PEER: [u8; 6] = [0x5A, 0x11, 0x00, 0x00, 0x00, 0x07];
const TICK_MS: u64 = 5;

type Medium = Mutex<CriticalSectionRawMutex, MemoryStorage>;

#[derive(Debug, PartialEq)]
enum End {
    Slept(Duration),
    Tripped(Option<TaskId>),
}

struct Sim<'m, 'b> {
    ctx: ProcessContext,
    clock: ClockTask<MockTimeSource, MockInternalClock>,
    storage: StorageTask<'m, MemoryStorage>,
    transfer: TransferTask<'m, 'b, MockRadio, MemoryStorage>,
    measure: MeasurementTask<MockRanging>,
    voltage: VoltageTask<MockFuelGauge>,
    sleep: SleepController,
    dog: Watchdog,
    due: [u64; 7],
    now: u64,
}

async fn tick<T: ControlLoop>(task: &mut T, ctx: &ProcessContext, due: &mut u64, now: u64) {
    if now >= *due {
        task.step(ctx, Instant::from_millis(now)).await;
        ctx.alive.set(T::ID);
        *due = now + task.period(ctx).as_millis();
    }
}

impl<'m, 'b> Sim<'m, 'b> {
    fn new(
        receiver: MockTimeSource,
        rtc: MockInternalClock,
        medium: &'m Medium,
        buffer: &'b mut [u8],
    ) -> Self {
        let config = LoggerConfig::default();
        let dog = Watchdog::new(config.watchdog_deadline);
        Self {
            ctx: ProcessContext::new(config, Capabilities::default(), RetainedState::default()),
            clock: ClockTask::new(receiver, rtc),
            storage: StorageTask::new(medium),
            transfer: TransferTask::new(MockRadio::new(), medium, buffer),
            measure: MeasurementTask::new(MockRanging::with_peaks(&[700, 2450, 16_000])),
            voltage: VoltageTask::new(MockFuelGauge::new(3.95, 87.5)),
            sleep: SleepController::new(),
            dog,
            due: [0; 7],
            now: 0,
        }
    }

    /// Advance the simulated clock by `ms`. Stops early when the cycle ends.
    async fn advance(&mut self, ms: u64) -> Option<End> {
        let until = self.now + ms;
        while self.now < until {
            let now = self.now;
            let ctx = &self.ctx;
            let [clock, storage, transfer, measure, voltage, sleep, dog] = &mut self.due;
            tick(&mut self.clock, ctx, clock, now).await;
            tick(&mut self.storage, ctx, storage, now).await;
            tick(&mut self.transfer, ctx, transfer, now).await;
            tick(&mut self.measure, ctx, measure, now).await;
            tick(&mut self.voltage, ctx, voltage, now).await;
            if now >= *sleep {
                if let SleepAction::EnterDeepSleep(d) = self.sleep.step(ctx, Instant::from_millis(now)) {
                    return Some(End::Slept(d));
                }
                ctx.alive.set(TaskId::Sleep);
                *sleep = now + ctx.config.periods.sleep.as_millis();
            }
            if now >= *dog {
                if let WatchdogVerdict::Trip { stalled } = self.dog.step(ctx, Instant::from_millis(now)) {
                    return Some(End::Tripped(stalled));
                }
                *dog = now + ctx.config.periods.watchdog.as_millis();
            }
            self.now += TICK_MS;
        }
        None
    }

    async fn run_to_end(&mut self, limit_ms: u64) -> End {
        self.advance(limit_ms).await.expect("cycle should end within the limit")
    }
}

#[tokio::test]
async fn no_fix_falls_back_to_internal_clock_and_still_sleeps() {
    let medium = Medium::new(MemoryStorage::new());
    let mut buffer = vec![0u8; 4096];
    let mut sim = Sim::new(
        MockTimeSource::without_fix(),
        MockInternalClock::at(EPOCH),
        &medium,
        &mut buffer,
    );

    // Nothing is stored while the receiver is still searching.
    assert_eq!(sim.advance(100_000).await, None);
    assert!(!sim.ctx.device_ready.get());
    assert!(medium.lock().await.paths().is_empty());

    let end = sim.run_to_end(200_000).await;
    assert_eq!(end, End::Slept(Duration::from_secs(60)));
    assert_eq!(sim.ctx.retained.get().clock_mode, ClockMode::Internal);
    assert_eq!(sim.ctx.retained.get().wake_count, 1);
    assert!(sim.clock.receiver().powered_off);

    let card = medium.lock().await;
    let data = card.text("/Data/6553EE1C.txt").expect("data file named by fallback time");
    assert!(data.starts_with(&format!("{EPOCH}, 2450, 3.950, 87.5\n")));
    assert!(data.lines().count() > 100);
    // No fix this wake: no log entry.
    assert!(card.file("/logFile.txt").is_none());
    assert_eq!(card.open_handle_count(), 0);
}

#[tokio::test]
async fn fix_wake_logs_position_and_sleeps_to_interval() {
    let medium = Medium::new(MemoryStorage::new());
    let mut buffer = vec![0u8; 4096];
    let mut receiver = MockTimeSource::with_fix(EPOCH);
    receiver.latitude = -337_123_456;
    receiver.longitude = 1_512_345_678;
    receiver.altitude = 52_125;
    let mut sim = Sim::new(receiver, MockInternalClock::at(0), &medium, &mut buffer);

    let end = sim.run_to_end(70_000).await;
    assert_eq!(end, End::Slept(Duration::from_secs(60)));
    let retained = sim.ctx.retained.get();
    assert_eq!(retained.clock_mode, ClockMode::External);
    assert!(retained.last_fix_ok);
    assert_eq!(retained.last_known_unix, EPOCH);
    assert_eq!(
        sim.clock.receiver().power_off_hint,
        Some(Duration::from_millis(54_000))
    );

    let card = medium.lock().await;
    assert_eq!(
        card.text("/logFile.txt").unwrap(),
        format!(
            "Wake Count, Unix Time, Latitude, Longitude, Altitude\n\
             1, {EPOCH}, -33.7123456, 151.2345678, 52.125\n"
        )
    );
}

#[tokio::test]
async fn disconnect_mid_transfer_releases_card_and_restarts_from_zero() {
    let medium = Medium::new(MemoryStorage::new());
    let mut buffer = vec![0u8; 65_536];
    let mut sim = Sim::new(
        MockTimeSource::with_fix(EPOCH),
        MockInternalClock::at(0),
        &medium,
        &mut buffer,
    );

    // A few seconds of readings.
    assert_eq!(sim.advance(3_000).await, None);
    let path = sim.storage.data_path().unwrap().to_owned();

    sim.transfer.radio_mut().connect(PEER);
    assert_eq!(sim.advance(50).await, None);
    assert!(sim.ctx.transfer_active.get());
    assert!(sim.ctx.write_finished.get());
    let frozen = medium.lock().await.file(&path).unwrap().to_vec();
    assert!(frozen.len() > 300);

    sim.transfer
        .radio_mut()
        .client_write(Characteristic::FileRequest, path.as_bytes());
    assert_eq!(sim.advance(250).await, None);
    assert_eq!(sim.transfer.state(), TransferState::Transfer);
    let offset = sim.transfer.session().unwrap().offset();
    assert!(offset > 0 && offset < frozen.len());
    // Storage wrote nothing while the client held the card.
    assert_eq!(medium.lock().await.file(&path).unwrap(), &frozen[..]);

    // Mid-transfer the task runs once per chunk delay: the drop is seen on
    // the next chunk pass.
    sim.transfer.radio_mut().disconnect();
    let chunk_delay = sim.ctx.config.chunk_delay.as_millis();
    assert_eq!(sim.advance(chunk_delay).await, None);
    assert_eq!(sim.transfer.state(), TransferState::Advertise);
    assert!(sim.transfer.session().is_none());
    assert!(!sim.ctx.transfer_active.get());

    // Storage leaves Suspended on its following pass.
    let storage_period = sim.ctx.config.periods.storage.as_millis();
    assert_eq!(sim.advance(storage_period + TICK_MS).await, None);
    assert!(!sim.ctx.write_finished.get());

    // Storage resumes normal writes.
    assert_eq!(sim.advance(1_000).await, None);
    let grown = medium.lock().await.file(&path).unwrap().to_vec();
    assert!(grown.len() > frozen.len());

    // The next connection starts the file from the beginning.
    sim.transfer.radio_mut().device_writes.clear();
    sim.transfer.radio_mut().connect(PEER);
    assert_eq!(sim.advance(50).await, None);
    sim.transfer
        .radio_mut()
        .client_write(Characteristic::FileRequest, path.as_bytes());
    assert_eq!(sim.advance(150).await, None);
    let chunks = sim.transfer.radio().writes_to(Characteristic::FileChunk);
    assert!(!chunks.is_empty());
    assert_eq!(chunks[0], grown[..100].to_vec());
    assert_eq!(sim.transfer.link().connections(), 2);
}

#[tokio::test]
async fn open_session_holds_off_sleep_until_client_leaves() {
    let medium = Medium::new(MemoryStorage::new());
    let mut buffer = vec![0u8; 4096];
    let mut sim = Sim::new(
        MockTimeSource::with_fix(EPOCH),
        MockInternalClock::at(0),
        &medium,
        &mut buffer,
    );
    assert_eq!(sim.advance(59_000).await, None);
    sim.transfer.radio_mut().connect(PEER);

    // Window closes while connected: everyone else is ready, transfer is not.
    assert_eq!(sim.advance(10_000).await, None);
    assert!(sim.ctx.sleep_request.get());
    assert!(sim.ctx.ready.get(TaskId::Clock));
    assert!(sim.ctx.ready.get(TaskId::Storage));
    assert!(!sim.ctx.ready.get(TaskId::Transfer));

    sim.transfer.radio_mut().disconnect();
    let end = sim.run_to_end(1_000).await;
    assert!(matches!(end, End::Slept(_)));
}
