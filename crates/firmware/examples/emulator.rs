//! Desktop emulator: runs wake cycles of the logger against mock devices
//! and a local directory standing in for the card.
//!
//! Deep sleep is not waited out; the emulated clocks jump forward by the
//! requested duration between cycles.
//!
//! ```bash
//! CARD_PATH=./card RUST_LOG=info cargo run -p firmware --example emulator --features emulator -- 3
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Duration;
use firmware::config::TaskPeriods;
use firmware::runtime::start;
use firmware::{
    run_cycle, Capabilities, ClockTask, CycleOutcome, LoggerConfig, MeasurementTask,
    RetainedStore, StorageTask, TaskSet, TransferTask, VoltageTask,
};
use platform::config::{APP_NAME, APP_VERSION};
use platform::mocks::{
    MockFuelGauge, MockInternalClock, MockPower, MockRadio, MockRanging, MockRetainedRegion,
    MockTimeSource,
};
use platform::storage_local::LocalStorage;
use tracing_subscriber::EnvFilter;

// 2023-11-14 22:14:20 UTC.
const FIRST_FIX: u32 = 1_700_000_060;

fn emulator_config() -> LoggerConfig {
    LoggerConfig {
        read_interval_s: 3,
        periods: TaskPeriods {
            voltage: Duration::from_millis(250),
            ..TaskPeriods::default()
        },
        ..LoggerConfig::default()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cycles: u32 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 3,
    };
    let card = LocalStorage::from_env().unwrap_or_else(|| LocalStorage::new("./card"));
    std::fs::create_dir_all(card.root())?;
    tracing::info!(
        "{} {} emulator: {} wake cycles, card at {}",
        APP_NAME,
        APP_VERSION,
        cycles,
        card.root().display()
    );
    let medium = Mutex::<CriticalSectionRawMutex, _>::new(card);

    let mut receiver = MockTimeSource::with_fix(FIRST_FIX);
    receiver.latitude = 473_977_418;
    receiver.longitude = 85_455_939;
    receiver.altitude = 408_250;
    let mut rtc = MockInternalClock::at(0);
    let mut region = MockRetainedRegion::new();
    let gauge = MockFuelGauge::new(4.05, 96.0);
    let mut buffer = vec![0u8; emulator_config().transfer_ceiling];

    for cycle in 0..cycles {
        let mut store = RetainedStore::new(region);
        let (ctx, _boot) = start(emulator_config(), Capabilities::default(), &mut store)?;

        // Water level drifts by a few centimetres per wake.
        let level = 2_450u32.saturating_add(cycle.saturating_mul(35));
        let mut tasks = TaskSet {
            clock: ClockTask::new(receiver, rtc),
            storage: StorageTask::new(&medium),
            transfer: Some(TransferTask::new(MockRadio::new(), &medium, &mut buffer)),
            measurement: Some(MeasurementTask::new(MockRanging::with_peaks(&[
                600, level, 14_500,
            ]))),
            voltage: VoltageTask::new(gauge),
        };
        let mut power = MockPower::default();
        let outcome = run_cycle(&ctx, &mut tasks, &mut power, &mut store).await;
        let TaskSet { clock, .. } = tasks;
        (receiver, rtc) = clock.into_parts();
        region = store.into_inner();

        match outcome {
            CycleOutcome::Slept(duration) => {
                let secs = u32::try_from(duration.as_secs()).unwrap_or(u32::MAX);
                tracing::info!("cycle {} slept {} s", cycle, secs);
                rtc.advance(secs);
                receiver.epoch = receiver.epoch.saturating_add(secs);
            }
            CycleOutcome::Reset { stalled } => {
                tracing::error!(
                    "cycle {} reset, stalled task: {}",
                    cycle,
                    stalled.map_or("none", |id| id.as_str())
                );
                region = MockRetainedRegion::new();
            }
        }
    }
    Ok(())
}
