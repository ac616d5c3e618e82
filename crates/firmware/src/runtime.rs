//! Process-start hook: one wake cycle.
//!
//! [`start`] validates the configuration, resolves the capability set,
//! restores the retained state and builds the [`ProcessContext`].
//! [`run_cycle`] then runs every task loop, the sleep controller and the
//! watchdog on the current executor until the cycle ends in deep sleep or
//! a reset.
//!
//! ```text
//!   clock ─┐
//! storage ─┤
//! transfer ┼─ join ─┐
//! measure ─┤        │
//! voltage ─┘        ├─ select ─→ Slept(duration) | Reset
//!   sleep ──────────┤
//! watchdog ─────────┘
//! ```

use embassy_futures::join::join5;
use embassy_futures::select::{select3, Either3};
use embassy_time::{Duration, Instant, Timer};
use platform::{PowerControl, RetainedRegion};

use crate::config::{Capabilities, ConfigError, LoggerConfig};
use crate::context::{ProcessContext, TaskId};
use crate::fmt::{error, info, warn, Dbg};
use crate::retained::{BootKind, RetainedStore};
use crate::sleep::{SleepAction, SleepController};
use crate::tasks::ControlLoop;
use crate::watchdog::{Watchdog, WatchdogVerdict};

/// How a wake cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Retained state saved and deep sleep entered for this long.
    Slept(Duration),
    /// Watchdog tripped and a system reset was requested.
    Reset {
        /// First task that never checked in.
        stalled: Option<TaskId>,
    },
}

/// The task instances of one wake cycle. Optional tasks are `None` when the
/// board has no such device.
pub struct TaskSet<Clk, Sto, Tra, Mea, Vol> {
    /// Time and position.
    pub clock: Clk,
    /// Card writes.
    pub storage: Sto,
    /// Wireless file transfer.
    pub transfer: Option<Tra>,
    /// Ranging sensor.
    pub measurement: Option<Mea>,
    /// Battery.
    pub voltage: Vol,
}

/// Validate `config`, resolve `caps`, restore retained state from `store`
/// and build the context for this wake.
pub fn start<R: RetainedRegion>(
    config: LoggerConfig,
    caps: Capabilities,
    store: &mut RetainedStore<R>,
) -> Result<(ProcessContext, BootKind), ConfigError> {
    if let Err(e) = config.validate() {
        error!("runtime: rejected configuration: {}", e.as_str());
        return Err(e);
    }
    let (caps, adjustments) = caps.resolve();
    for adjustment in &adjustments {
        warn!("runtime: capability adjusted: {}", adjustment.as_str());
    }
    let (retained, boot) = store.restore();
    info!(
        "runtime: {} boot, wake {}, clock {}, survey {}",
        boot.as_str(),
        retained.wake_count,
        retained.clock_mode.as_str(),
        caps.survey.as_str()
    );
    Ok((ProcessContext::new(config, caps, retained), boot))
}

async fn drive<T: ControlLoop>(ctx: &ProcessContext, task: Option<&mut T>) {
    let Some(task) = task.filter(|_| ctx.alive.is_active(T::ID)) else {
        core::future::pending::<()>().await;
        return;
    };
    loop {
        task.step(ctx, Instant::now()).await;
        ctx.alive.set(T::ID);
        Timer::after(task.period(ctx)).await;
    }
}

async fn sleeper(ctx: &ProcessContext) -> Duration {
    let mut controller = SleepController::new();
    loop {
        if let SleepAction::EnterDeepSleep(duration) = controller.step(ctx, Instant::now()) {
            return duration;
        }
        ctx.alive.set(TaskId::Sleep);
        Timer::after(ctx.config.periods.sleep).await;
    }
}

async fn watchdog(ctx: &ProcessContext) -> Option<TaskId> {
    let mut dog = Watchdog::new(ctx.config.watchdog_deadline);
    loop {
        if let WatchdogVerdict::Trip { stalled } = dog.step(ctx, Instant::now()) {
            return stalled;
        }
        Timer::after(ctx.config.periods.watchdog).await;
    }
}

/// Run one wake cycle to its end.
///
/// On hardware `enter_deep_sleep` and `system_reset` do not return; host
/// implementations record the request and this returns the outcome.
pub async fn run_cycle<Clk, Sto, Tra, Mea, Vol, P, R>(
    ctx: &ProcessContext,
    tasks: &mut TaskSet<Clk, Sto, Tra, Mea, Vol>,
    power: &mut P,
    store: &mut RetainedStore<R>,
) -> CycleOutcome
where
    Clk: ControlLoop,
    Sto: ControlLoop,
    Tra: ControlLoop,
    Mea: ControlLoop,
    Vol: ControlLoop,
    P: PowerControl,
    R: RetainedRegion,
{
    if ctx.alive.is_active(TaskId::Transfer) && tasks.transfer.is_none() {
        warn!("runtime: wireless enabled but no transfer task supplied");
    }
    if ctx.alive.is_active(TaskId::Measurement) && tasks.measurement.is_none() {
        warn!("runtime: sensor enabled but no measurement task supplied");
    }

    let workers = join5(
        drive(ctx, Some(&mut tasks.clock)),
        drive(ctx, Some(&mut tasks.storage)),
        drive(ctx, tasks.transfer.as_mut()),
        drive(ctx, tasks.measurement.as_mut()),
        drive(ctx, Some(&mut tasks.voltage)),
    );

    match select3(sleeper(ctx), watchdog(ctx), workers).await {
        Either3::First(duration) => {
            let retained = ctx.retained.get();
            if let Err(e) = store.save(&retained) {
                error!("runtime: retained state not saved: {}", Dbg(&e));
            }
            info!(
                "runtime: wake {} done, deep sleep for {} ms",
                retained.wake_count,
                duration.as_millis()
            );
            power.enter_deep_sleep(duration);
            CycleOutcome::Slept(duration)
        }
        Either3::Second(stalled) => {
            error!(
                "runtime: watchdog reset, stalled {}",
                stalled.map_or("none", TaskId::as_str)
            );
            power.system_reset();
            CycleOutcome::Reset { stalled }
        }
        Either3::Third(_) => {
            // Task loops never finish.
            power.system_reset();
            CycleOutcome::Reset { stalled: None }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::{SensorKind, SurveyMode, TaskPeriods};
    use crate::tasks::{ClockTask, MeasurementTask, StorageTask, TransferTask, VoltageTask};
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::mutex::Mutex;
    use platform::mocks::{
        MemoryStorage, MockFuelGauge, MockInternalClock, MockPower, MockRadio, MockRanging,
        MockRetainedRegion, MockTimeSource,
    };

    // 1 minute past the hour.
    const EPOCH: u32 = 1_699_999_260;

    fn fast_config() -> LoggerConfig {
        LoggerConfig {
            read_interval_s: 1,
            watchdog_deadline: Duration::from_millis(500),
            periods: TaskPeriods {
                clock: Duration::from_millis(10),
                storage: Duration::from_millis(5),
                sleep: Duration::from_millis(10),
                watchdog: Duration::from_millis(10),
                measurement: Duration::from_millis(20),
                voltage: Duration::from_millis(50),
                transfer: Duration::from_millis(5),
            },
            ..LoggerConfig::default()
        }
    }

    /// Never finishes its first step.
    struct Stuck;

    impl ControlLoop for Stuck {
        const ID: TaskId = TaskId::Voltage;

        fn period(&self, _ctx: &ProcessContext) -> Duration {
            Duration::from_millis(10)
        }

        async fn step(&mut self, _ctx: &ProcessContext, _now: Instant) {
            core::future::pending::<()>().await;
        }
    }

    #[test]
    fn start_rejects_bad_config_and_resolves_caps() {
        let mut store = RetainedStore::new(MockRetainedRegion::new());
        let bad = LoggerConfig {
            read_interval_s: 0,
            ..LoggerConfig::default()
        };
        assert!(start(bad, Capabilities::default(), &mut store).is_err());

        let caps = Capabilities {
            survey: SurveyMode::Standalone,
            legacy_clock: true,
            ..Capabilities::default()
        };
        let (ctx, boot) = start(LoggerConfig::default(), caps, &mut store).unwrap();
        assert_eq!(boot, BootKind::Cold);
        assert_eq!(ctx.caps.sensor, SensorKind::None);
        assert!(!ctx.caps.legacy_clock);
        assert!(!ctx.alive.is_active(TaskId::Measurement));
    }

    #[tokio::test]
    async fn full_cycle_ends_in_deep_sleep() {
        let mut store = RetainedStore::new(MockRetainedRegion::new());
        let (ctx, _) = start(fast_config(), Capabilities::default(), &mut store).unwrap();
        let medium = Mutex::<CriticalSectionRawMutex, _>::new(MemoryStorage::new());
        let mut buffer = vec![0u8; 4096];
        let mut tasks = TaskSet {
            clock: ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(0)),
            storage: StorageTask::new(&medium),
            transfer: Some(TransferTask::new(MockRadio::new(), &medium, &mut buffer)),
            measurement: Some(MeasurementTask::new(MockRanging::with_peaks(&[2450]))),
            voltage: VoltageTask::new(MockFuelGauge::default()),
        };
        let mut power = MockPower::default();

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            run_cycle(&ctx, &mut tasks, &mut power, &mut store),
        )
        .await
        .expect("cycle should finish");

        assert_eq!(outcome, CycleOutcome::Slept(Duration::from_secs(1)));
        assert_eq!(power.sleeps, vec![Duration::from_secs(1)]);
        assert_eq!(power.resets, 0);

        let (restored, boot) = store.restore();
        assert_eq!(boot, BootKind::Warm);
        assert_eq!(restored.wake_count, 1);
        assert_eq!(restored.last_known_unix, EPOCH);

        let card = medium.lock().await;
        let data = card.paths_in("/Data");
        assert_eq!(data.len(), 1);
        assert!(card.text(&data[0]).unwrap().contains(", 2450, 3.950, 87.5"));
        assert!(card.text("/logFile.txt").is_some());
    }

    #[tokio::test]
    async fn unusable_card_still_sleeps() {
        let mut store = RetainedStore::new(MockRetainedRegion::new());
        let caps = Capabilities {
            sensor: SensorKind::None,
            wireless: false,
            ..Capabilities::default()
        };
        let (ctx, _) = start(fast_config(), caps, &mut store).unwrap();
        let mut card = MemoryStorage::new();
        card.fail_open("/README.txt");
        let medium = Mutex::<CriticalSectionRawMutex, _>::new(card);
        let mut tasks: TaskSet<_, _, Stuck, Stuck, _> = TaskSet {
            clock: ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(0)),
            storage: StorageTask::new(&medium),
            transfer: None,
            measurement: None,
            voltage: VoltageTask::new(MockFuelGauge::default()),
        };
        let mut power = MockPower::default();

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(8),
            run_cycle(&ctx, &mut tasks, &mut power, &mut store),
        )
        .await
        .expect("cycle should end although the card never opened");

        assert_eq!(outcome, CycleOutcome::Slept(Duration::from_secs(1)));
        assert_eq!(power.resets, 0);
        assert_eq!(store.restore().0.wake_count, 1);
        assert!(medium.lock().await.file("/README.txt").is_none());
    }

    #[tokio::test]
    async fn stalled_task_resets() {
        let mut store = RetainedStore::new(MockRetainedRegion::new());
        let caps = Capabilities {
            sensor: SensorKind::None,
            wireless: false,
            ..Capabilities::default()
        };
        let (ctx, _) = start(fast_config(), caps, &mut store).unwrap();
        let medium = Mutex::<CriticalSectionRawMutex, _>::new(MemoryStorage::new());
        let mut tasks: TaskSet<_, _, Stuck, Stuck, _> = TaskSet {
            clock: ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(0)),
            storage: StorageTask::new(&medium),
            transfer: None,
            measurement: None,
            voltage: Stuck,
        };
        let mut power = MockPower::default();

        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            run_cycle(&ctx, &mut tasks, &mut power, &mut store),
        )
        .await
        .expect("watchdog should trip");

        assert_eq!(
            outcome,
            CycleOutcome::Reset {
                stalled: Some(TaskId::Voltage)
            }
        );
        assert_eq!(power.resets, 1);
        assert!(power.sleeps.is_empty());
        // Nothing was saved: the next boot starts from the previous image.
        assert_eq!(store.restore().1, BootKind::Cold);
    }
}
