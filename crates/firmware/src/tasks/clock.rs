//! Clock task: time acquisition, fallback clock and raw capture.
//!
//! Decides at the start of each wake whether to run a full receiver
//! acquisition or trust the internal clock, publishes `unix_time` while
//! awake, hands raw receiver output to storage block by block during a
//! survey, and powers the receiver down before reporting ready to sleep.

use embassy_time::{Duration, Instant};
use platform::{AcquisitionMode, InternalClock, TimeSource};

use super::ControlLoop;
use crate::config::SurveyMode;
use crate::context::{Position, ProcessContext, RawBlock, TaskId, RAW_BLOCK_CAPACITY};
use crate::fmt::{debug, info, warn};
use crate::retained::ClockMode;

/// Clock task state. Discriminants match the state codes in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClockState {
    /// Pick acquisition or fallback for this wake.
    Init = 0,
    /// Receiver has a fix; keep `unix_time` fresh.
    TrackFix = 1,
    /// Publish a timestamp for a pending reading.
    PublishTime = 2,
    /// Drain, power down, publish the sleep interval.
    FlushAndSleep = 3,
    /// Waiting for the receiver's first fix.
    Acquire = 4,
    /// Move to the internal clock.
    SwitchInternal = 5,
    /// Running on the internal clock.
    InternalTrack = 6,
    /// Move one raw block into the hand-off slot.
    CaptureRaw = 7,
}

impl ClockState {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::TrackFix => "track-fix",
            Self::PublishTime => "publish-time",
            Self::FlushAndSleep => "flush-and-sleep",
            Self::Acquire => "acquire",
            Self::SwitchInternal => "switch-internal",
            Self::InternalTrack => "internal-track",
            Self::CaptureRaw => "capture-raw",
        }
    }
}

/// Progress through [`ClockState::FlushAndSleep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushPhase {
    Drain,
    PowerOff,
    Done,
}

/// Clock task over a receiver `G` and an internal clock `C`.
pub struct ClockTask<G, C> {
    receiver: G,
    rtc: C,
    state: ClockState,
    resume: ClockState,
    survey: bool,
    receiver_started: bool,
    acquire_since: Option<Instant>,
    flush: FlushPhase,
    planned_sleep: Duration,
    peak_buffered: u16,
    overflow_warned: bool,
}

impl<G: TimeSource, C: InternalClock> ClockTask<G, C> {
    /// Task owning `receiver` and `rtc` for the process lifetime.
    pub fn new(receiver: G, rtc: C) -> Self {
        Self {
            receiver,
            rtc,
            state: ClockState::Init,
            resume: ClockState::Init,
            survey: false,
            receiver_started: false,
            acquire_since: None,
            flush: FlushPhase::Drain,
            planned_sleep: Duration::from_ticks(0),
            peak_buffered: 0,
            overflow_warned: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ClockState {
        self.state
    }

    /// Highest receiver buffer fill seen this wake, bytes.
    pub fn peak_buffered(&self) -> u16 {
        self.peak_buffered
    }

    /// The receiver.
    pub fn receiver(&self) -> &G {
        &self.receiver
    }

    /// The receiver, mutably.
    pub fn receiver_mut(&mut self) -> &mut G {
        &mut self.receiver
    }

    /// The internal clock.
    pub fn rtc(&self) -> &C {
        &self.rtc
    }

    /// Give the devices back.
    pub fn into_parts(self) -> (G, C) {
        (self.receiver, self.rtc)
    }

    fn transition(&mut self, next: ClockState) {
        if next != self.state {
            debug!(
                "clock: {} ({}) -> {} ({})",
                self.state.as_str(),
                self.state as u8,
                next.as_str(),
                next as u8
            );
            self.state = next;
        }
    }

    // ── Raw capture ─────────────────────────────────────────────────────────

    fn capturing(&self) -> bool {
        self.survey && self.receiver_started
    }

    fn block_bytes(ctx: &ProcessContext) -> usize {
        ctx.config.raw_block_bytes.clamp(1, RAW_BLOCK_CAPACITY)
    }

    /// Sample the receiver buffer, keep the peak, warn once per wake.
    fn observe_buffer(&mut self, ctx: &ProcessContext) -> usize {
        let buffered = self.receiver.buffered_byte_count();
        self.peak_buffered = self.peak_buffered.max(buffered);
        if !self.overflow_warned && u32::from(buffered) >= ctx.config.receiver_warn_bytes() {
            self.overflow_warned = true;
            warn!(
                "clock: receiver buffer at {} of {} bytes, raw data may be lost",
                buffered,
                ctx.config.receiver_buffer_bytes
            );
        }
        usize::from(buffered)
    }

    /// Move up to one block from the receiver into the empty slot.
    /// Returns the number of bytes handed off.
    fn hand_off_block(&mut self, ctx: &ProcessContext, available: usize) -> usize {
        if ctx.raw_ready.get() {
            return 0;
        }
        let want = available.min(Self::block_bytes(ctx));
        if want == 0 {
            return 0;
        }
        let mut block = RawBlock::new();
        if block.resize(want, 0).is_err() {
            return 0;
        }
        let got = self.receiver.extract(&mut block);
        block.truncate(got);
        if got == 0 {
            return 0;
        }
        ctx.raw_block.put(Some(block));
        ctx.raw_ready.set();
        debug!("clock: handed off {} raw bytes", got);
        got
    }

    // ── States ──────────────────────────────────────────────────────────────

    fn init(&mut self, ctx: &ProcessContext) -> ClockState {
        let retained = ctx.retained.get();
        let first_wake = retained.wake_count == 0;
        self.survey = match ctx.caps.survey {
            SurveyMode::Off => false,
            SurveyMode::Standalone => true,
            SurveyMode::Monthly => {
                first_wake
                    || self
                        .rtc
                        .epoch_seconds()
                        .saturating_sub(retained.last_survey_unix)
                        >= ctx.config.survey_period_s
            }
        };
        let periodic = first_wake
            || retained
                .wake_count
                .checked_rem(ctx.config.wake_cycles)
                .map_or(true, |r| r == 0);

        if self.survey {
            ctx.in_long_survey.set();
            info!("clock: wake {} starts a survey window", retained.wake_count);
            ClockState::Acquire
        } else if periodic {
            info!("clock: wake {} runs a full acquisition", retained.wake_count);
            ClockState::Acquire
        } else if retained.clock_mode == ClockMode::Internal && retained.last_fix_ok {
            info!("clock: trusting internal clock");
            ClockState::InternalTrack
        } else {
            ClockState::Acquire
        }
    }

    fn acquire(&mut self, ctx: &ProcessContext, now: Instant) -> ClockState {
        let since = *self.acquire_since.get_or_insert(now);
        if !self.receiver_started {
            let mode = if self.survey {
                AcquisitionMode::Survey
            } else {
                AcquisitionMode::Standard
            };
            if self.receiver.begin_acquisition(mode) {
                self.receiver_started = true;
                info!("clock: receiver started (survey={})", self.survey);
            } else {
                warn!("clock: receiver did not acknowledge, retrying");
            }
        }

        if self.receiver_started && self.receiver.has_fix() {
            let epoch = self.receiver.epoch_seconds();
            self.rtc.set_epoch_seconds(epoch);
            ctx.unix_time.put(epoch);
            let survey = self.survey;
            ctx.retained.update(|r| {
                r.last_fix_ok = true;
                r.clock_mode = ClockMode::External;
                r.last_known_unix = epoch;
                if survey {
                    r.last_survey_unix = epoch;
                }
            });
            ctx.fix_this_wake.set();
            ctx.device_ready.set();
            info!("clock: fix acquired, epoch {}", epoch);
            return ClockState::TrackFix;
        }

        if now.saturating_duration_since(since) >= ctx.config.fix_delay {
            warn!(
                "clock: no fix within {} s, falling back to internal clock",
                ctx.config.fix_delay.as_secs()
            );
            ctx.retained.update(|r| r.last_fix_ok = false);
            return ClockState::SwitchInternal;
        }
        ClockState::Acquire
    }

    fn track_fix(&mut self, ctx: &ProcessContext) -> ClockState {
        if ctx.sleep_request.get() {
            return self.enter_flush(ctx);
        }
        if ctx.caps.legacy_clock {
            // Older receivers only discipline the internal clock.
            return ClockState::SwitchInternal;
        }
        if ctx.data_ready.get() || !self.receiver.has_fix() {
            return ClockState::PublishTime;
        }
        ctx.unix_time.put(self.receiver.epoch_seconds());
        ClockState::TrackFix
    }

    fn publish_time(&mut self, ctx: &ProcessContext) -> ClockState {
        if ctx.retained.read(|r| r.clock_mode) == ClockMode::Internal {
            ctx.unix_time.put(self.rtc.epoch_seconds());
            return ClockState::InternalTrack;
        }
        if self.receiver.has_fix() {
            let epoch = self.receiver.epoch_seconds();
            ctx.unix_time.put(epoch);
            ctx.retained.update(|r| r.last_known_unix = epoch);
            ClockState::TrackFix
        } else {
            warn!("clock: fix lost");
            ctx.unix_time.put(0);
            ClockState::SwitchInternal
        }
    }

    fn switch_internal(&mut self, ctx: &ProcessContext) -> ClockState {
        let last_known = ctx.retained.update(|r| {
            r.clock_mode = ClockMode::Internal;
            r.last_known_unix
        });
        if self.rtc.epoch_seconds() < last_known {
            info!("clock: internal clock behind, seeding with {}", last_known);
            self.rtc.set_epoch_seconds(last_known);
        }
        let epoch = self.rtc.epoch_seconds();
        ctx.unix_time.put(epoch);
        ctx.device_ready.set();
        info!("clock: on internal clock, epoch {}", epoch);
        ClockState::InternalTrack
    }

    fn internal_track(&mut self, ctx: &ProcessContext) -> ClockState {
        let epoch = self.rtc.epoch_seconds();
        ctx.unix_time.put(epoch);
        ctx.retained
            .update(|r| r.last_known_unix = r.last_known_unix.max(epoch));
        ctx.device_ready.set();
        if ctx.sleep_request.get() {
            return self.enter_flush(ctx);
        }
        ClockState::InternalTrack
    }

    fn capture_raw(&mut self, ctx: &ProcessContext) -> ClockState {
        let available = self.observe_buffer(ctx);
        if available >= Self::block_bytes(ctx) {
            self.hand_off_block(ctx, available);
        }
        self.resume
    }

    fn enter_flush(&mut self, ctx: &ProcessContext) -> ClockState {
        self.flush = FlushPhase::Drain;
        let secs = if ctx.caps.survey == SurveyMode::Standalone {
            ctx.config.standalone_sleep_s
        } else {
            ctx.read_interval_s.get()
        };
        self.planned_sleep = Duration::from_secs(u64::from(secs));

        if ctx.fix_this_wake.get() && self.receiver_started && self.receiver.has_fix() {
            let position = Position {
                latitude: self.receiver.latitude(),
                longitude: self.receiver.longitude(),
                altitude_mm: self.receiver.altitude(),
                valid: true,
            };
            ctx.position.put(position);
            debug!(
                "clock: position {} {} {}",
                position.latitude,
                position.longitude,
                position.altitude_mm
            );
        }
        ClockState::FlushAndSleep
    }

    fn flush_and_sleep(&mut self, ctx: &ProcessContext) -> ClockState {
        match self.flush {
            FlushPhase::Drain => {
                if self.capturing() {
                    let available = self.observe_buffer(ctx);
                    if available > 0 || ctx.raw_ready.get() {
                        // Final partial block included.
                        self.hand_off_block(ctx, available);
                        return ClockState::FlushAndSleep;
                    }
                }
                self.flush = FlushPhase::PowerOff;
            }
            FlushPhase::PowerOff => {
                if ctx.caps.continuous || !self.receiver_started {
                    self.flush = FlushPhase::Done;
                } else {
                    let hint = Duration::from_millis(
                        self.planned_sleep.as_millis().saturating_mul(9) / 10,
                    );
                    if self.receiver.power_off(hint) {
                        info!("clock: receiver powered off");
                        self.flush = FlushPhase::Done;
                    }
                }
            }
            FlushPhase::Done => {
                if !ctx.ready.get(TaskId::Clock) {
                    ctx.sleep_interval.put(self.planned_sleep);
                    ctx.ready.set(TaskId::Clock);
                    info!(
                        "clock: ready to sleep, interval {} s, peak buffer {} bytes",
                        self.planned_sleep.as_secs(),
                        self.peak_buffered
                    );
                }
            }
        }
        ClockState::FlushAndSleep
    }
}

impl<G: TimeSource, C: InternalClock> ControlLoop for ClockTask<G, C> {
    const ID: TaskId = TaskId::Clock;

    fn period(&self, ctx: &ProcessContext) -> Duration {
        ctx.config.periods.clock
    }

    async fn step(&mut self, ctx: &ProcessContext, now: Instant) {
        // Raw data first so the receiver buffer never backs up behind other work.
        let drains = matches!(
            self.state,
            ClockState::Acquire
                | ClockState::TrackFix
                | ClockState::PublishTime
                | ClockState::InternalTrack
        );
        if drains && self.capturing() && !ctx.raw_ready.get() {
            let available = self.observe_buffer(ctx);
            if available >= Self::block_bytes(ctx) {
                self.resume = self.state;
                self.transition(ClockState::CaptureRaw);
            }
        }

        let next = match self.state {
            ClockState::Init => self.init(ctx),
            ClockState::Acquire => self.acquire(ctx, now),
            ClockState::TrackFix => self.track_fix(ctx),
            ClockState::PublishTime => self.publish_time(ctx),
            ClockState::SwitchInternal => self.switch_internal(ctx),
            ClockState::InternalTrack => self.internal_track(ctx),
            ClockState::CaptureRaw => self.capture_raw(ctx),
            ClockState::FlushAndSleep => self.flush_and_sleep(ctx),
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
    use platform::mocks::{MockInternalClock, MockTimeSource};

    const EPOCH: u32 = 1_700_000_000;

    fn ctx_with(caps: Capabilities, retained: RetainedState) -> ProcessContext {
        ProcessContext::new(LoggerConfig::default(), caps, retained)
    }

    fn warm(wake_count: u32, mode: ClockMode, fix_ok: bool) -> RetainedState {
        RetainedState {
            wake_count,
            last_known_unix: EPOCH,
            clock_mode: mode,
            last_fix_ok: fix_ok,
            last_survey_unix: EPOCH,
        }
    }

    async fn run(
        task: &mut ClockTask<MockTimeSource, MockInternalClock>,
        ctx: &ProcessContext,
        from_ms: u64,
        passes: u64,
    ) -> u64 {
        let mut t = from_ms;
        for _ in 0..passes {
            task.step(ctx, Instant::from_millis(t)).await;
            t += 100;
        }
        t
    }

    #[tokio::test]
    async fn cold_boot_acquires_and_sets_rtc() {
        let ctx = ctx_with(Capabilities::default(), RetainedState::default());
        let mut task = ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(0));
        run(&mut task, &ctx, 0, 2).await;
        assert_eq!(task.state(), ClockState::TrackFix);
        assert!(ctx.device_ready.get());
        assert!(ctx.fix_this_wake.get());
        assert_eq!(ctx.unix_time.get(), EPOCH);
        assert_eq!(task.rtc().epoch, EPOCH);
        let r = ctx.retained.get();
        assert!(r.last_fix_ok);
        assert_eq!(r.clock_mode, ClockMode::External);
        assert_eq!(task.receiver().last_mode, Some(AcquisitionMode::Standard));
    }

    #[tokio::test]
    async fn no_fix_falls_back_after_fix_delay() {
        let ctx = ctx_with(Capabilities::default(), RetainedState::default());
        let mut task =
            ClockTask::new(MockTimeSource::without_fix(), MockInternalClock::at(EPOCH + 5));
        task.step(&ctx, Instant::from_millis(0)).await; // init
        task.step(&ctx, Instant::from_millis(100)).await; // acquire starts the timer
        task.step(&ctx, Instant::from_millis(119_000)).await;
        assert_eq!(task.state(), ClockState::Acquire);
        assert!(!ctx.device_ready.get());
        task.step(&ctx, Instant::from_millis(120_100)).await;
        assert_eq!(task.state(), ClockState::SwitchInternal);
        task.step(&ctx, Instant::from_millis(120_200)).await;
        assert_eq!(task.state(), ClockState::InternalTrack);
        assert!(ctx.device_ready.get());
        assert_eq!(ctx.unix_time.get(), EPOCH + 5);
        let r = ctx.retained.get();
        assert_eq!(r.clock_mode, ClockMode::Internal);
        assert!(!r.last_fix_ok);
    }

    #[tokio::test]
    async fn internal_clock_is_seeded_from_last_known_time() {
        let retained = warm(3, ClockMode::External, true);
        let ctx = ctx_with(Capabilities::default(), retained);
        let mut task = ClockTask::new(MockTimeSource::without_fix(), MockInternalClock::at(0));
        task.step(&ctx, Instant::from_millis(0)).await;
        task.step(&ctx, Instant::from_millis(100)).await;
        task.step(&ctx, Instant::from_millis(200_000)).await;
        task.step(&ctx, Instant::from_millis(200_100)).await;
        assert_eq!(task.rtc().epoch, EPOCH);
        assert_eq!(ctx.unix_time.get(), EPOCH);
    }

    #[tokio::test]
    async fn trusted_internal_clock_skips_receiver() {
        let ctx = ctx_with(Capabilities::default(), warm(7, ClockMode::Internal, true));
        let mut task =
            ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(EPOCH + 420));
        run(&mut task, &ctx, 0, 2).await;
        assert_eq!(task.state(), ClockState::InternalTrack);
        assert_eq!(task.receiver().begin_calls, 0);
        assert_eq!(ctx.unix_time.get(), EPOCH + 420);
    }

    #[tokio::test]
    async fn periodic_wake_reacquires_even_when_internal_is_trusted() {
        let ctx = ctx_with(Capabilities::default(), warm(15, ClockMode::Internal, true));
        let mut task =
            ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(EPOCH));
        run(&mut task, &ctx, 0, 2).await;
        assert_eq!(task.receiver().begin_calls, 1);
        assert_eq!(task.state(), ClockState::TrackFix);
    }

    #[tokio::test]
    async fn legacy_clock_switches_to_internal_after_first_fix() {
        let caps = Capabilities {
            legacy_clock: true,
            ..Capabilities::default()
        };
        let ctx = ctx_with(caps, RetainedState::default());
        let mut task = ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(0));
        run(&mut task, &ctx, 0, 4).await;
        assert_eq!(task.state(), ClockState::InternalTrack);
        let r = ctx.retained.get();
        assert_eq!(r.clock_mode, ClockMode::Internal);
        assert!(r.last_fix_ok);
    }

    #[tokio::test]
    async fn lost_fix_publishes_zero_then_switches() {
        let ctx = ctx_with(Capabilities::default(), RetainedState::default());
        let mut task = ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(0));
        run(&mut task, &ctx, 0, 2).await;
        task.receiver_mut().lose_fix();
        task.step(&ctx, Instant::from_millis(300)).await;
        assert_eq!(task.state(), ClockState::PublishTime);
        task.step(&ctx, Instant::from_millis(400)).await;
        assert_eq!(task.state(), ClockState::SwitchInternal);
        assert_eq!(ctx.unix_time.get(), 0);
        task.step(&ctx, Instant::from_millis(500)).await;
        assert_eq!(ctx.unix_time.get(), EPOCH);
    }

    #[tokio::test]
    async fn survey_hands_off_full_blocks_and_flushes_remainder() {
        let caps = Capabilities {
            survey: crate::config::SurveyMode::Standalone,
            ..Capabilities::default()
        };
        let ctx = ctx_with(caps, RetainedState::default());
        let mut receiver = MockTimeSource::with_fix(EPOCH);
        receiver.push_raw(&[0xB5; 8192 + 1000]);
        let mut task = ClockTask::new(receiver, MockInternalClock::at(0));
        run(&mut task, &ctx, 0, 2).await;
        assert!(ctx.in_long_survey.get());
        assert_eq!(task.receiver().last_mode, Some(AcquisitionMode::Survey));

        // Next pass drains a full block first.
        task.step(&ctx, Instant::from_millis(200)).await;
        assert!(ctx.raw_ready.get());
        let block = ctx.raw_block.take().unwrap();
        assert_eq!(block.len(), 8192);
        ctx.raw_ready.clear();

        // The remainder is below a block; it waits for the flush.
        task.step(&ctx, Instant::from_millis(300)).await;
        assert!(!ctx.raw_ready.get());

        ctx.sleep_request.set();
        task.step(&ctx, Instant::from_millis(400)).await;
        assert_eq!(task.state(), ClockState::FlushAndSleep);
        task.step(&ctx, Instant::from_millis(500)).await;
        assert_eq!(ctx.raw_block.take().unwrap().len(), 1000);
        ctx.raw_ready.clear();
        assert!(!ctx.ready.get(TaskId::Clock));

        for t in 0..4 {
            task.step(&ctx, Instant::from_millis(600 + t * 100)).await;
        }
        assert!(task.receiver().powered_off);
        assert!(ctx.ready.get(TaskId::Clock));
        assert_eq!(ctx.sleep_interval.get(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn flush_waits_for_slot_before_ready() {
        let caps = Capabilities {
            survey: crate::config::SurveyMode::Standalone,
            ..Capabilities::default()
        };
        let ctx = ctx_with(caps, RetainedState::default());
        let mut receiver = MockTimeSource::with_fix(EPOCH);
        receiver.push_raw(&[1; 10]);
        let mut task = ClockTask::new(receiver, MockInternalClock::at(0));
        run(&mut task, &ctx, 0, 2).await;
        ctx.sleep_request.set();
        let t = run(&mut task, &ctx, 200, 10).await;
        // Nobody consumed the slot: the clock never reports ready.
        assert!(ctx.raw_ready.get());
        assert!(!ctx.ready.get(TaskId::Clock));
        ctx.raw_block.take();
        ctx.raw_ready.clear();
        run(&mut task, &ctx, t, 4).await;
        assert!(ctx.ready.get(TaskId::Clock));
    }

    #[tokio::test]
    async fn buffer_warning_fires_once_and_tracks_peak() {
        let caps = Capabilities {
            survey: crate::config::SurveyMode::Standalone,
            ..Capabilities::default()
        };
        let ctx = ctx_with(caps, RetainedState::default());
        let mut receiver = MockTimeSource::with_fix(EPOCH);
        receiver.push_raw(&vec![0u8; 30_000]);
        let mut task = ClockTask::new(receiver, MockInternalClock::at(0));
        run(&mut task, &ctx, 0, 3).await;
        assert_eq!(task.peak_buffered(), 30_000);
        assert!(task.overflow_warned);
    }

    fn distinct_sleeps() -> LoggerConfig {
        LoggerConfig {
            read_interval_s: 90,
            standalone_sleep_s: 45,
            survey_read_s: 7200,
            ..LoggerConfig::default()
        }
    }

    async fn survey_to_sleep(ctx: &ProcessContext) -> ClockTask<MockTimeSource, MockInternalClock> {
        let mut task =
            ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(EPOCH));
        run(&mut task, ctx, 0, 2).await;
        assert!(ctx.in_long_survey.get());
        ctx.sleep_request.set();
        run(&mut task, ctx, 200, 6).await;
        assert!(ctx.ready.get(TaskId::Clock));
        task
    }

    #[tokio::test]
    async fn monthly_survey_sleeps_for_read_interval() {
        let caps = Capabilities {
            survey: crate::config::SurveyMode::Monthly,
            ..Capabilities::default()
        };
        // A month since the last survey.
        let mut retained = warm(3, ClockMode::External, true);
        retained.last_survey_unix = EPOCH - 2_592_000;
        let ctx = ProcessContext::new(distinct_sleeps(), caps, retained);
        let task = survey_to_sleep(&ctx).await;
        assert_eq!(ctx.sleep_interval.get(), Duration::from_secs(90));
        assert_eq!(
            task.receiver().power_off_hint,
            Some(Duration::from_millis(81_000))
        );
    }

    #[tokio::test]
    async fn monthly_survey_not_due_runs_normal_wake() {
        let caps = Capabilities {
            survey: crate::config::SurveyMode::Monthly,
            ..Capabilities::default()
        };
        let ctx = ProcessContext::new(distinct_sleeps(), caps, warm(3, ClockMode::External, true));
        let mut task =
            ClockTask::new(MockTimeSource::with_fix(EPOCH), MockInternalClock::at(EPOCH + 60));
        run(&mut task, &ctx, 0, 2).await;
        assert!(!ctx.in_long_survey.get());
        assert_eq!(task.receiver().last_mode, Some(AcquisitionMode::Standard));
    }

    #[tokio::test]
    async fn standalone_survey_sleeps_for_standalone_interval() {
        let caps = Capabilities {
            survey: crate::config::SurveyMode::Standalone,
            ..Capabilities::default()
        };
        let ctx = ProcessContext::new(distinct_sleeps(), caps, RetainedState::default());
        survey_to_sleep(&ctx).await;
        assert_eq!(ctx.sleep_interval.get(), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn position_published_on_sleep_request_with_fix() {
        let ctx = ctx_with(Capabilities::default(), RetainedState::default());
        let mut receiver = MockTimeSource::with_fix(EPOCH);
        receiver.latitude = 473_977_418;
        receiver.longitude = -1_223_456_789;
        receiver.altitude = 12_345;
        let mut task = ClockTask::new(receiver, MockInternalClock::at(0));
        run(&mut task, &ctx, 0, 2).await;
        ctx.sleep_request.set();
        run(&mut task, &ctx, 200, 4).await;
        let p = ctx.position.get();
        assert!(p.valid);
        assert_eq!(p.latitude, 473_977_418);
        assert_eq!(p.altitude_mm, 12_345);
        assert!(ctx.ready.get(TaskId::Clock));
        assert_eq!(
            task.receiver().power_off_hint,
            Some(Duration::from_millis(54_000))
        );
    }
}
