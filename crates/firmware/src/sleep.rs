//! Wake-window timer and sleep rendezvous.
//!
//! The controller opens the awake window once the device is ready, raises
//! the sleep request when the window closes, then waits until every
//! enabled task reports ready before handing a sleep duration to the
//! runtime.

use embassy_time::{Duration, Instant};

use crate::context::ProcessContext;
use crate::fmt::{debug, info};

/// Sleep controller state. Discriminants match the state codes in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SleepState {
    /// Waiting for device-ready.
    AwaitWake = 0,
    /// Awake window open.
    Running = 1,
    /// Sleep requested; waiting for every task to report ready.
    Rendezvous = 2,
    /// Sleep duration handed to the runtime.
    Sleeping = 3,
}

impl SleepState {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitWake => "await-wake",
            Self::Running => "running",
            Self::Rendezvous => "rendezvous",
            Self::Sleeping => "sleeping",
        }
    }
}

/// Seconds until the next multiple of `align_minutes` minutes after
/// `unix`. A time exactly on a boundary, or no trusted time at all, gives
/// a full boundary. Zero `align_minutes` disables the ceiling.
pub fn alignment_ceiling(unix: u32, align_minutes: u32) -> Duration {
    let boundary = align_minutes.saturating_mul(60);
    if boundary == 0 {
        return Duration::MAX;
    }
    let into = unix.checked_rem(boundary).unwrap_or(0);
    let remaining = if unix == 0 || into == 0 {
        boundary
    } else {
        boundary.saturating_sub(into)
    };
    Duration::from_secs(u64::from(remaining))
}

/// Sleep length for the current context: the interval the clock task
/// computed, capped so the next wake lands on the alignment boundary.
/// Continuous mode sleeps a token microsecond.
pub fn sleep_duration(ctx: &ProcessContext) -> Duration {
    if ctx.caps.continuous {
        return Duration::from_micros(1);
    }
    let mut computed = ctx.sleep_interval.get();
    if computed.as_ticks() == 0 {
        computed = Duration::from_secs(u64::from(ctx.read_interval_s.get()));
    }
    let ceiling = alignment_ceiling(ctx.unix_time.get(), ctx.align_minutes.get());
    computed.min(ceiling)
}

/// Outcome of one controller pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepAction {
    /// Keep running.
    Continue,
    /// Save retained state and enter deep sleep for this long.
    EnterDeepSleep(Duration),
}

/// Wake-window timer and rendezvous.
#[derive(Debug)]
pub struct SleepController {
    state: SleepState,
    window_start: Option<Instant>,
    duration: Option<Duration>,
}

impl Default for SleepController {
    fn default() -> Self {
        Self::new()
    }
}

impl SleepController {
    /// Controller waiting for device-ready.
    pub fn new() -> Self {
        Self {
            state: SleepState::AwaitWake,
            window_start: None,
            duration: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SleepState {
        self.state
    }

    fn awake_window(ctx: &ProcessContext) -> Duration {
        let secs = if ctx.in_long_survey.get() {
            ctx.config.survey_read_s
        } else {
            ctx.read_interval_s.get()
        };
        Duration::from_secs(u64::from(secs))
    }

    fn transition(&mut self, next: SleepState) {
        if next != self.state {
            debug!(
                "sleep: {} ({}) -> {} ({})",
                self.state.as_str(),
                self.state as u8,
                next.as_str(),
                next as u8
            );
            self.state = next;
        }
    }

    /// One pass at time `now`.
    pub fn step(&mut self, ctx: &ProcessContext, now: Instant) -> SleepAction {
        match self.state {
            SleepState::AwaitWake => {
                if ctx.device_ready.get() {
                    let wake = ctx.retained.update(|r| {
                        r.wake_count = r.wake_count.saturating_add(1);
                        r.wake_count
                    });
                    ctx.sleep_request.clear();
                    self.window_start = Some(now);
                    info!(
                        "sleep: wake {} window open for {} s",
                        wake,
                        Self::awake_window(ctx).as_secs()
                    );
                    self.transition(SleepState::Running);
                }
                SleepAction::Continue
            }
            SleepState::Running => {
                let start = self.window_start.unwrap_or(now);
                if now.saturating_duration_since(start) >= Self::awake_window(ctx) {
                    ctx.sleep_request.set();
                    info!("sleep: window closed, sleep requested");
                    self.transition(SleepState::Rendezvous);
                }
                SleepAction::Continue
            }
            SleepState::Rendezvous => {
                if ctx.ready.all_active_set() {
                    let duration = sleep_duration(ctx);
                    self.duration = Some(duration);
                    info!("sleep: all tasks ready, sleeping {} ms", duration.as_millis());
                    self.transition(SleepState::Sleeping);
                    SleepAction::EnterDeepSleep(duration)
                } else {
                    if let Some(waiting) = ctx.ready.first_clear() {
                        debug!("sleep: waiting for {}", waiting.as_str());
                    }
                    SleepAction::Continue
                }
            }
            SleepState::Sleeping => match self.duration {
                Some(duration) => SleepAction::EnterDeepSleep(duration),
                None => SleepAction::Continue,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use crate::config::{Capabilities, LoggerConfig};
    use crate::context::TaskId;
    use crate::retained::RetainedState;

    fn ctx(caps: Capabilities) -> ProcessContext {
        ProcessContext::new(LoggerConfig::default(), caps, RetainedState::default())
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn ceiling_is_time_to_next_boundary() {
        // 59:30 past the hour with hourly alignment: 30 s to go.
        assert_eq!(alignment_ceiling(1_700_002_770, 60), Duration::from_secs(30));
        // Exactly on the hour: a full hour.
        assert_eq!(alignment_ceiling(1_699_999_200, 60), Duration::from_secs(3600));
        // No trusted time: a full boundary.
        assert_eq!(alignment_ceiling(0, 10), Duration::from_secs(600));
        assert_eq!(alignment_ceiling(1234, 0), Duration::MAX);
    }

    #[test]
    fn duration_is_min_of_interval_and_ceiling() {
        let ctx = ctx(Capabilities::default());
        ctx.unix_time.put(1_699_999_200 + 3590);
        ctx.sleep_interval.put(Duration::from_secs(60));
        assert_eq!(sleep_duration(&ctx), Duration::from_secs(10));
        ctx.unix_time.put(1_699_999_200 + 60);
        assert_eq!(sleep_duration(&ctx), Duration::from_secs(60));
    }

    #[test]
    fn continuous_mode_sleeps_a_microsecond() {
        let caps = Capabilities {
            continuous: true,
            ..Capabilities::default()
        };
        let ctx = ctx(caps);
        ctx.sleep_interval.put(Duration::from_secs(60));
        assert_eq!(sleep_duration(&ctx), Duration::from_micros(1));
    }

    #[test]
    fn window_then_rendezvous_then_sleep() {
        let ctx = ctx(Capabilities::default());
        ctx.unix_time.put(1_699_999_200 + 60);
        ctx.sleep_interval.put(Duration::from_secs(60));
        let mut ctl = SleepController::new();
        assert_eq!(ctl.step(&ctx, at(0)), SleepAction::Continue);
        assert_eq!(ctl.state(), SleepState::AwaitWake);

        ctx.device_ready.set();
        ctl.step(&ctx, at(100));
        assert_eq!(ctl.state(), SleepState::Running);
        assert_eq!(ctx.retained.get().wake_count, 1);

        ctl.step(&ctx, at(59_000));
        assert!(!ctx.sleep_request.get());
        ctl.step(&ctx, at(60_100));
        assert!(ctx.sleep_request.get());
        assert_eq!(ctl.state(), SleepState::Rendezvous);

        for id in [TaskId::Clock, TaskId::Storage, TaskId::Measurement] {
            ctx.ready.set(id);
            assert_eq!(ctl.step(&ctx, at(60_200)), SleepAction::Continue);
        }
        ctx.ready.set(TaskId::Transfer);
        assert_eq!(
            ctl.step(&ctx, at(60_300)),
            SleepAction::EnterDeepSleep(Duration::from_secs(60))
        );
        assert_eq!(ctl.state(), SleepState::Sleeping);
    }

    #[test]
    fn survey_window_uses_survey_read_time() {
        let ctx = ctx(Capabilities::default());
        ctx.in_long_survey.set();
        ctx.device_ready.set();
        let mut ctl = SleepController::new();
        ctl.step(&ctx, at(0));
        ctl.step(&ctx, at(60_000));
        assert!(!ctx.sleep_request.get());
        ctl.step(&ctx, at(7_200_000));
        assert!(ctx.sleep_request.get());
    }
}
