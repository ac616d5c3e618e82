//! Software liveness watchdog.
//!
//! Every enabled task sets its alive flag once per control-loop pass. The
//! watchdog clears the whole set whenever it sees it complete; if the set
//! stays incomplete past the deadline, the device is reset.

use embassy_time::{Duration, Instant};

use crate::context::{ProcessContext, TaskId};
use crate::fmt::{error, info};

/// Watchdog state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    /// Waiting for device-ready; tasks may still be starting.
    ArmIdle,
    /// Checking liveness; `since` is the last time every task checked in.
    Monitoring {
        /// Last complete check-in.
        since: Instant,
    },
    /// Deadline missed; reset requested.
    Tripped,
}

impl WatchdogState {
    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ArmIdle => "arm-idle",
            Self::Monitoring { .. } => "monitoring",
            Self::Tripped => "tripped",
        }
    }
}

/// Outcome of one watchdog pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogVerdict {
    /// Not armed yet.
    Idle,
    /// Every enabled task checked in; the deadline restarts.
    Healthy,
    /// Some task has not checked in, but the deadline has not passed.
    Pending,
    /// Deadline passed. `stalled` is the first task that never checked in.
    Trip {
        /// First missing task.
        stalled: Option<TaskId>,
    },
}

/// Liveness monitor for one wake cycle.
#[derive(Debug)]
pub struct Watchdog {
    state: WatchdogState,
    deadline: Duration,
}

impl Watchdog {
    /// Watchdog that trips after `deadline` without a full check-in.
    pub fn new(deadline: Duration) -> Self {
        Self {
            state: WatchdogState::ArmIdle,
            deadline,
        }
    }

    /// Current state.
    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// One pass at time `now`.
    pub fn step(&mut self, ctx: &ProcessContext, now: Instant) -> WatchdogVerdict {
        match self.state {
            WatchdogState::ArmIdle => {
                if ctx.device_ready.get() {
                    // Stale check-ins from before arming do not count.
                    ctx.alive.clear_active();
                    self.state = WatchdogState::Monitoring { since: now };
                    info!("watchdog: armed, deadline {} ms", self.deadline.as_millis());
                }
                WatchdogVerdict::Idle
            }
            WatchdogState::Monitoring { since } => {
                if ctx.alive.all_active_set() {
                    ctx.alive.clear_active();
                    self.state = WatchdogState::Monitoring { since: now };
                    WatchdogVerdict::Healthy
                } else if now.saturating_duration_since(since) > self.deadline {
                    let stalled = ctx.alive.first_clear();
                    for (id, alive) in ctx.alive.snapshot() {
                        error!("watchdog: {} alive={}", id.as_str(), alive);
                    }
                    error!(
                        "watchdog: no full check-in for {} ms, resetting",
                        now.saturating_duration_since(since).as_millis()
                    );
                    self.state = WatchdogState::Tripped;
                    WatchdogVerdict::Trip { stalled }
                } else {
                    WatchdogVerdict::Pending
                }
            }
            WatchdogState::Tripped => WatchdogVerdict::Trip {
                stalled: ctx.alive.first_clear(),
            },
        }
    }
}
