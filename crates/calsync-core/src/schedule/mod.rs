//! Per-profile schedule timers and the shared push watcher.
//!
//! Both are driven by the caller: a driver loop (the daemon, or a test)
//! calls `poll(now, engine)` periodically and the timers decide whether
//! their tick handler fires. The underlying clock is the [`PeriodicClock`]
//! capability, injected so schedules stay independent of any UI toolkit
//! and deterministic under test.

pub mod push;
pub mod timer;

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

pub use push::{PushSwitch, PushWatcher, PUSH_PERIOD};
pub use timer::ScheduleTimer;

/// A repeating timer that can be armed with a period, disarmed, and asked
/// what period it is currently armed with.
pub trait PeriodicClock: Send + Sync {
    fn arm(&self, period: Duration);
    fn disarm(&self);
    fn armed_period(&self) -> Option<Duration>;
}

/// Default [`PeriodicClock`]: records the armed period, nothing more. The
/// driver loop derives fire points from the owning timer's state.
#[derive(Debug, Default)]
pub struct ArmedPeriod {
    period: Mutex<Option<Duration>>,
}

impl ArmedPeriod {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeriodicClock for ArmedPeriod {
    fn arm(&self, period: Duration) {
        *self.period.lock().unwrap() = Some(period);
    }

    fn disarm(&self) {
        *self.period.lock().unwrap() = None;
    }

    fn armed_period(&self) -> Option<Duration> {
        *self.period.lock().unwrap()
    }
}

/// Schedule state of a profile, carrying the due date when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStatus {
    /// No scheduled sync and no push registration.
    Inactive,
    /// No scheduled sync, but push change-detection is running.
    PushSyncActive,
    /// A sync is currently executing for this profile.
    InProgress,
    /// Next scheduled sync due at the given time.
    Scheduled(DateTime<Utc>),
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Inactive => write!(f, "Inactive"),
            ScheduleStatus::PushSyncActive => write!(f, "Push Sync Active"),
            ScheduleStatus::InProgress => write!(f, "In progress..."),
            ScheduleStatus::Scheduled(when) => {
                write!(f, "{}", when.format("%Y-%m-%d %H:%M:%S UTC"))
            }
        }
    }
}
