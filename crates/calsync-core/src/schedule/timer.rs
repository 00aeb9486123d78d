//! Per-profile schedule timer.
//!
//! Two states: Armed (underlying clock running, next due time published) and
//! Disarmed (clock stopped, no due time). The interval is read fresh from
//! the owning profile on every recompute, so profile edits between runs take
//! effect at the next reschedule.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::engine::{SyncEngine, TriggerSource};
use crate::error::SyncRequestError;
use crate::profile::SharedProfile;
use crate::providers::Clock;
use crate::schedule::{PeriodicClock, PushWatcher, ScheduleStatus};

/// Floor applied when the computed schedule is already (nearly) in the past,
/// preventing a zero/negative-delay tight loop.
const MIN_DELAY: StdDuration = StdDuration::from_secs(60);

/// Delay applied when a scheduled tick finds the engine busy.
const BUSY_RETRY_MINS: i64 = 5;

pub struct ScheduleTimer {
    profile: SharedProfile,
    clock: Arc<dyn Clock>,
    timer: Arc<dyn PeriodicClock>,
    push: Arc<PushWatcher>,
    next_due_at: Option<DateTime<Utc>>,
    /// Emulated fire point of the repeating clock; advances by one period
    /// per fire, independent of the published due time.
    fire_at: Option<DateTime<Utc>>,
}

impl ScheduleTimer {
    /// Build the timer and arm or disarm it from the profile's current
    /// interval and last-sync timestamp.
    pub fn new(
        profile: SharedProfile,
        clock: Arc<dyn Clock>,
        timer: Arc<dyn PeriodicClock>,
        push: Arc<PushWatcher>,
    ) -> Self {
        let mut t = Self {
            profile,
            clock,
            timer,
            push,
            next_due_at: None,
            fire_at: None,
        };
        t.set_next_sync(None, false);
        t
    }

    pub fn profile(&self) -> &SharedProfile {
        &self.profile
    }

    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.next_due_at
    }

    pub fn armed(&self) -> bool {
        self.next_due_at.is_some()
    }

    /// Recompute and publish the next due time.
    ///
    /// `delay_mins` defaults to the profile's configured interval, read
    /// fresh. With `from_now` the delay counts from the current time,
    /// otherwise from the profile's last sync. A result under one minute
    /// away is clamped to exactly one minute. The underlying clock is only
    /// re-armed when the desired period differs from the armed one.
    pub fn set_next_sync(&mut self, delay_mins: Option<i64>, from_now: bool) -> ScheduleStatus {
        let (name, interval, last_sync) = {
            let p = self.profile.read().unwrap();
            (p.name.clone(), p.interval_minutes(), p.last_sync)
        };
        if interval == 0 {
            self.timer.disarm();
            self.next_due_at = None;
            self.fire_at = None;
            info!(profile = %name, "schedule disabled");
            return self.status();
        }

        let delay = delay_mins.unwrap_or(interval);
        let now = self.clock.now();
        let base = if from_now {
            now
        } else {
            last_sync.unwrap_or(DateTime::<Utc>::MIN_UTC)
        };
        let candidate = base + Duration::minutes(delay);

        let (candidate, period) = if candidate - now < Duration::minutes(1) {
            (now + Duration::minutes(1), MIN_DELAY)
        } else {
            let period = (candidate - now).to_std().unwrap_or(MIN_DELAY);
            (candidate, period)
        };

        if self.timer.armed_period() != Some(period) {
            self.timer.disarm();
            self.timer.arm(period);
        }
        self.next_due_at = Some(candidate);
        self.fire_at = Some(candidate);
        info!(profile = %name, next = %candidate, "next sync scheduled");
        ScheduleStatus::Scheduled(candidate)
    }

    /// Current schedule status. The due date when armed; otherwise whether
    /// push change-detection covers this profile specifically.
    pub fn status(&self) -> ScheduleStatus {
        if let Some(due) = self.next_due_at {
            return ScheduleStatus::Scheduled(due);
        }
        let (name, push_enabled) = {
            let p = self.profile.read().unwrap();
            (p.name.clone(), p.push_enabled)
        };
        if push_enabled && self.push.is_watching(&name) {
            ScheduleStatus::PushSyncActive
        } else {
            ScheduleStatus::Inactive
        }
    }

    /// Driver entry point: fires the tick handler when the armed period has
    /// elapsed.
    pub fn poll(&mut self, engine: &SyncEngine) {
        let now = self.clock.now();
        match self.fire_at {
            Some(at) if now >= at => {}
            _ => return,
        }
        if let Some(period) = self.timer.armed_period() {
            let period = Duration::from_std(period).unwrap_or(Duration::minutes(1));
            self.fire_at = Some(now + period);
        }
        self.on_tick(engine);
    }

    /// The scheduled tick. Swallowed while the error surface is up; starts
    /// a scheduled sync when the engine is idle; otherwise reschedules five
    /// minutes out instead of queueing, so a long sync never builds a
    /// backlog of missed ticks.
    pub fn on_tick(&mut self, engine: &SyncEngine) {
        if engine.error_surface_presented() {
            return;
        }
        debug!("scheduled sync triggered");

        if engine.syncing_now() {
            debug!("busy syncing already; rescheduled for 5 mins time");
            self.set_next_sync(Some(BUSY_RETRY_MINS), true);
            return;
        }

        let (name, direction) = {
            let p = self.profile.read().unwrap();
            (p.name.clone(), p.direction)
        };
        info!(profile = %name, "autosyncing calendars: {}", direction.name());
        match engine.request_sync(&self.profile, TriggerSource::Scheduled) {
            Ok(()) => {}
            Err(SyncRequestError::AlreadyRunning) => {
                // Lost the race to another trigger; same policy as busy.
                self.set_next_sync(Some(BUSY_RETRY_MINS), true);
            }
            Err(e) => warn!(profile = %name, "scheduled sync request rejected: {e}"),
        }
    }
}
