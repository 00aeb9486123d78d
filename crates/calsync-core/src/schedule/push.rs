//! Push-style change detection over the local calendar.
//!
//! One watcher serves every profile that has push sync enabled. It polls
//! the local provider on a fixed two-minute period, compares what it sees
//! against the snapshot taken at registration (or after the last push
//! sync), and asks the engine for a sync when items changed. There is no
//! real push channel; "push" means reacting to local edits promptly
//! instead of waiting out the schedule interval.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::engine::{SyncEngine, TriggerSource};
use crate::error::SyncRequestError;
use crate::profile::SharedProfile;
use crate::providers::{Clock, LocalProvider, NotificationSink};
use crate::schedule::PeriodicClock;

/// Fixed poll period for push change-detection.
pub const PUSH_PERIOD: Duration = Duration::from_secs(120);

/// Consecutive failed polls before the user is told push sync is degraded.
const DEGRADED_THRESHOLD: u32 = 10;

fn push_period() -> chrono::Duration {
    chrono::Duration::seconds(PUSH_PERIOD.as_secs() as i64)
}

/// Outcome of flipping a profile's push registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushSwitch {
    /// The registration was already in the requested state.
    Unchanged,
    /// The profile is now watched.
    Started,
    /// The profile is no longer watched. When it still has a nonzero
    /// schedule interval the caller should recompute its schedule timer.
    Stopped { refresh_schedule: bool },
}

struct Registration {
    profile: SharedProfile,
    last_count: usize,
    last_observed_at: DateTime<Utc>,
}

#[derive(Default)]
struct WatcherInner {
    registrations: BTreeMap<String, Registration>,
    /// Consecutive failed polls, shared across registrations.
    failures: u32,
    fire_at: Option<DateTime<Utc>>,
}

pub struct PushWatcher {
    local: Arc<dyn LocalProvider>,
    clock: Arc<dyn Clock>,
    notify: Arc<dyn NotificationSink>,
    timer: Arc<dyn PeriodicClock>,
    inner: Mutex<WatcherInner>,
}

impl PushWatcher {
    pub fn new(
        local: Arc<dyn LocalProvider>,
        clock: Arc<dyn Clock>,
        notify: Arc<dyn NotificationSink>,
        timer: Arc<dyn PeriodicClock>,
    ) -> Self {
        Self {
            local,
            clock,
            notify,
            timer,
            inner: Mutex::new(WatcherInner::default()),
        }
    }

    /// Whether any profile is currently registered.
    pub fn running(&self) -> bool {
        !self.inner.lock().unwrap().registrations.is_empty()
    }

    /// Whether the named profile itself is registered.
    pub fn is_watching(&self, name: &str) -> bool {
        self.inner.lock().unwrap().registrations.contains_key(name)
    }

    /// Register or deregister a profile. Idempotent: flipping to the state
    /// the profile is already in reports [`PushSwitch::Unchanged`]. The
    /// underlying clock runs while at least one registration exists.
    pub fn switch(&self, profile: &SharedProfile, enable: bool) -> PushSwitch {
        let (name, interval) = {
            let p = profile.read().unwrap();
            (p.name.clone(), p.interval_minutes())
        };
        let mut inner = self.inner.lock().unwrap();
        if enable {
            if inner.registrations.contains_key(&name) {
                return PushSwitch::Unchanged;
            }
            let registration = self.snapshot(profile);
            inner.registrations.insert(name.clone(), registration);
            if inner.registrations.len() == 1 {
                self.timer.arm(PUSH_PERIOD);
                inner.fire_at = Some(self.clock.now() + push_period());
            }
            info!(profile = %name, "push sync watching profile");
            PushSwitch::Started
        } else {
            if inner.registrations.remove(&name).is_none() {
                return PushSwitch::Unchanged;
            }
            if inner.registrations.is_empty() {
                self.timer.disarm();
                inner.fire_at = None;
            }
            info!(profile = %name, "push sync stopped watching profile");
            PushSwitch::Stopped {
                refresh_schedule: interval > 0,
            }
        }
    }

    /// Re-snapshot every registration so the next poll compares against the
    /// state as of now. A failed snapshot is logged and leaves the old one
    /// in place.
    pub fn reset_last_run(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = self.clock.now();
        for (name, reg) in inner.registrations.iter_mut() {
            self.refresh(name, reg, now);
        }
    }

    /// Re-snapshot one registration after its push-triggered sync completed.
    /// Other registrations keep their pending detections.
    pub fn reset_profile(&self, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        let now = self.clock.now();
        if let Some(reg) = inner.registrations.get_mut(name) {
            self.refresh(name, reg, now);
        }
    }

    fn refresh(&self, name: &str, reg: &mut Registration, now: DateTime<Utc>) {
        let snapshot = reg.profile.read().unwrap().clone();
        match self.local.get_items_in_range(&snapshot, true) {
            Ok(items) => {
                reg.last_count = items.len();
                reg.last_observed_at = now;
            }
            Err(e) => warn!(profile = %name, "failed to refresh push snapshot: {e}"),
        }
    }

    /// Driver entry point: fires the poll handler when the period elapsed.
    pub fn poll(&self, engine: &SyncEngine) {
        {
            let mut inner = self.inner.lock().unwrap();
            let now = self.clock.now();
            match inner.fire_at {
                Some(at) if now >= at => {
                    inner.fire_at = Some(now + push_period());
                }
                _ => return,
            }
        }
        self.on_tick(engine);
    }

    /// One poll pass over every registration.
    ///
    /// A changed profile triggers a push sync unless the engine is busy,
    /// in which case the change is picked up on a later pass (the snapshot
    /// is not advanced). A fetch failure aborts the pass; the tenth
    /// consecutive failure raises a single user notification. Any fully
    /// successful pass resets the failure streak.
    pub fn on_tick(&self, engine: &SyncEngine) {
        if engine.error_surface_presented() {
            debug!("suppressing push sync while error surface is up");
            return;
        }

        let mut inner = self.inner.lock().unwrap();
        let WatcherInner {
            registrations,
            failures,
            ..
        } = &mut *inner;
        let mut changed: Option<SharedProfile> = None;
        for (name, reg) in registrations.iter() {
            let snapshot = reg.profile.read().unwrap().clone();
            let items = match self.local.get_items_in_range(&snapshot, true) {
                Ok(items) => items,
                Err(e) => {
                    *failures += 1;
                    warn!(
                        profile = %name,
                        consecutive = *failures,
                        "push sync poll failed: {e}"
                    );
                    if *failures == DEGRADED_THRESHOLD {
                        self.notify
                            .update_with_error("Push Sync is failing.", &e, true);
                    }
                    return;
                }
            };
            let deleted = items.len() < reg.last_count;
            let modified = items.iter().any(|i| i.modified_at > reg.last_observed_at);
            if deleted || modified {
                debug!(profile = %name, deleted, modified, "push sync detected changes");
                changed.get_or_insert_with(|| Arc::clone(&reg.profile));
            }
        }
        *failures = 0;
        drop(inner);

        let Some(profile) = changed else { return };
        if engine.syncing_now() {
            debug!("push sync deferred; engine busy");
            return;
        }
        match engine.request_sync(&profile, TriggerSource::Push) {
            Ok(()) | Err(SyncRequestError::AlreadyRunning) => {}
            Err(e) => warn!("push sync request rejected: {e}"),
        }
    }

    fn snapshot(&self, profile: &SharedProfile) -> Registration {
        let snapshot = profile.read().unwrap().clone();
        let last_count = match self.local.get_items_in_range(&snapshot, true) {
            Ok(items) => items.len(),
            Err(e) => {
                warn!(profile = %snapshot.name, "initial push snapshot failed: {e}");
                0
            }
        };
        Registration {
            profile: Arc::clone(profile),
            last_count,
            last_observed_at: self.clock.now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SyncResult;
    use crate::error::ProviderError;
    use crate::schedule::ArmedPeriod;
    use crate::test_support::{
        engine_over, item, manual_clock, shared_profile, wait_until, CountNotifier, VecProvider,
    };

    struct Rig {
        watcher: PushWatcher,
        local: Arc<VecProvider>,
        armed: Arc<ArmedPeriod>,
        notify: Arc<CountNotifier>,
    }

    fn rig(local: Arc<VecProvider>, clock: Arc<crate::providers::ManualClock>) -> Rig {
        let armed = Arc::new(ArmedPeriod::new());
        let notify = Arc::new(CountNotifier::default());
        let watcher = PushWatcher::new(
            Arc::clone(&local) as _,
            clock,
            Arc::clone(&notify) as _,
            Arc::clone(&armed) as _,
        );
        Rig {
            watcher,
            local,
            armed,
            notify,
        }
    }

    #[test]
    fn switch_is_idempotent_and_drives_the_clock() {
        let clock = manual_clock();
        let r = rig(Arc::new(VecProvider::default()), Arc::clone(&clock));
        let profile = shared_profile(|p| p.push_enabled = true);

        assert_eq!(r.watcher.switch(&profile, true), PushSwitch::Started);
        assert_eq!(r.watcher.switch(&profile, true), PushSwitch::Unchanged);
        assert!(r.watcher.running());
        assert_eq!(r.armed.armed_period(), Some(PUSH_PERIOD));

        assert_eq!(
            r.watcher.switch(&profile, false),
            PushSwitch::Stopped {
                refresh_schedule: true
            }
        );
        assert_eq!(r.watcher.switch(&profile, false), PushSwitch::Unchanged);
        assert!(!r.watcher.running());
        assert_eq!(r.armed.armed_period(), None);
    }

    #[test]
    fn stop_skips_schedule_refresh_when_interval_disabled() {
        let clock = manual_clock();
        let r = rig(Arc::new(VecProvider::default()), clock);
        let profile = shared_profile(|p| {
            p.push_enabled = true;
            p.interval_value = 0;
        });
        r.watcher.switch(&profile, true);
        assert_eq!(
            r.watcher.switch(&profile, false),
            PushSwitch::Stopped {
                refresh_schedule: false
            }
        );
    }

    #[test]
    fn modified_item_triggers_push_sync() {
        let clock = manual_clock();
        let local = Arc::new(VecProvider::default());
        let remote = Arc::new(VecProvider::default());
        let (engine, _ctx) = engine_over(Arc::clone(&local), remote, Arc::clone(&clock));
        let r = rig(Arc::clone(&local), Arc::clone(&clock));
        let profile = shared_profile(|p| p.push_enabled = true);

        r.watcher.switch(&profile, true);
        // Edit arrives after the registration snapshot.
        local.items.lock().unwrap().push(item("a", 10, 5));

        r.watcher.on_tick(&engine);
        wait_until(|| !engine.syncing_now());
        let completions = engine.drain_completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].trigger, TriggerSource::Push);
        assert!(!completions[0].update_sync_schedule);
        assert_eq!(completions[0].result, SyncResult::Ok);
    }

    #[test]
    fn shrunk_item_count_triggers_push_sync() {
        let clock = manual_clock();
        let local = VecProvider::with_items(vec![item("a", 10, -60), item("b", 20, -60)]);
        let remote = Arc::new(VecProvider::default());
        let (engine, _ctx) = engine_over(Arc::clone(&local), remote, Arc::clone(&clock));
        let r = rig(Arc::clone(&local), Arc::clone(&clock));
        let profile = shared_profile(|p| p.push_enabled = true);

        r.watcher.switch(&profile, true);
        local.items.lock().unwrap().pop();

        r.watcher.on_tick(&engine);
        wait_until(|| !engine.syncing_now());
        let completions = engine.drain_completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].trigger, TriggerSource::Push);
    }

    #[test]
    fn unchanged_calendar_stays_quiet() {
        let clock = manual_clock();
        let local = VecProvider::with_items(vec![item("a", 10, -60)]);
        let remote = Arc::new(VecProvider::default());
        let (engine, _ctx) = engine_over(Arc::clone(&local), remote, Arc::clone(&clock));
        let r = rig(Arc::clone(&local), Arc::clone(&clock));
        let profile = shared_profile(|p| p.push_enabled = true);

        r.watcher.switch(&profile, true);
        r.watcher.on_tick(&engine);
        assert!(!engine.syncing_now());
        assert!(engine.drain_completions().is_empty());
    }

    #[test]
    fn reset_after_sync_absorbs_the_change() {
        let clock = manual_clock();
        let local = Arc::new(VecProvider::default());
        let remote = Arc::new(VecProvider::default());
        let (engine, _ctx) = engine_over(Arc::clone(&local), remote, Arc::clone(&clock));
        let r = rig(Arc::clone(&local), Arc::clone(&clock));
        let profile = shared_profile(|p| p.push_enabled = true);

        r.watcher.switch(&profile, true);
        local.items.lock().unwrap().push(item("a", 10, 5));
        clock.advance(chrono::Duration::minutes(10));
        r.watcher.reset_last_run();

        r.watcher.on_tick(&engine);
        assert!(!engine.syncing_now());
        assert!(engine.drain_completions().is_empty());
    }

    #[test]
    fn tick_paused_while_error_surface_presented() {
        let clock = manual_clock();
        let local = Arc::new(VecProvider::default());
        let remote = Arc::new(VecProvider::default());
        let (engine, ctx) = engine_over(Arc::clone(&local), remote, Arc::clone(&clock));
        let r = rig(Arc::clone(&local), Arc::clone(&clock));
        let profile = shared_profile(|p| p.push_enabled = true);

        r.watcher.switch(&profile, true);
        local.items.lock().unwrap().push(item("a", 10, 5));

        ctx.surface.present(true);
        r.watcher.on_tick(&engine);
        assert!(!engine.syncing_now());
        assert!(engine.drain_completions().is_empty());
        // Only the registration snapshot fetched: the poll never ran, so
        // neither the snapshots nor the failure streak moved.
        assert_eq!(
            r.local.fetches.load(std::sync::atomic::Ordering::SeqCst),
            1
        );

        // The pending change is still there once the surface clears.
        ctx.surface.present(false);
        r.watcher.on_tick(&engine);
        wait_until(|| !engine.syncing_now());
        let completions = engine.drain_completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].trigger, TriggerSource::Push);
    }

    #[test]
    fn tenth_consecutive_failure_notifies_once() {
        let clock = manual_clock();
        let local = Arc::new(VecProvider::default());
        let remote = Arc::new(VecProvider::default());
        let (engine, _ctx) = engine_over(Arc::clone(&local), remote, Arc::clone(&clock));
        let r = rig(Arc::clone(&local), Arc::clone(&clock));
        let profile = shared_profile(|p| p.push_enabled = true);
        r.watcher.switch(&profile, true);

        for _ in 0..12 {
            local.push_fetch_error(ProviderError::Transient("offline".into()));
        }
        for _ in 0..12 {
            r.watcher.on_tick(&engine);
        }
        assert_eq!(r.notify.error_count_containing("Push Sync is failing."), 1);

        // A clean pass resets the streak; ten fresh failures notify again.
        r.watcher.on_tick(&engine);
        for _ in 0..10 {
            local.push_fetch_error(ProviderError::Transient("offline".into()));
        }
        for _ in 0..10 {
            r.watcher.on_tick(&engine);
        }
        assert_eq!(r.notify.error_count_containing("Push Sync is failing."), 2);
    }
}
