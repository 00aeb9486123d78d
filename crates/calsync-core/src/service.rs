//! Composition root for the scheduling side: owns one schedule timer per
//! registered profile plus the shared push watcher, and relays run
//! completions back into the schedules.
//!
//! The service is deliberately passive. A driver loop (the daemon command,
//! or a test) calls [`SchedulerService::tick`] at whatever cadence it
//! likes; all due-time arithmetic lives in the timers themselves.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::{Completion, SyncEngine, SyncResult, TriggerSource};
use crate::profile::SharedProfile;
use crate::providers::Clock;
use crate::schedule::{ArmedPeriod, PushSwitch, PushWatcher, ScheduleStatus, ScheduleTimer};

pub struct SchedulerService {
    engine: SyncEngine,
    push: Arc<PushWatcher>,
    clock: Arc<dyn Clock>,
    timers: BTreeMap<String, ScheduleTimer>,
}

impl SchedulerService {
    pub fn new(engine: SyncEngine, push: Arc<PushWatcher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            engine,
            push,
            clock,
            timers: BTreeMap::new(),
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn push(&self) -> &Arc<PushWatcher> {
        &self.push
    }

    /// Put a profile under schedule management. Arms its timer from the
    /// profile's interval and registers it with the push watcher when push
    /// sync is enabled. Re-registering a name replaces its timer.
    pub fn register_profile(&mut self, profile: &SharedProfile) {
        let (name, push_enabled) = {
            let p = profile.read().unwrap();
            (p.name.clone(), p.push_enabled)
        };
        let timer = ScheduleTimer::new(
            Arc::clone(profile),
            Arc::clone(&self.clock),
            Arc::new(ArmedPeriod::new()),
            Arc::clone(&self.push),
        );
        info!(profile = %name, status = %timer.status(), "profile registered");
        self.timers.insert(name, timer);
        if push_enabled {
            self.push.switch(profile, true);
        }
    }

    /// Remove a profile from schedule management, push watch included.
    pub fn deregister_profile(&mut self, name: &str) {
        if let Some(timer) = self.timers.remove(name) {
            self.push.switch(timer.profile(), false);
            info!(profile = %name, "profile deregistered");
        }
    }

    /// Re-read a profile's settings after an edit: recompute its schedule
    /// and align its push registration with the `push_enabled` flag.
    pub fn refresh_profile(&mut self, name: &str) {
        let Some(timer) = self.timers.get_mut(name) else {
            return;
        };
        let push_enabled = timer.profile().read().unwrap().push_enabled;
        let switched = self.push.switch(timer.profile(), push_enabled);
        timer.set_next_sync(None, false);
        if let PushSwitch::Stopped { .. } | PushSwitch::Started = switched {
            debug!(profile = %name, ?switched, "push registration updated");
        }
    }

    /// One driver pass: poll the push watcher and every timer, then fold
    /// finished runs back into the schedules.
    pub fn tick(&mut self) -> Vec<Completion> {
        self.push.poll(&self.engine);
        for timer in self.timers.values_mut() {
            timer.poll(&self.engine);
        }

        let completions = self.engine.drain_completions();
        for completion in &completions {
            self.absorb(completion);
        }
        completions
    }

    fn absorb(&mut self, completion: &Completion) {
        if completion.trigger == TriggerSource::Push
            && !matches!(
                completion.result,
                SyncResult::Abandon | SyncResult::UserCancelled
            )
        {
            // The run consumed the detected changes for this profile; start
            // watching it from the post-sync state. Cancelled or abandoned
            // runs consumed nothing, so their detections stay pending.
            self.push.reset_profile(&completion.profile);
        }
        if completion.update_sync_schedule {
            if let Some(timer) = self.timers.get_mut(&completion.profile) {
                timer.set_next_sync(None, false);
            }
        }
    }

    /// Schedule state for one profile, folding in whether the engine is
    /// currently running it.
    pub fn profile_status(&self, name: &str) -> Option<ScheduleStatus> {
        let timer = self.timers.get(name)?;
        if self.engine.syncing_now() && self.engine.active_profile_name().as_deref() == Some(name) {
            return Some(ScheduleStatus::InProgress);
        }
        Some(timer.status())
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.timers.keys().map(String::as_str)
    }
}
