//! Shared fakes for the in-crate unit tests: scriptable providers, a
//! gate-blocked provider for busy-engine scenarios, counting notification
//! sinks and a manual clock factory.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};

use crate::engine::SyncEngine;
use crate::error::ProviderError;
use crate::profile::{shared, ProfilePersistence, SharedProfile, SyncProfile};
use crate::providers::{
    CalendarItem, LocalProvider, ManualClock, NotificationSink, RemoteProvider, Severity,
};
use crate::schedule::{ArmedPeriod, PushWatcher};

/// Fixed, deterministic base time for schedule tests.
pub(crate) fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap(),
    ))
}

pub(crate) fn shared_profile(configure: impl FnOnce(&mut SyncProfile)) -> SharedProfile {
    let mut p = SyncProfile::new("test");
    configure(&mut p);
    shared(p)
}

pub(crate) fn item(id: &str, start_offset_min: i64, modified_offset_min: i64) -> CalendarItem {
    let base = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
    let start = base + chrono::Duration::minutes(start_offset_min);
    CalendarItem {
        id: id.into(),
        subject: format!("event {id}"),
        location: None,
        description: None,
        start,
        end: start + chrono::Duration::minutes(30),
        all_day: false,
        modified_at: base + chrono::Duration::minutes(modified_offset_min),
    }
}

/// Poll until `f` holds; panics after five seconds.
pub(crate) fn wait_until(f: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !f() {
        if Instant::now() > deadline {
            panic!("condition not reached within 5s");
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

/// Scriptable in-memory provider implementing both provider traits.
#[derive(Default)]
pub(crate) struct VecProvider {
    pub items: Mutex<Vec<CalendarItem>>,
    /// Popped front-first, one per fetch; empty means fetches succeed.
    pub fetch_errors: Mutex<VecDeque<ProviderError>>,
    /// Write operations on these ids fail with an item-level error.
    pub fail_ops_for: Mutex<HashSet<String>>,
    pub created: Mutex<Vec<CalendarItem>>,
    pub updated: Mutex<Vec<CalendarItem>>,
    pub deleted: Mutex<Vec<String>>,
    pub fetches: AtomicU32,
    pub reconnects: AtomicU32,
}

impl VecProvider {
    pub fn with_items(items: Vec<CalendarItem>) -> Arc<Self> {
        let p = Self::default();
        *p.items.lock().unwrap() = items;
        Arc::new(p)
    }

    pub fn push_fetch_error(&self, e: ProviderError) {
        self.fetch_errors.lock().unwrap().push_back(e);
    }

    pub fn fail_ops_on(&self, id: &str) {
        self.fail_ops_for.lock().unwrap().insert(id.into());
    }

    fn fetch(&self) -> Result<Vec<CalendarItem>, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.fetch_errors.lock().unwrap().pop_front() {
            return Err(e);
        }
        Ok(self.items.lock().unwrap().clone())
    }

    fn check_op(&self, id: &str) -> Result<(), ProviderError> {
        if self.fail_ops_for.lock().unwrap().contains(id) {
            Err(ProviderError::Item {
                id: id.into(),
                message: "scripted failure".into(),
            })
        } else {
            Ok(())
        }
    }
}

impl LocalProvider for VecProvider {
    fn get_items_in_range(
        &self,
        _profile: &SyncProfile,
        _only_push_relevant: bool,
    ) -> Result<Vec<CalendarItem>, ProviderError> {
        self.fetch()
    }

    fn create_item(&self, _p: &SyncProfile, item: &CalendarItem) -> Result<(), ProviderError> {
        self.check_op(&item.id)?;
        self.created.lock().unwrap().push(item.clone());
        Ok(())
    }

    fn update_item(&self, _p: &SyncProfile, item: &CalendarItem) -> Result<(), ProviderError> {
        self.check_op(&item.id)?;
        self.updated.lock().unwrap().push(item.clone());
        Ok(())
    }

    fn delete_item(&self, _p: &SyncProfile, id: &str) -> Result<(), ProviderError> {
        self.check_op(id)?;
        self.deleted.lock().unwrap().push(id.into());
        Ok(())
    }
}

impl RemoteProvider for VecProvider {
    fn get_items_in_range(&self, _p: &SyncProfile) -> Result<Vec<CalendarItem>, ProviderError> {
        self.fetch()
    }

    fn create_item(&self, _p: &SyncProfile, item: &CalendarItem) -> Result<(), ProviderError> {
        self.check_op(&item.id)?;
        self.created.lock().unwrap().push(item.clone());
        Ok(())
    }

    fn update_item(&self, _p: &SyncProfile, item: &CalendarItem) -> Result<(), ProviderError> {
        self.check_op(&item.id)?;
        self.updated.lock().unwrap().push(item.clone());
        Ok(())
    }

    fn delete_item(&self, _p: &SyncProfile, id: &str) -> Result<(), ProviderError> {
        self.check_op(id)?;
        self.deleted.lock().unwrap().push(id.into());
        Ok(())
    }

    fn reconnect(&self) -> Result<(), ProviderError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Blocks local fetches until opened; lets tests hold the engine busy.
#[derive(Default)]
pub(crate) struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let guard = self.open.lock().unwrap();
        let (_guard, timeout) = self
            .cv
            .wait_timeout_while(guard, Duration::from_secs(10), |open| !*open)
            .unwrap();
        assert!(!timeout.timed_out(), "gate never opened");
    }
}

pub(crate) struct GateProvider {
    pub gate: Arc<Gate>,
}

impl LocalProvider for GateProvider {
    fn get_items_in_range(
        &self,
        _p: &SyncProfile,
        _push: bool,
    ) -> Result<Vec<CalendarItem>, ProviderError> {
        self.gate.wait();
        Ok(Vec::new())
    }

    fn create_item(&self, _p: &SyncProfile, _i: &CalendarItem) -> Result<(), ProviderError> {
        Ok(())
    }

    fn update_item(&self, _p: &SyncProfile, _i: &CalendarItem) -> Result<(), ProviderError> {
        Ok(())
    }

    fn delete_item(&self, _p: &SyncProfile, _id: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Records every notification.
#[derive(Default)]
pub(crate) struct CountNotifier {
    pub messages: Mutex<Vec<(String, Severity)>>,
    pub errors: Mutex<Vec<(String, bool)>>,
}

impl CountNotifier {
    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m.contains(needle))
            .count()
    }

    pub fn error_count_containing(&self, needle: &str) -> usize {
        self.errors
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m.contains(needle))
            .count()
    }
}

impl NotificationSink for CountNotifier {
    fn update(&self, message: &str, severity: Severity) {
        self.messages
            .lock()
            .unwrap()
            .push((message.into(), severity));
    }

    fn update_with_error(
        &self,
        message: &str,
        _error: &(dyn std::error::Error + 'static),
        notify_user: bool,
    ) {
        self.errors
            .lock()
            .unwrap()
            .push((message.into(), notify_user));
    }
}

/// Error surface toggled by the test.
#[derive(Default)]
pub(crate) struct FlagSurface {
    flag: AtomicBool,
}

impl FlagSurface {
    pub fn present(&self, on: bool) {
        self.flag.store(on, Ordering::SeqCst);
    }
}

impl crate::providers::ErrorSurface for FlagSurface {
    fn presented(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Records `last_sync` persistence calls.
#[derive(Default)]
pub(crate) struct MemPersist {
    pub saves: Mutex<Vec<String>>,
}

impl ProfilePersistence for MemPersist {
    fn save_last_sync(&self, profile: &SyncProfile) -> crate::error::Result<()> {
        self.saves.lock().unwrap().push(profile.name.clone());
        Ok(())
    }
}

pub(crate) struct Ctx {
    pub local: Arc<VecProvider>,
    pub remote: Arc<VecProvider>,
    pub notify: Arc<CountNotifier>,
    pub surface: Arc<FlagSurface>,
    pub persist: Arc<MemPersist>,
    pub gate: Arc<Gate>,
}

fn build(local: Arc<dyn LocalProvider>, ctx: Ctx, clock: Arc<ManualClock>) -> (SyncEngine, Ctx) {
    let engine = SyncEngine::new(
        local,
        Arc::clone(&ctx.remote) as _,
        clock,
        Arc::clone(&ctx.notify) as _,
        Arc::clone(&ctx.surface) as _,
        Arc::clone(&ctx.persist) as _,
    );
    (engine, ctx)
}

fn fresh_ctx() -> Ctx {
    Ctx {
        local: Arc::new(VecProvider::default()),
        remote: Arc::new(VecProvider::default()),
        notify: Arc::new(CountNotifier::default()),
        surface: Arc::new(FlagSurface::default()),
        persist: Arc::new(MemPersist::default()),
        gate: Arc::new(Gate::default()),
    }
}

/// Engine over empty in-memory providers.
pub(crate) fn idle_engine(clock: Arc<ManualClock>) -> (SyncEngine, Ctx) {
    let ctx = fresh_ctx();
    let local = Arc::clone(&ctx.local);
    build(local as _, ctx, clock)
}

/// Engine whose local fetch blocks until `ctx.gate.open()`.
pub(crate) fn gated_engine(clock: Arc<ManualClock>) -> (SyncEngine, Ctx) {
    let ctx = fresh_ctx();
    let gate = Arc::clone(&ctx.gate);
    build(Arc::new(GateProvider { gate }) as _, ctx, clock)
}

/// Engine over caller-supplied providers, sharing the rest of the fakes.
pub(crate) fn engine_over(
    local: Arc<VecProvider>,
    remote: Arc<VecProvider>,
    clock: Arc<ManualClock>,
) -> (SyncEngine, Ctx) {
    let mut ctx = fresh_ctx();
    ctx.local = local;
    ctx.remote = remote;
    let local = Arc::clone(&ctx.local);
    build(local as _, ctx, clock)
}

/// Push watcher over an empty local provider, for status-only tests.
pub(crate) fn idle_watcher(clock: Arc<dyn crate::providers::Clock>) -> Arc<PushWatcher> {
    Arc::new(PushWatcher::new(
        Arc::new(VecProvider::default()) as _,
        clock,
        Arc::new(CountNotifier::default()) as _,
        Arc::new(ArmedPeriod::new()) as _,
    ))
}
