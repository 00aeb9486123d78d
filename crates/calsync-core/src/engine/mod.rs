//! Sync orchestration: trigger arbitration, the single worker slot,
//! cancellation and the run outcome taxonomy.
//!
//! At most one sync executes at any instant across the whole process,
//! regardless of how many profiles exist or how many trigger sources fire.
//! The active-profile slot is only mutated while no run is in flight.

mod run;


use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncRequestError;
use crate::profile::{Direction, ProfilePersistence, SharedProfile};
use crate::providers::{Clock, ErrorSurface, LocalProvider, NotificationSink, RemoteProvider, Severity};

pub use run::RunCounts;

/// Provenance of a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Manual { force_compare: bool },
    Scheduled,
    Push,
}

/// Outcome of a sync run. Consumed by the retry policy and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    /// Completed; diffs applied or none needed.
    Ok,
    /// One or more item-level failures; the rest of the run completed.
    Fail,
    /// Unrecoverable condition for this run; stopped immediately.
    Abandon,
    /// Transient failure; the engine re-attempts once before giving up.
    AutoRetry,
    /// Session expired; the engine reconnects the remote, then retries once.
    ReconnectThenRetry,
    /// Cooperative or forced cancellation.
    UserCancelled,
}

/// Cooperative cancellation flag with forced-abort escalation.
///
/// Monotonic: none -> requested -> forced.
#[derive(Debug, Default)]
pub struct CancelFlag {
    state: AtomicU8,
}

const CANCEL_NONE: u8 = 0;
const CANCEL_REQUESTED: u8 = 1;
const CANCEL_FORCED: u8 = 2;

impl CancelFlag {
    pub fn request(&self) {
        self.state.fetch_max(CANCEL_REQUESTED, Ordering::SeqCst);
    }

    pub fn force(&self) {
        self.state.store(CANCEL_FORCED, Ordering::SeqCst);
    }

    pub fn requested(&self) -> bool {
        self.state.load(Ordering::SeqCst) > CANCEL_NONE
    }

    pub fn forced(&self) -> bool {
        self.state.load(Ordering::SeqCst) == CANCEL_FORCED
    }
}

/// Record of one finished (or aborted) run, drained by the scheduler service.
#[derive(Debug, Clone)]
pub struct Completion {
    pub run_id: Uuid,
    pub profile: String,
    pub trigger: TriggerSource,
    pub result: SyncResult,
    /// Whether the profile's schedule timer should recompute its next due
    /// time from the fresh `last_sync` (false for push-triggered runs).
    pub update_sync_schedule: bool,
    pub counts: RunCounts,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

struct Worker {
    cancel: Arc<CancelFlag>,
    generation: u64,
    run_id: Uuid,
    profile_name: String,
    trigger: TriggerSource,
    update_sync_schedule: bool,
    started_at: DateTime<Utc>,
}

#[derive(Default)]
struct EngineInner {
    active: Option<SharedProfile>,
    worker: Option<Worker>,
    /// Bumped on every start; completions from older generations are stale
    /// (their worker was forcibly aborted) and get discarded.
    generation: u64,
    last_completion: Option<Completion>,
}

struct EngineShared {
    local: Arc<dyn LocalProvider>,
    remote: Arc<dyn RemoteProvider>,
    clock: Arc<dyn Clock>,
    notify: Arc<dyn NotificationSink>,
    surface: Arc<dyn ErrorSurface>,
    persistence: Arc<dyn ProfilePersistence>,
    inner: Mutex<EngineInner>,
    completions: Mutex<VecDeque<Completion>>,
}

/// Cheaply clonable handle to the process-wide sync orchestrator.
#[derive(Clone)]
pub struct SyncEngine {
    shared: Arc<EngineShared>,
}

impl SyncEngine {
    pub fn new(
        local: Arc<dyn LocalProvider>,
        remote: Arc<dyn RemoteProvider>,
        clock: Arc<dyn Clock>,
        notify: Arc<dyn NotificationSink>,
        surface: Arc<dyn ErrorSurface>,
        persistence: Arc<dyn ProfilePersistence>,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                local,
                remote,
                clock,
                notify,
                surface,
                persistence,
                inner: Mutex::new(EngineInner::default()),
                completions: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn syncing_now(&self) -> bool {
        self.shared.inner.lock().unwrap().worker.is_some()
    }

    pub fn cancellation_pending(&self) -> bool {
        self.shared
            .inner
            .lock()
            .unwrap()
            .worker
            .as_ref()
            .map(|w| w.cancel.requested())
            .unwrap_or(false)
    }

    pub fn active_profile_name(&self) -> Option<String> {
        self.shared
            .inner
            .lock()
            .unwrap()
            .active
            .as_ref()
            .and_then(|p| p.read().ok().map(|p| p.name.clone()))
    }

    pub fn error_surface_presented(&self) -> bool {
        self.shared.surface.presented()
    }

    pub fn last_completion(&self) -> Option<Completion> {
        self.shared.inner.lock().unwrap().last_completion.clone()
    }

    /// Remove and return all completions recorded since the last drain.
    pub fn drain_completions(&self) -> Vec<Completion> {
        self.shared.completions.lock().unwrap().drain(..).collect()
    }

    /// Arbitrate a sync request into the single worker slot.
    ///
    /// Automated triggers arriving while a run is in flight are rejected
    /// with a warning log only; manual triggers additionally raise a
    /// user-visible notice. Rescheduling after a rejected scheduled trigger
    /// is the schedule timer's job, not the engine's.
    pub fn request_sync(
        &self,
        profile: &SharedProfile,
        trigger: TriggerSource,
    ) -> Result<(), SyncRequestError> {
        let mut inner = self.shared.inner.lock().unwrap();
        if inner.worker.is_some() {
            match trigger {
                TriggerSource::Manual { .. } => {
                    info!("already busy syncing, cannot accept another sync request");
                    self.shared.notify.update(
                        "A sync is already running. Please wait for it to complete and then try again.",
                        Severity::Warning,
                    );
                }
                _ => warn!(
                    ?trigger,
                    "automated sync triggered whilst previous sync is still running; ignoring"
                ),
            }
            return Err(SyncRequestError::AlreadyRunning);
        }

        let (force_compare, update_sync_schedule) = match trigger {
            TriggerSource::Manual { force_compare } => {
                let direction = profile.read().unwrap().direction;
                if force_compare && direction == Direction::Bidirectional {
                    self.shared.notify.update(
                        "Forcing a full sync is not allowed whilst in 2-way sync mode. \
                         Please temporarily choose a direction to sync in first.",
                        Severity::Error,
                    );
                    return Err(SyncRequestError::ForceCompareBidirectional);
                }
                if force_compare {
                    info!("manual request forced a compare of all items");
                }
                (force_compare, true)
            }
            TriggerSource::Scheduled => (false, true),
            TriggerSource::Push => (false, false),
        };

        inner.active = Some(Arc::clone(profile));
        self.start_locked(
            &mut inner,
            Arc::clone(profile),
            trigger,
            force_compare,
            update_sync_schedule,
        );
        Ok(())
    }

    /// First call: cooperative cancellation, observed at the next safe
    /// point. Second call while one is pending: forced abort -- the worker
    /// slot is freed unconditionally and the orphaned worker's eventual
    /// completion is discarded.
    pub fn request_cancellation(&self) {
        let mut inner = self.shared.inner.lock().unwrap();
        let Some(worker) = inner.worker.as_ref() else {
            return;
        };
        if !worker.cancel.requested() {
            worker.cancel.request();
            drop(inner);
            self.shared
                .notify
                .update("Sync cancellation requested.", Severity::Warning);
        } else {
            worker.cancel.force();
            let worker = inner.worker.take().expect("worker checked above");
            let completion = Completion {
                run_id: worker.run_id,
                profile: worker.profile_name,
                trigger: worker.trigger,
                result: SyncResult::UserCancelled,
                update_sync_schedule: worker.update_sync_schedule,
                counts: RunCounts::default(),
                started_at: worker.started_at,
                finished_at: self.shared.clock.now(),
            };
            inner.last_completion = Some(completion.clone());
            drop(inner);
            self.shared.notify.update(
                "Repeated cancellation requested - forcefully aborting sync!",
                Severity::Warning,
            );
            self.shared
                .completions
                .lock()
                .unwrap()
                .push_back(completion);
        }
    }

    fn start_locked(
        &self,
        inner: &mut EngineInner,
        profile: SharedProfile,
        trigger: TriggerSource,
        force_compare: bool,
        update_sync_schedule: bool,
    ) {
        inner.generation += 1;
        let generation = inner.generation;
        let cancel = Arc::new(CancelFlag::default());
        let run_id = Uuid::new_v4();
        let started_at = self.shared.clock.now();
        let profile_name = profile.read().unwrap().name.clone();
        info!(profile = %profile_name, ?trigger, %run_id, "sync started");

        inner.worker = Some(Worker {
            cancel: Arc::clone(&cancel),
            generation,
            run_id,
            profile_name: profile_name.clone(),
            trigger,
            update_sync_schedule,
            started_at,
        });

        let engine = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("calsync-worker-{profile_name}"))
            .spawn(move || {
                let report = engine.execute_with_retry(&profile, force_compare, &cancel);
                engine.finish(generation, &profile, report);
            });
        if let Err(e) = spawned {
            inner.worker = None;
            self.shared
                .notify
                .update_with_error("Failed to start sync worker.", &e, true);
        }
    }

    fn execute_with_retry(
        &self,
        profile: &SharedProfile,
        force_compare: bool,
        cancel: &CancelFlag,
    ) -> run::RunReport {
        let snapshot = profile.read().unwrap().clone();
        let local = &*self.shared.local;
        let remote = &*self.shared.remote;

        let report = run::execute(local, remote, &snapshot, force_compare, cancel);
        match report.result {
            SyncResult::AutoRetry => {
                warn!(profile = %snapshot.name, "transient failure; re-attempting once");
                settle(run::execute(local, remote, &snapshot, force_compare, cancel))
            }
            SyncResult::ReconnectThenRetry => {
                warn!(profile = %snapshot.name, "session expired; reconnecting remote provider");
                match remote.reconnect() {
                    Ok(()) => settle(run::execute(local, remote, &snapshot, force_compare, cancel)),
                    Err(e) => {
                        self.shared
                            .notify
                            .update_with_error("Re-authentication failed.", &e, true);
                        run::RunReport {
                            result: SyncResult::Fail,
                            counts: report.counts,
                        }
                    }
                }
            }
            _ => report,
        }
    }

    fn finish(&self, generation: u64, profile: &SharedProfile, report: run::RunReport) {
        let finished_at = self.shared.clock.now();
        let mut inner = self.shared.inner.lock().unwrap();
        let Some(worker) = inner.worker.as_ref() else {
            debug!("completion arrived with no worker slot; aborted run, discarding");
            return;
        };
        if worker.generation != generation {
            debug!(generation, "discarding completion from superseded worker");
            return;
        }
        let worker = inner.worker.take().expect("worker checked above");

        // Any completion short of Abandon/UserCancelled stamps "now",
        // partial failures included (see DESIGN.md).
        let mut persist = None;
        if !matches!(
            report.result,
            SyncResult::Abandon | SyncResult::UserCancelled
        ) {
            let mut p = profile.write().unwrap();
            p.mark_synced(finished_at);
            persist = Some(p.clone());
        }

        let completion = Completion {
            run_id: worker.run_id,
            profile: worker.profile_name,
            trigger: worker.trigger,
            result: report.result,
            update_sync_schedule: worker.update_sync_schedule,
            counts: report.counts,
            started_at: worker.started_at,
            finished_at,
        };
        inner.last_completion = Some(completion.clone());
        drop(inner);

        if let Some(p) = persist {
            if let Err(e) = self.shared.persistence.save_last_sync(&p) {
                warn!(profile = %p.name, "failed to persist last sync timestamp: {e}");
            }
        }
        self.notify_outcome(&completion);
        self.shared
            .completions
            .lock()
            .unwrap()
            .push_back(completion);
    }

    fn notify_outcome(&self, completion: &Completion) {
        match completion.result {
            SyncResult::Ok => {
                info!(
                    profile = %completion.profile,
                    run_id = %completion.run_id,
                    "sync completed"
                );
            }
            SyncResult::Fail => {
                self.shared.notify.update(
                    &format!(
                        "Sync for '{}' completed with {} item failure(s).",
                        completion.profile, completion.counts.item_failures
                    ),
                    Severity::Error,
                );
            }
            SyncResult::Abandon => {
                self.shared.notify.update(
                    &format!("Sync for '{}' was abandoned.", completion.profile),
                    Severity::Error,
                );
            }
            SyncResult::UserCancelled => {
                self.shared
                    .notify
                    .update("Sync was cancelled.", Severity::Info);
            }
            // Settled into Ok/Fail by the retry policy before recording.
            SyncResult::AutoRetry | SyncResult::ReconnectThenRetry => {}
        }
    }
}

/// A retry re-attempt that fails the same transient way is terminal.
fn settle(mut report: run::RunReport) -> run::RunReport {
    if matches!(
        report.result,
        SyncResult::AutoRetry | SyncResult::ReconnectThenRetry
    ) {
        report.result = SyncResult::Fail;
    }
    report
}
