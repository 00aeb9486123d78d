//! A single sync run: fetch both sides, pair, diff, apply.
//!
//! Item pairs are processed in stable (start time, id) order so repeated
//! runs over unchanged data produce identical logs and decisions. The
//! cooperative cancellation flag is checked at pair boundaries only; field
//! comparisons are synchronous and fast.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::compare::diff_items;
use crate::engine::{CancelFlag, SyncResult};
use crate::error::ProviderError;
use crate::profile::{Direction, SyncProfile};
use crate::providers::{CalendarItem, LocalProvider, RemoteProvider};

/// Item tallies for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub examined: u32,
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub item_failures: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RunReport {
    pub result: SyncResult,
    pub counts: RunCounts,
}

enum Pairing {
    Matched(CalendarItem, CalendarItem),
    LocalOnly(CalendarItem),
    RemoteOnly(CalendarItem),
}

impl Pairing {
    fn sort_key(&self) -> (chrono::DateTime<chrono::Utc>, String) {
        let item = match self {
            Pairing::Matched(l, _) => l,
            Pairing::LocalOnly(l) => l,
            Pairing::RemoteOnly(r) => r,
        };
        (item.start, item.id.clone())
    }

    fn id(&self) -> &str {
        match self {
            Pairing::Matched(l, _) => &l.id,
            Pairing::LocalOnly(l) => &l.id,
            Pairing::RemoteOnly(r) => &r.id,
        }
    }
}

/// How a provider failure affects the run.
enum FailureScope {
    /// Skip the item, count it, keep going.
    Item,
    /// Abort the run with the given classified outcome.
    Run(SyncResult),
}

fn classify(error: &ProviderError) -> FailureScope {
    match error {
        ProviderError::Item { .. } => FailureScope::Item,
        ProviderError::AuthExpired => FailureScope::Run(SyncResult::ReconnectThenRetry),
        ProviderError::RateLimited | ProviderError::Transient(_) => {
            FailureScope::Run(SyncResult::AutoRetry)
        }
        ProviderError::Permanent(_) => FailureScope::Run(SyncResult::Abandon),
    }
}

fn pair_items(locals: Vec<CalendarItem>, remotes: Vec<CalendarItem>) -> Vec<Pairing> {
    let mut remote_map: BTreeMap<String, CalendarItem> =
        remotes.into_iter().map(|r| (r.id.clone(), r)).collect();
    let mut pairs: Vec<Pairing> = locals
        .into_iter()
        .map(|l| match remote_map.remove(&l.id) {
            Some(r) => Pairing::Matched(l, r),
            None => Pairing::LocalOnly(l),
        })
        .collect();
    pairs.extend(remote_map.into_values().map(Pairing::RemoteOnly));
    pairs.sort_by_key(Pairing::sort_key);
    pairs
}

/// Which way a matched pair propagates. In 2-way mode the newer side wins.
fn effective_direction(profile: &SyncProfile, local: &CalendarItem, remote: &CalendarItem) -> Direction {
    match profile.direction {
        Direction::Bidirectional => {
            if local.modified_at >= remote.modified_at {
                Direction::LocalToRemote
            } else {
                Direction::RemoteToLocal
            }
        }
        direction => direction,
    }
}

/// Execute one sync run over a profile snapshot.
///
/// The snapshot is taken by the caller before the run starts; the live
/// profile may be edited while the run is in flight without affecting it.
pub(crate) fn execute(
    local: &dyn LocalProvider,
    remote: &dyn RemoteProvider,
    profile: &SyncProfile,
    force_compare: bool,
    cancel: &CancelFlag,
) -> RunReport {
    let mut counts = RunCounts::default();
    info!(
        profile = %profile.name,
        direction = profile.direction.name(),
        force_compare,
        "sync run started"
    );

    let locals = match local.get_items_in_range(profile, false) {
        Ok(items) => items,
        Err(e) => return fetch_failed(&e, "local", profile, counts),
    };
    if cancel.requested() {
        return RunReport {
            result: SyncResult::UserCancelled,
            counts,
        };
    }
    let remotes = match remote.get_items_in_range(profile) {
        Ok(items) => items,
        Err(e) => return fetch_failed(&e, "remote", profile, counts),
    };

    let pairs = pair_items(locals, remotes);
    counts.examined = pairs.len() as u32;

    let mut was_cancelled = false;
    for pair in pairs {
        // Safe point: cooperative cancellation is honored between pairs.
        if cancel.requested() {
            was_cancelled = true;
            break;
        }
        let id = pair.id().to_string();
        if let Err(e) = process_pair(local, remote, profile, force_compare, pair, &mut counts) {
            match classify(&e) {
                FailureScope::Item => {
                    counts.item_failures += 1;
                    warn!(profile = %profile.name, item = %id, "item failed, continuing: {e}");
                }
                FailureScope::Run(result) => {
                    warn!(profile = %profile.name, item = %id, "provider failure aborted run: {e}");
                    return RunReport { result, counts };
                }
            }
        }
    }

    let result = if was_cancelled {
        info!(profile = %profile.name, "sync run stopped at safe point after cancellation");
        SyncResult::UserCancelled
    } else if counts.item_failures > 0 {
        SyncResult::Fail
    } else {
        SyncResult::Ok
    };
    info!(
        profile = %profile.name,
        examined = counts.examined,
        created = counts.created,
        updated = counts.updated,
        deleted = counts.deleted,
        failures = counts.item_failures,
        ?result,
        "sync run finished"
    );
    RunReport { result, counts }
}

fn fetch_failed(
    error: &ProviderError,
    side: &str,
    profile: &SyncProfile,
    counts: RunCounts,
) -> RunReport {
    warn!(profile = %profile.name, side, "failed to fetch items: {error}");
    let result = match classify(error) {
        FailureScope::Run(result) => result,
        FailureScope::Item => SyncResult::Fail,
    };
    RunReport { result, counts }
}

fn process_pair(
    local: &dyn LocalProvider,
    remote: &dyn RemoteProvider,
    profile: &SyncProfile,
    force_compare: bool,
    pair: Pairing,
    counts: &mut RunCounts,
) -> Result<(), ProviderError> {
    match pair {
        Pairing::Matched(l, r) => {
            // Incremental shortcut: untouched pairs are skipped unless a
            // full compare was forced.
            if !force_compare {
                if let Some(last) = profile.last_sync {
                    if l.modified_at <= last && r.modified_at <= last {
                        debug!(item = %l.id, "unchanged since last sync, skipping");
                        return Ok(());
                    }
                }
            }
            let diff = diff_items(profile.direction, &l, &r);
            if diff.modifications == 0 {
                debug!(item = %l.id, "no differing attributes");
                return Ok(());
            }
            info!(
                profile = %profile.name,
                item = %l.id,
                modifications = diff.modifications,
                "item differs:\n{}",
                diff.summary.trim_end()
            );
            match effective_direction(profile, &l, &r) {
                Direction::RemoteToLocal => local.update_item(profile, &r)?,
                _ => remote.update_item(profile, &l)?,
            }
            counts.updated += 1;
        }
        Pairing::LocalOnly(l) => match profile.direction {
            Direction::LocalToRemote | Direction::Bidirectional => {
                info!(profile = %profile.name, item = %l.id, "creating remote item");
                remote.create_item(profile, &l)?;
                counts.created += 1;
            }
            Direction::RemoteToLocal => {
                if profile.disable_delete {
                    debug!(item = %l.id, "orphaned local item left in place (deletion disabled)");
                } else {
                    info!(profile = %profile.name, item = %l.id, "deleting local item");
                    local.delete_item(profile, &l.id)?;
                    counts.deleted += 1;
                }
            }
        },
        Pairing::RemoteOnly(r) => match profile.direction {
            Direction::RemoteToLocal | Direction::Bidirectional => {
                info!(profile = %profile.name, item = %r.id, "creating local item");
                local.create_item(profile, &r)?;
                counts.created += 1;
            }
            Direction::LocalToRemote => {
                if profile.disable_delete {
                    debug!(item = %r.id, "orphaned remote item left in place (deletion disabled)");
                } else {
                    info!(profile = %profile.name, item = %r.id, "deleting remote item");
                    remote.delete_item(profile, &r.id)?;
                    counts.deleted += 1;
                }
            }
        },
    }
    Ok(())
}
