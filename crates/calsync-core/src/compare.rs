//! Attribute comparison for paired calendar items.
//!
//! Pure functions: given a direction and the two sides' values, detect a
//! difference, append a human-readable change line to the caller's summary
//! and bump the caller's modification counter. Detection always uses the
//! full values; only the rendered description is truncated.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::profile::Direction;
use crate::providers::CalendarItem;

/// Values longer than this are truncated in the rendered description.
const STUB_MAX: usize = 50;
const STUB_KEEP: usize = 47;

/// Description stub: truncated to 47 chars + ellipsis when over 50 chars,
/// with embedded line breaks collapsed to spaces. Display only.
fn stub(value: &str) -> String {
    let truncated: String = if value.chars().count() > STUB_MAX {
        let mut s: String = value.chars().take(STUB_KEEP).collect();
        s.push_str("...");
        s
    } else {
        value.to_string()
    };
    truncated.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

/// Append one change line, ordered as (current target value => incoming
/// source value) for the given direction of propagation.
fn record(label: &str, direction: Direction, local: &str, remote: &str, summary: &mut String) {
    let line = match direction {
        Direction::RemoteToLocal => format!("{label}: {} => {}", stub(local), stub(remote)),
        _ => format!("{label}: {} => {}", stub(remote), stub(local)),
    };
    summary.push_str(&line);
    summary.push('\n');
}

/// Compare two text attributes. Absent values compare as empty strings.
pub fn compare_text(
    label: &str,
    direction: Direction,
    local: Option<&str>,
    remote: Option<&str>,
    summary: &mut String,
    modified: &mut u32,
) -> bool {
    let local = local.unwrap_or("");
    let remote = remote.unwrap_or("");
    debug!(attribute = label, "comparing");
    if local != remote {
        record(label, direction, local, remote, summary);
        *modified += 1;
        debug!(attribute = label, "attributes differ");
        true
    } else {
        false
    }
}

/// Compare two boolean attributes.
pub fn compare_bool(
    label: &str,
    direction: Direction,
    local: bool,
    remote: bool,
    summary: &mut String,
    modified: &mut u32,
) -> bool {
    debug!(attribute = label, "comparing");
    if local != remote {
        record(
            label,
            direction,
            &local.to_string(),
            &remote.to_string(),
            summary,
        );
        *modified += 1;
        debug!(attribute = label, "attributes differ");
        true
    } else {
        false
    }
}

/// Compare two timestamp attributes.
pub fn compare_datetime(
    label: &str,
    direction: Direction,
    local: DateTime<Utc>,
    remote: DateTime<Utc>,
    summary: &mut String,
    modified: &mut u32,
) -> bool {
    debug!(attribute = label, "comparing");
    if local != remote {
        let fmt = "%Y-%m-%d %H:%M:%S";
        record(
            label,
            direction,
            &local.format(fmt).to_string(),
            &remote.format(fmt).to_string(),
            summary,
        );
        *modified += 1;
        debug!(attribute = label, "attributes differ");
        true
    } else {
        false
    }
}

/// Field-level diff of a paired item.
#[derive(Debug, Clone, Default)]
pub struct ItemDiff {
    /// Count of differing attributes; 0 means the pair needs no update.
    pub modifications: u32,
    /// One change line per differing attribute.
    pub summary: String,
}

/// Diff the comparable attributes of a matched local/remote pair.
pub fn diff_items(direction: Direction, local: &CalendarItem, remote: &CalendarItem) -> ItemDiff {
    let mut diff = ItemDiff::default();
    let m = &mut diff.modifications;
    let s = &mut diff.summary;
    compare_text(
        "Subject",
        direction,
        Some(&local.subject),
        Some(&remote.subject),
        s,
        m,
    );
    compare_text(
        "Location",
        direction,
        local.location.as_deref(),
        remote.location.as_deref(),
        s,
        m,
    );
    compare_text(
        "Description",
        direction,
        local.description.as_deref(),
        remote.description.as_deref(),
        s,
        m,
    );
    compare_datetime("Start time", direction, local.start, remote.start, s, m);
    compare_datetime("End time", direction, local.end, remote.end, s, m);
    compare_bool("All-day", direction, local.all_day, remote.all_day, s, m);
    diff
}
