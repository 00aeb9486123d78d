//! Sync profiles: one configured pairing of a local and a remote calendar.
//!
//! A profile owns its schedule settings and merge-policy flags. The scheduler
//! only reads `direction`, the interval fields and `last_sync`; the remaining
//! flags are carried for the provider adapters and the diff step.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Direction of propagation between the two calendar stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LocalToRemote,
    RemoteToLocal,
    Bidirectional,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::LocalToRemote => "local -> remote",
            Direction::RemoteToLocal => "remote -> local",
            Direction::Bidirectional => "2-way",
        }
    }
}

/// Unit for the scheduled sync interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
}

fn default_direction() -> Direction {
    Direction::LocalToRemote
}
fn default_interval_unit() -> IntervalUnit {
    IntervalUnit::Hours
}
fn default_days_in_the_past() -> i64 {
    1
}
fn default_days_in_the_future() -> i64 {
    60
}
fn default_true() -> bool {
    true
}

/// One configured calendar pairing with its schedule and merge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProfile {
    /// Unique name within the running process.
    pub name: String,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    /// Scheduled sync interval; 0 means scheduled sync is disabled
    /// (push-only or manual-only).
    #[serde(default)]
    pub interval_value: u32,
    #[serde(default = "default_interval_unit")]
    pub interval_unit: IntervalUnit,
    /// Change-detection polling of the local provider.
    #[serde(default)]
    pub push_enabled: bool,
    /// Timestamp of the last completed sync. Monotonic non-decreasing.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    /// Sync window: how many days back from today items are considered.
    #[serde(default = "default_days_in_the_past")]
    pub days_in_the_past: i64,
    /// Sync window: how many days ahead of today items are considered.
    #[serde(default = "default_days_in_the_future")]
    pub days_in_the_future: i64,
    // Merge policy, consumed by the diff/apply step and the adapters.
    #[serde(default = "default_true")]
    pub disable_delete: bool,
    #[serde(default = "default_true")]
    pub merge_items: bool,
    #[serde(default = "default_true")]
    pub created_items_only: bool,
    /// Which side receives metadata writes in 2-way mode; opaque to the
    /// scheduler, consumed by adapters.
    #[serde(default = "default_direction")]
    pub target_calendar: Direction,
}

impl SyncProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: default_direction(),
            interval_value: 0,
            interval_unit: default_interval_unit(),
            push_enabled: false,
            last_sync: None,
            days_in_the_past: default_days_in_the_past(),
            days_in_the_future: default_days_in_the_future(),
            disable_delete: true,
            merge_items: true,
            created_items_only: true,
            target_calendar: default_direction(),
        }
    }

    /// Scheduled interval normalized to minutes. 0 means disabled.
    pub fn interval_minutes(&self) -> i64 {
        match self.interval_unit {
            IntervalUnit::Minutes => i64::from(self.interval_value),
            IntervalUnit::Hours => i64::from(self.interval_value) * 60,
        }
    }

    /// Inclusive start / exclusive end of the sync window around `today`.
    pub fn sync_window(&self, today: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = today - Duration::days(self.days_in_the_past);
        let end = today + Duration::days(self.days_in_the_future + 1);
        (start, end)
    }

    /// Record a completed sync. Never moves `last_sync` backwards.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        if self.last_sync.map_or(true, |prev| at >= prev) {
            self.last_sync = Some(at);
        }
    }
}

/// Shared handle to a profile: the store, the schedule timer and the engine
/// all read through this, so edits between runs are seen on the next read.
pub type SharedProfile = Arc<RwLock<SyncProfile>>;

pub fn shared(profile: SyncProfile) -> SharedProfile {
    Arc::new(RwLock::new(profile))
}

/// Side-effect boundary for persisting `last_sync` immediately on update.
pub trait ProfilePersistence: Send + Sync {
    fn save_last_sync(&self, profile: &SyncProfile) -> Result<()>;
}

/// Persistence sink that drops updates; used when no settings file is wired.
pub struct NoPersistence;

impl ProfilePersistence for NoPersistence {
    fn save_last_sync(&self, _profile: &SyncProfile) -> Result<()> {
        Ok(())
    }
}

/// All configured profiles for the running process.
#[derive(Default)]
pub struct ProfileStore {
    profiles: Vec<SharedProfile>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, profile: SyncProfile) -> Result<SharedProfile> {
        if self.get(&profile.name).is_some() {
            return Err(ConfigError::DuplicateProfile(profile.name).into());
        }
        let handle = shared(profile);
        self.profiles.push(Arc::clone(&handle));
        Ok(handle)
    }

    pub fn get(&self, name: &str) -> Option<SharedProfile> {
        self.profiles
            .iter()
            .find(|p| p.read().map(|p| p.name == name).unwrap_or(false))
            .cloned()
    }

    pub fn remove(&mut self, name: &str) -> Option<SharedProfile> {
        let idx = self
            .profiles
            .iter()
            .position(|p| p.read().map(|p| p.name == name).unwrap_or(false))?;
        Some(self.profiles.remove(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SharedProfile> {
        self.profiles.iter()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
