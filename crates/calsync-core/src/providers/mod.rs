//! Collaborator contracts: provider adapters, notification surface, clocks.
//!
//! The core never talks to a concrete calendar API. Adapters implement
//! [`LocalProvider`] / [`RemoteProvider`] over a provider-agnostic
//! [`CalendarItem`] and fail with classified [`ProviderError`]s; everything
//! user-facing goes through [`NotificationSink`].

pub mod json_file;

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::ProviderError;
use crate::profile::SyncProfile;

pub use json_file::JsonCalendar;

/// Provider-agnostic event value: the only item representation the core
/// diffs and passes across the adapter boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarItem {
    /// Stable identifier linking the same event across both stores.
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
    /// Last modification timestamp reported by the owning store.
    pub modified_at: DateTime<Utc>,
}

impl CalendarItem {
    /// Stable sort key: start time, then identifier. Repeated runs over
    /// unchanged data process pairs in the same order.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.start, &self.id)
    }
}

/// The local calendar store.
///
/// `only_push_relevant` restricts the fetch to the cheap subset the push
/// watcher polls (count + modification times); adapters may ignore it.
pub trait LocalProvider: Send + Sync {
    fn get_items_in_range(
        &self,
        profile: &SyncProfile,
        only_push_relevant: bool,
    ) -> Result<Vec<CalendarItem>, ProviderError>;
    fn create_item(&self, profile: &SyncProfile, item: &CalendarItem)
        -> Result<(), ProviderError>;
    fn update_item(&self, profile: &SyncProfile, item: &CalendarItem)
        -> Result<(), ProviderError>;
    fn delete_item(&self, profile: &SyncProfile, id: &str) -> Result<(), ProviderError>;
}

/// The remote calendar store.
pub trait RemoteProvider: Send + Sync {
    fn get_items_in_range(&self, profile: &SyncProfile) -> Result<Vec<CalendarItem>, ProviderError>;
    fn create_item(&self, profile: &SyncProfile, item: &CalendarItem)
        -> Result<(), ProviderError>;
    fn update_item(&self, profile: &SyncProfile, item: &CalendarItem)
        -> Result<(), ProviderError>;
    fn delete_item(&self, profile: &SyncProfile, id: &str) -> Result<(), ProviderError>;
    /// Re-authenticate after a session expiry; called by the engine before
    /// the single ReconnectThenRetry re-attempt.
    fn reconnect(&self) -> Result<(), ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One-way sink for user-visible messages. The core never waits for a reply.
pub trait NotificationSink: Send + Sync {
    fn update(&self, message: &str, severity: Severity);
    fn update_with_error(
        &self,
        message: &str,
        error: &(dyn std::error::Error + 'static),
        notify_user: bool,
    );
}

/// Notification sink that forwards everything to the log.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn update(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!("{message}"),
            Severity::Warning => warn!("{message}"),
            Severity::Error => error!("{message}"),
        }
    }

    fn update_with_error(
        &self,
        message: &str,
        error: &(dyn std::error::Error + 'static),
        notify_user: bool,
    ) {
        error!(notify_user, "{message}: {error}");
    }
}

/// Query for whether a blocking error-reporting surface is in front of the
/// user. Timer ticks are swallowed while it is.
pub trait ErrorSurface: Send + Sync {
    fn presented(&self) -> bool;
}

/// Error surface that is never presented (headless operation).
pub struct NoErrorSurface;

impl ErrorSurface for NoErrorSurface {
    fn presented(&self) -> bool {
        false
    }
}

/// Time source. Injected so schedules are testable with a manual clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic schedules.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
