//! # Calsync Core Library
//!
//! Core logic for calsync: orchestration and scheduling of calendar
//! synchronization between a local and a remote calendar store. The CLI
//! binary is a thin layer over this library; any richer frontend would sit
//! on the same surface.
//!
//! ## Architecture
//!
//! - **Engine**: a single-worker-slot orchestrator; at most one sync runs
//!   at a time, with cooperative cancellation and a one-retry policy for
//!   transient failures
//! - **Schedule**: caller-driven per-profile interval timers plus a shared
//!   push watcher polling the local calendar for changes
//! - **Compare**: attribute-level diffing with truncated human-readable
//!   summaries
//! - **Providers**: trait seams for the two calendar sides, with a
//!   JSON-file implementation for local stores and testing
//!
//! ## Key Components
//!
//! - [`SyncEngine`]: trigger arbitration and run execution
//! - [`SchedulerService`]: composition root driving timers and push
//! - [`SyncProfile`]: one configured calendar pairing
//! - [`Settings`]: TOML-backed configuration

pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod profile;
pub mod providers;
pub mod schedule;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Settings, SettingsFile};
pub use engine::{Completion, RunCounts, SyncEngine, SyncResult, TriggerSource};
pub use error::{ConfigError, CoreError, ProviderError, Result, SyncRequestError};
pub use profile::{Direction, IntervalUnit, ProfileStore, SharedProfile, SyncProfile};
pub use providers::{CalendarItem, Clock, LocalProvider, RemoteProvider, SystemClock};
pub use schedule::{PushWatcher, ScheduleStatus, ScheduleTimer};
pub use service::SchedulerService;
