//! File-backed reference adapter.
//!
//! Keeps a whole calendar as a JSON array of [`CalendarItem`]s on disk.
//! Implements both provider traits so the CLI and the integration tests have
//! a working provider pair without any network adapter.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;

use crate::error::ProviderError;
use crate::profile::SyncProfile;
use crate::providers::{CalendarItem, LocalProvider, RemoteProvider};

pub struct JsonCalendar {
    path: PathBuf,
    // Serializes read-modify-write cycles from concurrent callers.
    io: Mutex<()>,
}

impl JsonCalendar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> Result<Vec<CalendarItem>, ProviderError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| ProviderError::Permanent(e.to_string()))
    }

    fn save(&self, items: &[CalendarItem]) -> Result<(), ProviderError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProviderError::Transient(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(items)
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| ProviderError::Transient(e.to_string()))
    }

    fn fetch(&self, profile: &SyncProfile) -> Result<Vec<CalendarItem>, ProviderError> {
        let _guard = self.io.lock().unwrap();
        let (start, end) = profile.sync_window(Utc::now());
        let mut items: Vec<CalendarItem> = self
            .load()?
            .into_iter()
            .filter(|i| i.start >= start && i.start < end)
            .collect();
        items.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(items)
    }

    fn upsert(&self, item: &CalendarItem, create: bool) -> Result<(), ProviderError> {
        let _guard = self.io.lock().unwrap();
        let mut items = self.load()?;
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) if !create => *existing = item.clone(),
            Some(_) => {
                return Err(ProviderError::Item {
                    id: item.id.clone(),
                    message: "already exists".into(),
                })
            }
            None if create => items.push(item.clone()),
            None => {
                return Err(ProviderError::Item {
                    id: item.id.clone(),
                    message: "not found for update".into(),
                })
            }
        }
        self.save(&items)
    }

    fn remove(&self, id: &str) -> Result<(), ProviderError> {
        let _guard = self.io.lock().unwrap();
        let mut items = self.load()?;
        items.retain(|i| i.id != id);
        self.save(&items)
    }
}

impl LocalProvider for JsonCalendar {
    fn get_items_in_range(
        &self,
        profile: &SyncProfile,
        _only_push_relevant: bool,
    ) -> Result<Vec<CalendarItem>, ProviderError> {
        self.fetch(profile)
    }

    fn create_item(
        &self,
        _profile: &SyncProfile,
        item: &CalendarItem,
    ) -> Result<(), ProviderError> {
        self.upsert(item, true)
    }

    fn update_item(
        &self,
        _profile: &SyncProfile,
        item: &CalendarItem,
    ) -> Result<(), ProviderError> {
        self.upsert(item, false)
    }

    fn delete_item(&self, _profile: &SyncProfile, id: &str) -> Result<(), ProviderError> {
        self.remove(id)
    }
}

impl RemoteProvider for JsonCalendar {
    fn get_items_in_range(&self, profile: &SyncProfile) -> Result<Vec<CalendarItem>, ProviderError> {
        self.fetch(profile)
    }

    fn create_item(
        &self,
        _profile: &SyncProfile,
        item: &CalendarItem,
    ) -> Result<(), ProviderError> {
        self.upsert(item, true)
    }

    fn update_item(
        &self,
        _profile: &SyncProfile,
        item: &CalendarItem,
    ) -> Result<(), ProviderError> {
        self.upsert(item, false)
    }

    fn delete_item(&self, _profile: &SyncProfile, id: &str) -> Result<(), ProviderError> {
        self.remove(id)
    }

    fn reconnect(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
