//! Settings file handling.
//!
//! All profiles live in a single TOML file under the platform config
//! directory (`~/.config/calsync/config.toml` on Linux). A missing file is
//! treated as empty defaults so a fresh install works without a setup step.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, CoreError, Result};
use crate::profile::{ProfilePersistence, SyncProfile};

fn default_poll_secs() -> u64 {
    15
}

/// On-disk settings: the configured profiles plus daemon tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub profiles: Vec<SyncProfile>,
    /// Cadence of the daemon driver loop, in seconds.
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profiles: Vec::new(),
            poll_secs: default_poll_secs(),
        }
    }
}

impl Settings {
    /// Platform default config path: `<config dir>/calsync/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| CoreError::Custom("could not determine config directory".into()))?;
        Ok(base.join("calsync").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let settings: Settings =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        fs::write(path, raw).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Result<&SyncProfile> {
        self.profiles
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()).into())
    }

    pub fn profile_mut(&mut self, name: &str) -> Result<&mut SyncProfile> {
        self.profiles
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()).into())
    }

    pub fn add_profile(&mut self, profile: SyncProfile) -> Result<()> {
        if self.profiles.iter().any(|p| p.name == profile.name) {
            return Err(ConfigError::DuplicateProfile(profile.name).into());
        }
        self.profiles.push(profile);
        Ok(())
    }

    pub fn remove_profile(&mut self, name: &str) -> Result<SyncProfile> {
        let idx = self
            .profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| CoreError::from(ConfigError::UnknownProfile(name.to_string())))?;
        Ok(self.profiles.remove(idx))
    }
}

/// File-backed [`ProfilePersistence`]: rewrites the settings file whenever
/// a profile's `last_sync` advances, so a crash never loses more than the
/// run in flight.
pub struct SettingsFile {
    path: PathBuf,
    // Serializes read-modify-write cycles against the file.
    io: Mutex<()>,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        let _guard = self.io.lock().map_err(|_| poisoned())?;
        Settings::load(&self.path)
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let _guard = self.io.lock().map_err(|_| poisoned())?;
        settings.save(&self.path)
    }
}

fn poisoned() -> CoreError {
    CoreError::Custom("settings file lock poisoned".into())
}

impl ProfilePersistence for SettingsFile {
    fn save_last_sync(&self, profile: &SyncProfile) -> Result<()> {
        let _guard = self.io.lock().map_err(|_| poisoned())?;
        let mut settings = Settings::load(&self.path)?;
        settings.profile_mut(&profile.name)?.last_sync = profile.last_sync;
        settings.save(&self.path)
    }
}
