pub mod daemon;
pub mod profile;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use calsync_core::providers::{JsonCalendar, LogNotifier, NoErrorSurface};
use calsync_core::schedule::{ArmedPeriod, PushWatcher};
use calsync_core::{Clock, Settings, SettingsFile, SyncEngine, SystemClock};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn settings_path(overridden: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match overridden {
        Some(path) => Ok(path),
        None => Ok(Settings::default_path()?),
    }
}

/// The engine and push watcher wired over the JSON-file provider pair that
/// lives next to the settings file.
pub struct Wired {
    pub settings: Settings,
    pub engine: SyncEngine,
    pub push: Arc<PushWatcher>,
    pub clock: Arc<dyn Clock>,
}

pub fn wire(config_path: &Path) -> Result<Wired, Box<dyn std::error::Error>> {
    let settings = Settings::load(config_path)?;
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    let local = Arc::new(JsonCalendar::new(base.join("calendars").join("local.json")));
    let remote = Arc::new(JsonCalendar::new(base.join("calendars").join("remote.json")));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notify = Arc::new(LogNotifier);
    let engine = SyncEngine::new(
        Arc::clone(&local) as _,
        remote as _,
        Arc::clone(&clock),
        Arc::clone(&notify) as _,
        Arc::new(NoErrorSurface),
        Arc::new(SettingsFile::new(config_path)),
    );
    let push = Arc::new(PushWatcher::new(
        local as _,
        Arc::clone(&clock),
        notify as _,
        Arc::new(ArmedPeriod::new()),
    ));
    Ok(Wired {
        settings,
        engine,
        push,
        clock,
    })
}
