use std::path::PathBuf;
use std::sync::Arc;

use calsync_core::profile::shared;
use calsync_core::SchedulerService;

use crate::commands::{settings_path, wire, CliResult};

pub fn run(config: Option<PathBuf>) -> CliResult {
    let path = settings_path(config)?;
    let wired = wire(&path)?;
    let mut service = SchedulerService::new(
        wired.engine.clone(),
        Arc::clone(&wired.push),
        Arc::clone(&wired.clock),
    );

    if wired.settings.profiles.is_empty() {
        println!("no profiles configured");
        return Ok(());
    }
    for profile in &wired.settings.profiles {
        service.register_profile(&shared(profile.clone()));
    }
    for name in service.profile_names().map(String::from).collect::<Vec<_>>() {
        if let Some(status) = service.profile_status(&name) {
            println!("{name}: {status}");
        }
    }
    Ok(())
}
