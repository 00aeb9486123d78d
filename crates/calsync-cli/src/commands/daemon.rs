use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use calsync_core::profile::shared;
use calsync_core::SchedulerService;

use crate::commands::{settings_path, wire, CliResult};

#[derive(Args)]
pub struct DaemonArgs {
    /// Override the driver loop cadence in seconds
    #[arg(long)]
    pub poll_secs: Option<u64>,
}

pub fn run(config: Option<PathBuf>, args: DaemonArgs) -> CliResult {
    let path = settings_path(config)?;
    let wired = wire(&path)?;
    let poll_secs = args.poll_secs.unwrap_or(wired.settings.poll_secs).max(1);

    let mut service = SchedulerService::new(
        wired.engine.clone(),
        Arc::clone(&wired.push),
        Arc::clone(&wired.clock),
    );
    for profile in &wired.settings.profiles {
        service.register_profile(&shared(profile.clone()));
    }
    info!(
        profiles = wired.settings.profiles.len(),
        poll_secs, "scheduler daemon started"
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(poll_secs)) => {
                    for c in service.tick() {
                        info!(
                            profile = %c.profile,
                            trigger = ?c.trigger,
                            result = ?c.result,
                            examined = c.counts.examined,
                            created = c.counts.created,
                            updated = c.counts.updated,
                            deleted = c.counts.deleted,
                            "sync run recorded"
                        );
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
            }
        }
    });

    if wired.engine.syncing_now() {
        info!("waiting for the in-flight sync to stop");
        wired.engine.request_cancellation();
        while wired.engine.syncing_now() {
            std::thread::sleep(Duration::from_millis(50));
        }
    }
    Ok(())
}
