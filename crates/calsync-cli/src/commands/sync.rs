use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use calsync_core::profile::shared;
use calsync_core::{SyncResult, TriggerSource};

use crate::commands::{settings_path, wire, CliResult};

#[derive(Args)]
pub struct SyncArgs {
    /// Profile to sync
    pub profile: String,
    /// Compare every item, ignoring the last-sync watermark
    #[arg(long)]
    pub full: bool,
}

pub fn run(config: Option<PathBuf>, args: SyncArgs) -> CliResult {
    let path = settings_path(config)?;
    let wired = wire(&path)?;
    let profile = shared(wired.settings.profile(&args.profile)?.clone());

    wired
        .engine
        .request_sync(
            &profile,
            TriggerSource::Manual {
                force_compare: args.full,
            },
        )
        .map_err(|e| e.to_string())?;
    while wired.engine.syncing_now() {
        std::thread::sleep(Duration::from_millis(50));
    }

    let completions = wired.engine.drain_completions();
    let completion = completions
        .last()
        .ok_or("sync produced no completion record")?;
    let c = &completion.counts;
    println!(
        "{}: {:?} (examined {}, created {}, updated {}, deleted {}, item failures {})",
        completion.profile, completion.result, c.examined, c.created, c.updated, c.deleted,
        c.item_failures,
    );

    match completion.result {
        SyncResult::Ok | SyncResult::UserCancelled => Ok(()),
        other => Err(format!("sync finished with {other:?}").into()),
    }
}
