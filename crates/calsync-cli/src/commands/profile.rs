use std::path::PathBuf;

use clap::Subcommand;

use calsync_core::{Direction, IntervalUnit, Settings, SyncProfile};

use crate::commands::{settings_path, CliResult};

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Add a profile
    Add {
        name: String,
        /// Sync direction: local-to-remote, remote-to-local or two-way
        #[arg(long, default_value = "local-to-remote")]
        direction: String,
        /// Scheduled interval value; 0 disables scheduled sync
        #[arg(long, default_value = "0")]
        every: u32,
        /// Interval unit: minutes or hours
        #[arg(long, default_value = "hours")]
        unit: String,
        /// Watch the local calendar for changes between scheduled syncs
        #[arg(long)]
        push: bool,
        /// Propagate deletions of orphaned items
        #[arg(long)]
        allow_delete: bool,
    },
    /// Remove a profile
    Remove { name: String },
    /// List configured profiles
    List,
    /// Print one profile as JSON
    Show { name: String },
}

fn parse_direction(raw: &str) -> Result<Direction, Box<dyn std::error::Error>> {
    match raw {
        "local-to-remote" => Ok(Direction::LocalToRemote),
        "remote-to-local" => Ok(Direction::RemoteToLocal),
        "two-way" => Ok(Direction::Bidirectional),
        other => Err(format!("unknown direction '{other}'").into()),
    }
}

fn parse_unit(raw: &str) -> Result<IntervalUnit, Box<dyn std::error::Error>> {
    match raw {
        "minutes" => Ok(IntervalUnit::Minutes),
        "hours" => Ok(IntervalUnit::Hours),
        other => Err(format!("unknown interval unit '{other}'").into()),
    }
}

pub fn run(config: Option<PathBuf>, action: ProfileAction) -> CliResult {
    let path = settings_path(config)?;
    let mut settings = Settings::load(&path)?;

    match action {
        ProfileAction::Add {
            name,
            direction,
            every,
            unit,
            push,
            allow_delete,
        } => {
            let mut profile = SyncProfile::new(name);
            profile.direction = parse_direction(&direction)?;
            profile.interval_value = every;
            profile.interval_unit = parse_unit(&unit)?;
            profile.push_enabled = push;
            profile.disable_delete = !allow_delete;
            println!("{}", serde_json::to_string_pretty(&profile)?);
            settings.add_profile(profile)?;
            settings.save(&path)?;
        }
        ProfileAction::Remove { name } => {
            settings.remove_profile(&name)?;
            settings.save(&path)?;
            println!("removed '{name}'");
        }
        ProfileAction::List => {
            for profile in &settings.profiles {
                let last = profile
                    .last_sync
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "{}  {}  every {} {:?}  push={}  last sync: {}",
                    profile.name,
                    profile.direction.name(),
                    profile.interval_value,
                    profile.interval_unit,
                    profile.push_enabled,
                    last,
                );
            }
        }
        ProfileAction::Show { name } => {
            println!("{}", serde_json::to_string_pretty(settings.profile(&name)?)?);
        }
    }
    Ok(())
}
