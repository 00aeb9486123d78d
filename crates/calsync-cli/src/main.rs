use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "calsync", version, about = "Calendar synchronization scheduler")]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Profile management
    Profile {
        #[command(subcommand)]
        action: commands::profile::ProfileAction,
    },
    /// Run a sync for one profile and wait for it to finish
    Sync(commands::sync::SyncArgs),
    /// Show the schedule status of every profile
    Status,
    /// Run the scheduler in the foreground until interrupted
    Daemon(commands::daemon::DaemonArgs),
}

fn main() {
    commands::init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Profile { action } => commands::profile::run(cli.config, action),
        Commands::Sync(args) => commands::sync::run(cli.config, args),
        Commands::Status => commands::status::run(cli.config),
        Commands::Daemon(args) => commands::daemon::run(cli.config, args),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
