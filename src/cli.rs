//! Thin `clap` front end: verbosity flags plus two local-testing overrides.
//! Running with no flags uses configuration from the environment alone.

use clap::{ArgAction, Parser};
use std::path::PathBuf;

const VERSION_INFO: &str = env!("GUARDIAN_BUILD_VERSION");

#[derive(Parser, Debug)]
#[command(name = "compose-guardian")]
#[command(about = "Unattended backup-then-verify updater for docker compose stacks", version = VERSION_INFO)]
pub struct Cli {
    /// Increase message verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Run exactly once regardless of SCHEDULE_CRON/SCHEDULE_EVERY
    #[arg(long)]
    pub once: bool,

    /// Override COMPOSE_ROOT for this invocation
    #[arg(long)]
    pub root: Option<PathBuf>,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
