use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "sarafanbot")]
#[command(author, version, about = "Referral intake bot for a consultation business", long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: PathBuf,

    /// Apply (`up`) or roll back the latest (`down`) schema migration and exit
    #[arg(long, value_enum)]
    pub migrate: Option<MigrateDirection>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MigrateDirection {
    Up,
    Down,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
