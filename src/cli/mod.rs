//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ConfigOverrides;
use crate::sync::ModeChoice;

pub mod commands;

/// favarc - incremental archiver for favorited posts
#[derive(Parser, Debug)]
#[command(name = "favarc", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (default: ~/.favarc)
    #[arg(long, global = true, env = "FAVARC_HOME")]
    pub home: Option<PathBuf>,

    /// Database path (default: <home>/archive.db)
    #[arg(long, global = true, env = "FAVARC_DB")]
    pub db: Option<PathBuf>,

    /// Artifact directory (default: <home>/backup_js)
    #[arg(long, global = true, env = "FAVARC_EXPORT_DIR")]
    pub export_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Configuration overrides from the global flags.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            data_dir: self.home.clone(),
            db_path: self.db.clone(),
            export_dir: self.export_dir.clone(),
            ..ConfigOverrides::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch new favorites and export the partitions they touched
    Sync(SyncArgs),

    /// Write pending partition artifacts and the manifest
    Export {
        /// Rebuild every partition, not only pending ones
        #[arg(long)]
        all: bool,
    },

    /// Seed the archive from existing partition artifacts
    Import {
        /// Directory containing <YYYY_MM>.js files
        dir: PathBuf,
    },

    /// Show archive and export status
    Status,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// How far back a sync reaches.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// Stop at the newest archived id (default)
    Id,
    /// Stop before a calendar date (requires --since)
    Date,
    /// Walk the whole timeline and rebuild every partition
    Full,
}

#[derive(Args, Debug, Default)]
pub struct SyncArgs {
    /// Stop policy; prompts when omitted on a terminal
    #[arg(long, value_enum)]
    pub mode: Option<SyncMode>,

    /// Date for --mode date, as YYYYMMDD (implies --mode date)
    #[arg(long)]
    pub since: Option<String>,

    /// Favorites endpoint URL
    #[arg(long, env = "FAVARC_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, env = "FAVARC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Records per page (1-30)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=30))]
    pub page_size: Option<u32>,

    /// Delay between page requests in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Skip the export step
    #[arg(long)]
    pub no_export: bool,
}

impl SyncArgs {
    /// The mode requested on the command line, if any.
    #[must_use]
    pub fn mode_choice(&self) -> Option<ModeChoice> {
        match (self.mode, &self.since) {
            (Some(SyncMode::Full), _) => Some(ModeChoice::Full),
            (Some(SyncMode::Id), _) => Some(ModeChoice::ById),
            (Some(SyncMode::Date), since) => {
                Some(ModeChoice::ByDate(since.clone().unwrap_or_default()))
            }
            (None, Some(since)) => Some(ModeChoice::ByDate(since.clone())),
            (None, None) => None,
        }
    }

    /// Layer the sync flags onto the global overrides.
    #[must_use]
    pub fn apply(&self, mut overrides: ConfigOverrides) -> ConfigOverrides {
        overrides.endpoint = self.endpoint.clone();
        overrides.token = self.token.clone();
        overrides.page_size = self.page_size;
        overrides.page_delay_ms = self.delay_ms;
        overrides
    }
}
