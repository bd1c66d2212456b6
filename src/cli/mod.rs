//! CLI definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// Bulk account sync between CSV files and the CRM
#[derive(Parser, Debug)]
#[command(name = "acctsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Credential file (default: ./.creds.json, then ~/.acctsync/creds.json)
    #[arg(long, global = true, env = "ACCTSYNC_CREDS")]
    pub creds: Option<PathBuf>,

    /// Credential profile to use
    #[arg(long, global = true, env = "ACCTSYNC_PROFILE")]
    pub profile: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Decode, validate and plan without changing remote records
    #[arg(long, global = true)]
    pub dry_run: bool,

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

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export every account to a CSV file
    Export {
        /// Output file
        file: PathBuf,
    },

    /// Import accounts from a CSV file
    Import(ImportArgs),

    /// Delete every account (environment reset)
    DeleteAll,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Show version information
    Version,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Input file, with the header line `acctsync export` writes
    pub file: PathBuf,

    /// How records are sent
    #[arg(long, value_enum, default_value_t)]
    pub mode: ImportMode,

    /// Records per submitted batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Stop at the first rejected record (create mode)
    #[arg(long)]
    pub abort_on_first_error: bool,

    /// Field the remote store matches existing records on (upsert mode)
    #[arg(long)]
    pub external_id: Option<String>,
}

/// Import transport.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImportMode {
    /// Bulk upsert jobs (default)
    #[default]
    Upsert,
    /// One create call per record
    Create,
}

/// Supported shells for completions.
#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
