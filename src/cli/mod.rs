//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::OutputFormat;

/// Study Vault - Export, preview, restore and reset a study planner's dataset.
#[derive(Parser, Debug)]
#[command(name = "study-vault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file (defaults to ~/.study-vault/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file.
    Init {
        /// Account whose collections the tool operates on.
        #[arg(long)]
        owner: Option<String>,
    },

    /// Export the whole dataset into a dated archive file.
    Export {
        /// Output directory (defaults to the data directory's exports/).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Preview an archive without touching the store.
    Analyze {
        /// Archive file to inspect.
        file: PathBuf,

        /// Output format: table or json.
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Restore an archive into the store.
    Import {
        /// Archive file to restore.
        file: PathBuf,

        /// Skip the confirmation check.
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete every collection of the account. Irreversible.
    Reset {
        /// Confirm the deletion.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show document counts per collection.
    Stats,
}
