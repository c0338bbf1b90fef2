//! CLI argument definitions using clap
//!
//! Commands:
//! - mqstore init --config <path>
//! - mqstore start --config <path>
//! - mqstore members --config <path>
//! - mqstore inspect --config <path> [--prefix <prefix>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mqstore - transactional message store with a replicated group
#[derive(Parser, Debug)]
#[command(name = "mqstore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the data directory and record the local node
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./mqstore.json")]
        config: PathBuf,
    },

    /// Open the store, join the group and serve until Ctrl-C
    Start {
        /// Path to configuration file
        #[arg(long, default_value = "./mqstore.json")]
        config: PathBuf,
    },

    /// List persisted replication node records
    Members {
        /// Path to configuration file
        #[arg(long, default_value = "./mqstore.json")]
        config: PathBuf,
    },

    /// Dump store keys
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./mqstore.json")]
        config: PathBuf,

        /// Only keys starting with this prefix
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
