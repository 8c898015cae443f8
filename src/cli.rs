use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sumgr")]
#[command(version)]
#[command(about = "Lists installed apps with their root grants and security profiles", long_about = None)]
pub struct Cli {
    /// Path to a JSON config file (defaults to $SUMGR_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Enumerate apps through the privileged helper and print them as JSON.
    /// Each invocation starts with an empty cache, so this is always a full
    /// enumeration.
    List {
        /// Include system apps without a root grant or custom profile
        #[arg(long)]
        system: bool,

        /// Only list apps of the primary device user
        #[arg(long)]
        primary_only: bool,

        /// Filter by label or package name
        #[arg(long)]
        search: Option<String>,

        /// Print uid groups instead of the flat list
        #[arg(long)]
        grouped: bool,

        /// Profile export to join against (overrides the config file)
        #[arg(long)]
        profiles: Option<PathBuf>,
    },
    /// Run the privileged helper on stdin/stdout
    Serve,
}

#[cfg(test)]
#[path = "../tests/cli/cli_tests.rs"]
mod cli_tests;
