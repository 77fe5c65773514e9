//! CLI command definitions
//!
//! Defines the clap commands for the ctrltest CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a test script against the controller
    Run {
        /// Path to the YAML test script
        script: PathBuf,

        /// Run name used for the log and snapshot files (default: script file name)
        #[arg(long)]
        name: Option<String>,

        /// Use an in-memory device seeded from the script's simulation section
        #[arg(long)]
        simulate: bool,

        /// Write snapshots to this JSON lines file
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Apply the inputs of one step and exit, leaving the controller in that state
    Reset {
        /// Path to the YAML test script
        script: PathBuf,

        /// Step whose inputs to apply
        #[arg(long, default_value = "1")]
        step: usize,

        /// Use an in-memory device instead of the gateway
        #[arg(long)]
        simulate: bool,
    },

    /// Print the current value of every mapped point
    Points {
        /// Path to the YAML test script
        script: PathBuf,

        /// Use an in-memory device instead of the gateway
        #[arg(long)]
        simulate: bool,
    },

    /// Validate a test script and its point map without touching a device
    Check {
        /// Path to the YAML test script
        script: PathBuf,
    },
}
