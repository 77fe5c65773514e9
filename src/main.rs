//! ctrltest - scripted functional testing of building-control devices
//!
//! Applies a timed sequence of inputs to a live controller through a
//! protocol gateway, waits for the control loop to settle and checks the
//! outputs against expected values.

use clap::Parser;
use ctrltest::commands::Commands;
use ctrltest::common::config::Config;
use ctrltest::{cli, Result};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ctrltest", about = "Functional test sequencer for building controllers")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/ctrltest/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let log_guard = cli::init_logging(&cli.command, &config);
    if let Some(guard) = &log_guard {
        tracing::info!(path = %guard.path.display(), "Writing run log");
    }

    let result = cli::dispatch(cli.command, config).await;

    // Flush the file log before exiting
    drop(log_guard);

    match result {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
