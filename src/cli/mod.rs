//! CLI command implementations

pub mod classify;
pub mod error;
pub mod simulate;
pub mod table;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;

pub use classify::ClassifyArgs;
pub use error::CliError;
pub use simulate::{SimulateArgs, SimulationSummary};
pub use table::TableArgs;

/// Ad slot resilience CLI
#[derive(Parser, Debug)]
#[command(name = "adslot")]
#[command(about = "Simulate ad slot loading and inspect recovery decisions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true, env = "ADSLOT_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run placements against an in-memory page
    Simulate(SimulateArgs),
    /// Show how an error message would be handled at each retry
    Classify(ClassifyArgs),
    /// Print the recovery decision table and backoff multipliers
    Table(TableArgs),
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

/// Print `value` as pretty JSON on stdout
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::IoError(format!("Failed to serialize output: {e}")))?;
    println!("{json}");
    Ok(())
}
