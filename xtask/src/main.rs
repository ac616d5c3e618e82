// Desktop/tooling crate: unwrap/expect/panic acceptable in non-embedded code.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod check;
mod config;
mod emulate;
mod test;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Tide logger development tasks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check builds for the hardware (no_std) and emulator targets
    Check,
    /// Run all tests (unit, scenario and property)
    Test {
        /// Run only unit tests
        #[arg(long)]
        unit: bool,
        /// Run only integration and property tests
        #[arg(long)]
        integration: bool,
        /// Cases per property for suites without an explicit count
        #[arg(long)]
        cases: Option<u32>,
    },
    /// Run wake cycles in the desktop emulator
    Emulate {
        /// Number of wake cycles per run
        #[arg(long, default_value_t = 3)]
        cycles: u32,
        /// Directory standing in for the removable card
        #[arg(long, default_value = "card")]
        card: std::path::PathBuf,
        /// Rebuild and rerun whenever a source file changes
        #[arg(long)]
        watch: bool,
    },
    /// Show the default configuration and a resolved capability set
    Config {
        #[command(flatten)]
        caps: config::CapsArgs,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => check::run(),
        Commands::Test {
            unit,
            integration,
            cases,
        } => test::run(unit, integration, cases),
        Commands::Emulate {
            cycles,
            card,
            watch,
        } => emulate::run(cycles, &card, watch),
        Commands::Config { caps, json } => config::run(&caps, json),
    }
}
