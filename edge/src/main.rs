//! # Sungrow Edge Daemon Entry Point
//!
//! Default invocation runs the poll/upload daemon. The `scan` subcommand
//! reads an arbitrary input register range once and prints the raw words,
//! for field diagnostics against an unfamiliar inverter.

use clap::{Parser, Subcommand};
use sungrow_edge::config::EdgeConfig;
use sungrow_edge::modbus::Poller;
use sungrow_edge::{daemon, telemetry};

#[derive(Parser)]
#[command(name = "sungrow-edge")]
#[command(about = "Edge daemon forwarding Sungrow inverter telemetry")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poll/upload daemon (default)
    Run,
    /// Read a raw input register range once and print the words
    Scan {
        /// First input register address
        #[arg(long)]
        start: u16,
        /// Number of 16-bit words to read
        #[arg(long, default_value_t = 10)]
        count: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = EdgeConfig::from_env()?;
    telemetry::init_subscriber(&config.log_level);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => daemon::run(config).await,
        Commands::Scan { start, count } => scan(&config, start, count).await,
    }
}

async fn scan(config: &EdgeConfig, start: u16, count: u16) -> anyhow::Result<()> {
    let poller = Poller::new(config);
    let words = poller.read_range(start, count).await?;

    for (offset, word) in words.iter().enumerate() {
        println!(
            "register {:5}: {:5}  (0x{:04X})",
            start as usize + offset,
            word,
            word
        );
    }
    Ok(())
}
